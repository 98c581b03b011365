use std::time::Duration;

use hearth::secret::Secret;

use hearth_relay::transport::mqtt::MqttConfig;
use hearth_relay::{DEFAULT_CALL_TIMEOUT, DEFAULT_HEARTBEAT_PERIOD};

/// The hub endpoint a worker dials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A `WebSocket` address, such as `ws://hub.example.org:8080/ws`.
    WebSocket(String),
    /// An `MQTT` broker shared with the hub.
    Mqtt(MqttConfig),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebSocket(address) => f.write_str(address),
            Self::Mqtt(config) => write!(
                f,
                "mqtt (publish `{}`, subscribe `{}`)",
                config.publish_topic(),
                config.subscribe_topic()
            ),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub(crate) endpoint: Endpoint,
    pub(crate) secret: Secret,
    pub(crate) heartbeat_period: Duration,
    pub(crate) call_timeout: Duration,
}

impl WorkerConfig {
    /// Creates a [`WorkerConfig`] dialing a hub over `WebSocket`.
    #[must_use]
    pub fn websocket(address: impl Into<String>, secret: impl Into<Secret>) -> Self {
        Self::new(Endpoint::WebSocket(address.into()), secret.into())
    }

    /// Creates a [`WorkerConfig`] reaching a hub through an `MQTT` broker.
    #[must_use]
    pub fn mqtt(config: MqttConfig, secret: impl Into<Secret>) -> Self {
        Self::new(Endpoint::Mqtt(config), secret.into())
    }

    /// Sets the period between two heartbeats.
    ///
    /// Defaults to 60 seconds.
    #[must_use]
    pub const fn heartbeat_period(mut self, heartbeat_period: Duration) -> Self {
        self.heartbeat_period = heartbeat_period;
        self
    }

    /// Sets the maximum time a correlated call waits for its reply.
    ///
    /// Defaults to 10 seconds.
    #[must_use]
    pub const fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Returns the hub endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    const fn new(endpoint: Endpoint, secret: Secret) -> Self {
        Self {
            endpoint,
            secret,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}
