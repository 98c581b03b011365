use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use hearth::envelope::Envelope;

use hearth_relay::DEFAULT_CALL_TIMEOUT;
use hearth_relay::connection::{Connection, ConnectionState, Role};
use hearth_relay::error::{Error, ErrorKind, Result};
use hearth_relay::registry::{Capability, Registry};
use hearth_relay::state::CachedState;
use hearth_relay::transport::{Transport, mqtt};

use serde::Serialize;

use tracing::info;

/// A source served by the hub along with the roles of its provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    /// Source name.
    pub source: String,
    /// Capability roles.
    pub capabilities: Vec<Capability>,
}

/// The hub side of the relay.
///
/// Owns at most one worker connection. Commands are correlated calls over
/// that connection, while cached state is read from the providers of the
/// registry without any network I/O.
#[derive(Debug)]
pub struct Hub {
    registry: Arc<Registry>,
    call_timeout: Duration,
    worker: RwLock<Option<Arc<Connection>>>,
}

impl Hub {
    /// Creates a [`Hub`] serving the providers of a registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            worker: RwLock::new(None),
        }
    }

    /// Sets the maximum time a command waits for the worker reply.
    #[must_use]
    pub const fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Accepts a transport dialed by a worker.
    ///
    /// The secret frame is read but not validated. The new connection
    /// replaces, and shuts down, the previous one.
    ///
    /// # Errors
    ///
    /// The transport fails before the secret frame arrives.
    pub async fn accept(&self, transport: Transport) -> Result<Arc<Connection>> {
        let connection = self.connection().accept(transport).await?;
        info!("Worker connected");
        self.replace(Arc::clone(&connection)).await;
        Ok(connection)
    }

    /// Attaches an established transport without any handshake.
    ///
    /// The new connection replaces, and shuts down, the previous one.
    pub async fn attach(&self, transport: Transport) -> Arc<Connection> {
        let connection = self.connection().attach(transport);
        self.replace(Arc::clone(&connection)).await;
        connection
    }

    /// Reaches the worker through an `MQTT` broker.
    ///
    /// # Errors
    ///
    /// The broker cannot be reached.
    pub async fn attach_mqtt(&self, config: &mqtt::MqttConfig) -> Result<Arc<Connection>> {
        let transport = mqtt::connect(config).await?;
        info!(
            "Worker reachable through the broker on `{}`",
            config.publish_topic()
        );
        Ok(self.attach(transport).await)
    }

    /// Sends a command to the worker and waits for its reply.
    ///
    /// The identifier of the command is derived from its payload.
    ///
    /// # Errors
    ///
    /// - No worker is connected
    /// - No reply arrived in time, or the worker left
    /// - The worker answered with an error envelope
    pub async fn call(
        &self,
        source: impl Into<String>,
        action: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<Envelope> {
        self.call_envelope(Envelope::new(source, action, payload))
            .await
    }

    /// Sends a command envelope to the worker and waits for its reply.
    ///
    /// # Errors
    ///
    /// Same as [`Hub::call`].
    pub async fn call_envelope(&self, request: Envelope) -> Result<Envelope> {
        let Some(worker) = self.worker() else {
            return Err(Error::new(ErrorKind::NotActive, "No worker connected"));
        };
        worker.call(request).await
    }

    /// Returns the state cached for a source.
    ///
    /// `None` when the source is unknown or its provider caches nothing.
    #[must_use]
    pub fn state(&self, source: &str) -> Option<CachedState> {
        self.registry.supply(source)
    }

    /// Returns the served sources.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceSummary> {
        self.registry
            .sources()
            .into_iter()
            .filter_map(|source| {
                let binding = self.registry.get(&source)?;
                Some(SourceSummary {
                    capabilities: binding.capabilities(),
                    source,
                })
            })
            .collect()
    }

    /// Returns the worker connection, if it is active.
    #[must_use]
    pub fn worker(&self) -> Option<Arc<Connection>> {
        self.worker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|connection| connection.state() == ConnectionState::Active)
            .cloned()
    }

    /// Checks whether an active worker is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.worker().is_some()
    }

    /// Shuts the worker connection down.
    pub async fn shutdown(&self) {
        let previous = self
            .worker
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
    }

    fn connection(&self) -> Connection {
        Connection::new(Role::Hub, Arc::clone(&self.registry)).call_timeout(self.call_timeout)
    }

    async fn replace(&self, connection: Arc<Connection>) {
        let previous = self
            .worker
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(connection);

        if let Some(previous) = previous {
            info!("Replacing the previous worker connection");
            previous.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hearth::envelope::Envelope;
    use hearth::secret::Secret;

    use hearth_relay::connection::{Connection, ConnectionState, Role};
    use hearth_relay::error::ErrorKind;
    use hearth_relay::registry::{Capability, ProviderBinding, Registry, Reply};
    use hearth_relay::state::StateCache;
    use hearth_relay::transport::channel::transport_pair;

    use super::{Hub, SourceSummary};

    fn hub(cache: &StateCache) -> Hub {
        Hub::new(Arc::new(
            Registry::new().with("hue", ProviderBinding::new().cached(cache)),
        ))
        .call_timeout(Duration::from_secs(5))
    }

    async fn worker(hub: &Hub) -> Arc<Connection> {
        let registry = Registry::new().with(
            "hue",
            ProviderBinding::new().executor("groups", |_| async { Ok(Reply::new("groups", "[]")) }),
        );
        let (hub_side, worker_side) = transport_pair();

        let (accepted, worker) = tokio::join!(
            hub.accept(hub_side),
            Connection::new(Role::Worker, Arc::new(registry))
                .connect(async move { Ok(worker_side) }, Secret::from("s3cr3t")),
        );
        accepted.unwrap();
        worker.unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_worker() {
        let hub = hub(&StateCache::new());

        assert!(!hub.is_connected());
        let error = hub.call("hue", "groups", "").await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotActive);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_call_and_state() {
        let cache = StateCache::new();
        let hub = hub(&cache);
        let worker = worker(&hub).await;

        assert!(hub.is_connected());
        assert_eq!(hub.call("hue", "groups", "").await.unwrap().payload, "[]");

        assert!(hub.state("hue").unwrap().is_empty());
        worker
            .send(&Envelope::new("hue", "lights", "[]"))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.state("hue").is_some_and(|state| state.is_empty()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(hub.state("hue").unwrap().get("lights"), Some("[]"));
        assert_eq!(hub.state("sonos"), None);

        assert_eq!(
            hub.sources(),
            [SourceSummary {
                source: "hue".into(),
                capabilities: vec![Capability::StateSupplier, Capability::StateConsumer],
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_new_worker_replaces_previous() {
        let hub = hub(&StateCache::new());

        let first = worker(&hub).await;
        let second = worker(&hub).await;

        tokio::time::timeout(Duration::from_secs(5), first.closed())
            .await
            .unwrap();
        assert_eq!(second.state(), ConnectionState::Active);
        assert_eq!(hub.call("hue", "groups", "").await.unwrap().payload, "[]");

        hub.shutdown().await;
        assert!(!hub.is_connected());
        tokio::time::timeout(Duration::from_secs(5), second.closed())
            .await
            .unwrap();
    }
}
