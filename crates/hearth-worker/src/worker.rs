use std::sync::Arc;

use hearth::secret::Secret;

use hearth_relay::connection::{Connection, ConnectionState, Role};
use hearth_relay::error::Result;
use hearth_relay::registry::Registry;
use hearth_relay::transport::{Transport, mqtt, websocket};

use tokio::task::JoinHandle;

use tracing::{error, info};

use crate::config::{Endpoint, WorkerConfig};
use crate::heartbeat;

/// A running worker.
///
/// Holds the connection to the hub and its heartbeat task.
#[derive(Debug)]
pub struct Worker {
    connection: Arc<Connection>,
    heartbeat: JoinHandle<()>,
}

impl Worker {
    /// Dials the hub described by the configuration and starts the
    /// heartbeat.
    ///
    /// # Errors
    ///
    /// The hub cannot be reached, or the secret cannot be sent. A failure
    /// is never retried.
    pub async fn connect(config: WorkerConfig, registry: Arc<Registry>) -> Result<Self> {
        info!("Dialing hub at {}", config.endpoint);

        match &config.endpoint {
            Endpoint::WebSocket(address) => {
                Self::connect_with(websocket::dial(address), &config, registry).await
            }
            Endpoint::Mqtt(broker) => {
                Self::connect_with(mqtt::connect(broker), &config, registry).await
            }
        }
    }

    /// Connects through a custom transport and starts the heartbeat.
    ///
    /// The endpoint of the configuration is ignored.
    ///
    /// # Errors
    ///
    /// The transport cannot be established, or the secret cannot be sent.
    pub async fn connect_with<F>(
        dial: F,
        config: &WorkerConfig,
        registry: Arc<Registry>,
    ) -> Result<Self>
    where
        F: Future<Output = Result<Transport>>,
    {
        let connection = Connection::new(Role::Worker, registry)
            .call_timeout(config.call_timeout)
            .connect(dial, Secret::clone(&config.secret))
            .await?;

        info!(
            "Connected to the hub, heartbeat every {} s",
            config.heartbeat_period.as_secs()
        );

        let heartbeat = tokio::spawn(heartbeat::run(
            Arc::clone(&connection),
            config.heartbeat_period,
        ));

        Ok(Self {
            connection,
            heartbeat,
        })
    }

    /// Returns the connection to the hub.
    #[must_use]
    pub const fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Waits until the connection to the hub is closed.
    pub async fn closed(&self) {
        self.connection.closed().await;
    }

    /// Shuts the connection down and waits for the heartbeat to stop.
    pub async fn shutdown(self) {
        self.connection.shutdown().await;
        if let Err(e) = self.heartbeat.await {
            error!("Heartbeat task failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hearth::envelope::Envelope;

    use hearth_relay::connection::{Connection, ConnectionState, Role};
    use hearth_relay::error::{Error, ErrorKind, Result};
    use hearth_relay::registry::{ProviderBinding, Registry, Reply};
    use hearth_relay::state::StateCache;
    use hearth_relay::transport::channel::transport_pair;

    use crate::config::WorkerConfig;

    use super::Worker;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn registry() -> Arc<Registry> {
        let hue = ProviderBinding::new()
            .executor("groups", |_| async {
                Ok(Reply::new("groups", r#"[{"id":"1","name":"Kitchen"}]"#))
            })
            .executor("update", |envelope: Envelope| async move {
                if envelope.payload.contains(r#""id":"1""#) {
                    Ok(Reply::new("groups", envelope.payload))
                } else {
                    Err(Error::handler("group not found"))
                }
            })
            .snapshot(|| async { vec![Ok(Reply::new("groups", r#"[{"id":"1"}]"#))] });

        Arc::new(Registry::new().with("hue", hue))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_scenario() {
        init_tracing();

        let cache = StateCache::new();
        let hub_registry = Registry::new().with("hue", ProviderBinding::new().cached(&cache));
        let (hub_side, worker_side) = transport_pair();

        let config = WorkerConfig::websocket("ws://unused", "s3cr3t")
            .heartbeat_period(Duration::from_secs(3600));

        let (hub, worker) = tokio::join!(
            Connection::new(Role::Hub, Arc::new(hub_registry)).accept(hub_side),
            Worker::connect_with(async move { Ok(worker_side) }, &config, registry()),
        );
        let (hub, worker) = (hub.unwrap(), worker.unwrap());
        assert_eq!(worker.state(), ConnectionState::Active);

        // The first heartbeat is pushed right after the handshake.
        tokio::time::timeout(Duration::from_secs(5), async {
            while cache.snapshot().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(cache.snapshot().get("groups"), Some(r#"[{"id":"1"}]"#));

        let reply = hub
            .call(Envelope::new("hue", "groups-update", r#"{"id":"1","on":true}"#))
            .await
            .unwrap();
        assert_eq!(reply.payload, r#"{"id":"1","on":true}"#);

        let error = hub
            .call(Envelope::new("hue", "groups-update", r#"{"id":"7"}"#))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Remote);
        assert_eq!(error.description(), "group not found");

        worker.shutdown().await;
        tokio::time::timeout(Duration::from_secs(5), hub.closed())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_with_hung_snapshot() {
        init_tracing();

        // A weather station whose vendor call never returns.
        let registry = Registry::new().with(
            "netatmo",
            ProviderBinding::new().snapshot(std::future::pending::<Vec<Result<Reply>>>),
        );

        let (hub_side, worker_side) = transport_pair();
        let config = WorkerConfig::websocket("ws://unused", "s3cr3t");

        let (hub, worker) = tokio::join!(
            Connection::new(Role::Hub, Arc::new(Registry::new())).accept(hub_side),
            Worker::connect_with(async move { Ok(worker_side) }, &config, Arc::new(registry)),
        );
        let (hub, worker) = (hub.unwrap(), worker.unwrap());

        // Let the first heartbeat cycle block on the producer.
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(3), worker.shutdown())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(3), hub.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_hub() {
        let config = WorkerConfig::websocket("ws://127.0.0.1:1/ws", "s3cr3t");

        let error = Worker::connect(config, registry()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Transport);
    }
}
