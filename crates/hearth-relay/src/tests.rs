use std::sync::Arc;
use std::time::Duration;

use hearth::envelope::Envelope;
use hearth::secret::Secret;

use crate::connection::{Connection, Role};
use crate::error::Error;
use crate::registry::{ProviderBinding, Registry, Reply};
use crate::state::StateCache;
use crate::transport::channel::transport_pair;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// A hub caching what the worker pushes for `netatmo`.
pub(crate) fn hub_registry(cache: &StateCache) -> Arc<Registry> {
    Arc::new(Registry::new().with("netatmo", ProviderBinding::new().cached(cache)))
}

// A worker driving lights and echoing `sonos` payloads after a delay in
// tens of milliseconds.
pub(crate) fn worker_registry() -> Arc<Registry> {
    let lighting = ProviderBinding::new()
        .executor("groups", |_| async {
            Ok(Reply::new("groups", r#"[{"id":"1","name":"Living room"}]"#))
        })
        .executor("delete", |_| async { Err(Error::handler("group not found")) });

    let speakers = ProviderBinding::new().executor("echo", |envelope: Envelope| async move {
        let delay = envelope.payload.parse::<u64>().unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(delay * 10)).await;
        Ok(Reply::new("echo", envelope.payload))
    });

    Arc::new(
        Registry::new()
            .with("hue", lighting)
            .with("sonos", speakers),
    )
}

// Connects a hub and a worker through an in-memory channel.
pub(crate) async fn connected(
    hub_registry: Arc<Registry>,
    worker_registry: Arc<Registry>,
) -> (Arc<Connection>, Arc<Connection>) {
    let (hub_side, worker_side) = transport_pair();

    let worker = Connection::new(Role::Worker, worker_registry)
        .connect(async move { Ok(worker_side) }, Secret::from("s3cr3t"));
    let hub = Connection::new(Role::Hub, hub_registry).accept(hub_side);

    let (hub, worker) = tokio::join!(hub, worker);
    (hub.unwrap(), worker.unwrap())
}

// Polls a condition until it holds, failing after five seconds.
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
