use std::sync::Arc;
use std::time::Duration;

use hearth::envelope::Envelope;

use hearth_relay::connection::Connection;
use hearth_relay::error::Result;

use tokio::time::MissedTickBehavior;

use tracing::{debug, info, warn};

/// Pushes, every period, the snapshots of all providers implementing the
/// snapshot role.
///
/// The first heartbeat is pushed right away, so the hub does not wait a
/// whole period before caching any state. The loop stops as soon as the
/// connection shuts down, even in the middle of a cycle, or when a push
/// cannot be written.
pub async fn run(connection: Arc<Connection>, period: Duration) {
    let cancellation_token = connection.cancellation_token();

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Use the cancellation token to stop the loop
            () = cancellation_token.cancelled() => { break; }
            _ = interval.tick() => {}
        }

        // A producer may hang on a vendor call, the shutdown must not wait
        // for it.
        let published = tokio::select! {
            () = cancellation_token.cancelled() => { break; }
            published = publish_snapshots(&connection) => published,
        };

        match published {
            Ok(pushed) => debug!("Heartbeat pushed {pushed} envelopes"),
            Err(e) => {
                warn!("Heartbeat interrupted: {e}");
                break;
            }
        }
    }

    info!("Heartbeat stopped");
}

/// Runs every snapshot producer once and pushes the results.
///
/// Each snapshot becomes an envelope with a fresh identifier, each failure
/// an error envelope for the provider source.
///
/// Returns the number of pushed envelopes.
///
/// # Errors
///
/// An envelope cannot be sent.
pub async fn publish_snapshots(connection: &Connection) -> Result<usize> {
    let mut pushed = 0;

    for (source, binding) in connection.registry().snapshot_producers() {
        let Some(snapshot) = binding.produce_snapshot() else {
            continue;
        };

        for result in snapshot.await {
            let envelope = match result {
                Ok(reply) => reply.into_push(&source),
                Err(e) => {
                    warn!("Snapshot of `{source}` failed: {e}");
                    Envelope::failure(source.as_str(), e.description())
                }
            };
            connection.send(&envelope).await?;
            pushed += 1;
        }
    }

    Ok(pushed)
}

#[cfg(test)]
mod tests {
    use std::future::pending;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use hearth::secret::Secret;

    use hearth_relay::connection::{Connection, Role};
    use hearth_relay::error::{Error, Result};
    use hearth_relay::registry::{ProviderBinding, Registry, Reply};
    use hearth_relay::state::StateCache;
    use hearth_relay::transport::channel::transport_pair;

    use super::{publish_snapshots, run};

    const PERIOD: Duration = Duration::from_secs(60);

    async fn connected(
        cache: &StateCache,
        worker_registry: Registry,
    ) -> (Arc<Connection>, Arc<Connection>) {
        let (hub_side, worker_side) = transport_pair();

        let hub_registry = Registry::new()
            .with("netatmo", ProviderBinding::new().cached(cache))
            .with("dyson", ProviderBinding::new().cached(cache));

        let (hub, worker) = tokio::join!(
            Connection::new(Role::Hub, Arc::new(hub_registry)).accept(hub_side),
            Connection::new(Role::Worker, Arc::new(worker_registry))
                .connect(async move { Ok(worker_side) }, Secret::from("s3cr3t")),
        );
        (hub.unwrap(), worker.unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_and_failures() {
        let cache = StateCache::new();
        let registry = Registry::new()
            .with(
                "netatmo",
                ProviderBinding::new().snapshot(|| async {
                    vec![
                        Ok(Reply::new("devices", r#"[{"temperature":19.5}]"#)),
                        Err(Error::handler("token expired")),
                    ]
                }),
            )
            // Executors only, no heartbeat.
            .with(
                "hue",
                ProviderBinding::new().executor("groups", |_| async { Ok(Reply::new("groups", "[]")) }),
            );

        let (_hub, worker) = connected(&cache, registry).await;

        assert_eq!(publish_snapshots(&worker).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let state = cache.snapshot();
        assert_eq!(state.revision, 2);
        assert_eq!(state.get("devices"), Some(r#"[{"temperature":19.5}]"#));
        assert_eq!(state.last_error.as_deref(), Some("token expired"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_period() {
        let cache = StateCache::new();
        let cycles = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&cycles);
        let registry = Registry::new().with(
            "dyson",
            ProviderBinding::new().snapshot(move || {
                let cycle = counter.fetch_add(1, Ordering::SeqCst);
                async move { vec![Ok(Reply::new("purifiers", cycle.to_string()))] }
            }),
        );

        let (_hub, worker) = connected(&cache, registry).await;
        let heartbeat = tokio::spawn(run(Arc::clone(&worker), PERIOD));

        // Pushes at 0, 60 and 120 seconds.
        tokio::time::sleep(PERIOD * 5 / 2).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 3);
        assert_eq!(cache.snapshot().get("purifiers"), Some("2"));

        worker.shutdown().await;
        heartbeat.await.unwrap();
        assert_eq!(cycles.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_stops_when_hub_leaves() {
        let cache = StateCache::new();
        let registry = Registry::new().with(
            "netatmo",
            ProviderBinding::new().snapshot(|| async { vec![Ok(Reply::new("devices", "[]"))] }),
        );

        let (hub, worker) = connected(&cache, registry).await;
        let heartbeat = tokio::spawn(run(Arc::clone(&worker), PERIOD));

        hub.shutdown().await;

        tokio::time::timeout(PERIOD, heartbeat).await.unwrap().unwrap();
        worker.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_hung_snapshot() {
        let cache = StateCache::new();
        let started = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&started);
        let registry = Registry::new().with(
            "netatmo",
            ProviderBinding::new().snapshot(move || {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
                pending::<Vec<Result<Reply>>>()
            }),
        );

        let (_hub, worker) = connected(&cache, registry).await;
        let heartbeat = tokio::spawn(run(Arc::clone(&worker), PERIOD));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        worker.shutdown().await;
        tokio::time::timeout(Duration::from_secs(1), heartbeat)
            .await
            .unwrap()
            .unwrap();
        assert!(cache.snapshot().is_empty());
    }
}
