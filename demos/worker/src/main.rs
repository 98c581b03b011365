//! A worker driving a simulated lighting bridge and pushing the readings of
//! a simulated weather station.

mod lighting;
mod weather;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use hearth::source::{HUE, NETATMO};

use hearth_relay::transport::mqtt::MqttConfig;

use hearth_worker::config::WorkerConfig;
use hearth_worker::worker::Worker;
use hearth_worker::{Error, ErrorKind, Registry};

use tracing::{Level, error, info, warn};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Hub `WebSocket` endpoint.
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    hub: String,

    /// Shared secret sent to the hub.
    #[arg(long, env = "HEARTH_SECRET", default_value = "")]
    secret: String,

    /// Seconds between two heartbeats.
    #[arg(long, default_value_t = 60)]
    heartbeat: u64,

    /// Reach the hub through this `MQTT` broker instead of `WebSocket`.
    #[arg(long)]
    broker: Option<String>,

    /// `MQTT` broker port.
    #[arg(long, default_value_t = 1883)]
    broker_port: u16,

    /// Topic the worker publishes on.
    #[arg(long, default_value = "hearth/events")]
    events_topic: String,

    /// Topic the worker subscribes to.
    #[arg(long, default_value = "hearth/commands")]
    commands_topic: String,

    /// Maximum log level.
    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Impossible to listen for Ctrl-C: {e}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    if cli.secret.is_empty() {
        warn!("Empty secret, set one with `--secret` or `HEARTH_SECRET`");
    }

    let registry = Registry::new()
        .with(HUE, lighting::provider())
        .with(NETATMO, weather::provider());

    let config = match cli.broker {
        Some(broker) => WorkerConfig::mqtt(
            MqttConfig::new(broker, "hearth-worker", cli.events_topic, cli.commands_topic)
                .port(cli.broker_port),
            cli.secret,
        ),
        None => WorkerConfig::websocket(cli.hub, cli.secret),
    }
    .heartbeat_period(Duration::from_secs(cli.heartbeat));

    let worker = Worker::connect(config, Arc::new(registry)).await?;

    let interrupted = tokio::select! {
        () = shutdown_signal() => true,
        () = worker.closed() => false,
    };

    if interrupted {
        info!("Stopping the worker");
        worker.shutdown().await;
        Ok(())
    } else {
        // Reconnecting is up to the process supervisor.
        Err(Error::new(ErrorKind::Closed, "Connection to the hub lost"))
    }
}
