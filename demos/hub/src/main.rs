//! A hub serving the collaborator `JSON` API and caching the state pushed by
//! its worker for every well-known device family.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use hearth::source::ALL_SOURCES;

use hearth_hub::config::HubConfig;
use hearth_hub::server::Server;
use hearth_hub::{Error, ProviderBinding, Registry, StateCache};

use hearth_relay::transport::mqtt::MqttConfig;

use tracing::{Level, error, info};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listening address.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    address: IpAddr,

    /// Listening port.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Seconds a command waits for the worker reply.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Reach the worker through this `MQTT` broker instead of waiting for it
    /// on `/ws`.
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

    let registry = Registry::new();
    for source in ALL_SOURCES {
        registry.register(*source, ProviderBinding::new().cached(&StateCache::new()));
    }

    let config = HubConfig::new()
        .address(cli.address)
        .port(cli.port)
        .call_timeout(Duration::from_secs(cli.timeout));

    let server = Server::new(Arc::new(registry), config);

    if let Some(broker) = cli.broker {
        let broker = MqttConfig::new(broker, "hearth-hub", cli.commands_topic, cli.events_topic)
            .port(cli.broker_port);
        server.hub().attach_mqtt(&broker).await?;
    }

    server.run(shutdown_signal()).await?;

    info!("Bye");
    Ok(())
}
