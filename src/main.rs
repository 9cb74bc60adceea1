//! Shelly HomeKit Bridge - Main Entry Point

use clap::{Parser, Subcommand};
use shelly_homekit_bridge::accessory::ChangeNotifier;
use shelly_homekit_bridge::config::BridgeConfig;
use shelly_homekit_bridge::discovery::{self, ServiceAdvertiser};
use shelly_homekit_bridge::lifecycle_span;
use shelly_homekit_bridge::observability::init_default_logging;
use shelly_homekit_bridge::server::AccessoryServer;
use shelly_homekit_bridge::store::FsStore;
use shelly_homekit_bridge::transport::mqtt::MqttClient;
use shelly_homekit_bridge::Bridge;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn, Instrument};

/// Capacity of the channel between the MQTT event loop and the dispatcher
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Bridge Shelly MQTT sensors to HomeKit-style accessories
#[derive(Parser)]
#[command(name = "shelly-homekit-bridge")]
#[command(about = "Bridge Shelly flood, smoke and H&T sensors from MQTT to HomeKit accessories")]
#[command(version)]
struct Cli {
    /// Configuration file path; environment variables are used when omitted
    #[arg(short, long, value_name = "FILE", env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging unless LOG_LEVEL is set
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Shelly HomeKit bridge");

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    path: Option<&std::path::Path>,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(BridgeConfig::load_from_file(path)?)
        }
        None => {
            info!("Loading configuration from environment");
            Ok(BridgeConfig::from_env()?)
        }
    }
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.devices.is_empty() {
        warn!("No sensors configured; the bridge will only expose itself");
    }

    let store = Arc::new(FsStore::open(&config.store.path).await?);
    let bridge = Bridge::from_config(&config, store.clone(), ChangeNotifier::new());

    // Accessories start from their last known state
    bridge
        .replay_cache()
        .instrument(lifecycle_span!(phase = "cache_replay"))
        .await;

    let mut client = MqttClient::new(config.mqtt.clone())?;
    let inbound = bridge.attach(&client, INBOUND_CHANNEL_CAPACITY);
    let bridge = Arc::new(bridge);
    let dispatcher = tokio::spawn(bridge.clone().run(inbound));

    if let Err(e) = client.connect().await {
        error!(
            broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
            error = %e,
            "Could not connect to MQTT broker"
        );
        return Err(e.into());
    }

    client.subscribe(&bridge.topics()).await?;

    let mqtt_connected = Arc::new(AtomicBool::new(true));
    if let Some(mut state_rx) = client.state_receiver() {
        let flag = mqtt_connected.clone();
        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let connected = state_rx.borrow_and_update().is_connected();
                flag.store(connected, Ordering::Relaxed);
            }
        });
    }

    let mut advertiser = None;
    if config.server.mdns {
        match advertise(&config, store.as_ref()).await {
            Ok(registered) => advertiser = Some(registered),
            Err(e) => warn!(error = %e, "mDNS advertisement disabled"),
        }
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    };

    info!(
        sensors = bridge.sensor_count(),
        addr = %config.server.listen_addr,
        "Bridge is running"
    );
    let server = AccessoryServer::new(bridge.clone(), mqtt_connected);
    let served = server.serve(config.server.listen_addr, shutdown).await;

    info!("Application shutdown initiated");
    if let Err(e) = client.disconnect().await {
        error!("Error during MQTT disconnect: {}", e);
    }
    // dropping the client closes the inbound channel
    drop(client);
    match tokio::time::timeout(Duration::from_secs(5), dispatcher).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Dispatcher task ended abnormally: {}", e),
        Err(_) => warn!("Dispatcher did not drain in time"),
    }

    if let Some(mut advertiser) = advertiser {
        if let Err(e) = advertiser.unregister() {
            warn!(error = %e, "Failed to unregister mDNS service");
        }
    }

    served?;
    Ok(())
}

async fn advertise(
    config: &BridgeConfig,
    store: &FsStore,
) -> Result<ServiceAdvertiser, shelly_homekit_bridge::BridgeError> {
    let device_id = discovery::device_id(store).await?;
    let mut advertiser = ServiceAdvertiser::new()?;
    advertiser.register(
        &config.server.bridge_name,
        config.server.listen_addr.port(),
        &device_id,
    )?;
    Ok(advertiser)
}

fn handle_config_command(
    config: &BridgeConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!(
        floods = config.devices.floods.len(),
        legacy_floods = config.devices.legacy_floods.len(),
        smokes = config.devices.smokes.len(),
        hts = config.devices.hts.len(),
        "Configuration validation complete"
    );
    Ok(())
}
