use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use devicelink::capability::PowerStateController;
use devicelink::{Device, Engine, EngineConfig};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config().await?;
    if !config.credentials.is_complete() {
        return Err(eyre!(
            "app_key and app_secret must be set in the [credentials] section"
        ));
    }
    if config.engine.devices.is_empty() {
        warn!("No devices configured, only module commands will be answered");
    }

    let mut engine = Engine::new(config.clone());
    let devices = register_devices(&mut engine, &config);

    engine.module_commands().on_report_health(|report| {
        report.push_str("ok");
        true
    });
    engine.on_connected(|| info!("Server connection established"));
    engine.on_disconnected(|| warn!("Server connection lost"));

    engine
        .begin()
        .map_err(|e| eyre!("Failed to start engine: {}", e))?;

    engine
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Stopped, {} devices released", devices.len());
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Config from the first CLI argument, else the default location
async fn load_config() -> Result<EngineConfig> {
    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => EngineConfig::ensure_default_config().await?,
    };
    info!("Using config {}", path.display());
    EngineConfig::load(&path).await
}

/// Every configured device gets a power switch that logs its commands
fn register_devices(engine: &mut Engine, config: &EngineConfig) -> Vec<Arc<Device>> {
    config
        .engine
        .devices
        .iter()
        .map(|entry| {
            let mut builder = engine.device(&entry.id, &entry.product_type);
            let power = builder.add(PowerStateController::new);
            power.on_power_state(|device_id, state| {
                info!("{} turned {}", device_id, if *state { "on" } else { "off" });
                true
            });
            let device = builder.build();
            engine.register_device(&device);
            device
        })
        .collect()
}
