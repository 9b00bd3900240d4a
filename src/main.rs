mod config;
mod error;
mod logging;
mod magnitude;
mod monitor;
mod platform;
mod rate_limit;
mod shutdown;
mod sink;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::monitor::EarthquakeMonitor;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Logging depends on the config, so load first and report errors after.
    let loaded = Config::load(&config_path);
    let (debug, log_dir) = match &loaded {
        Ok(config) => (config.debug, config.log_dir.clone()),
        Err(_) => (false, PathBuf::from(".")),
    };
    let _log_guard = logging::init(debug, &log_dir);
    logging::install_panic_hook();

    info!("Loading configuration from: {}", config_path.display());
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return Err(e)
                .with_context(|| format!("Failed to load config from {}", config_path.display()));
        }
    };

    info!("Configuration loaded successfully");
    info!("  Chats: {}", config.chat_names.join(", "));
    info!(
        "  MQTT: {}:{} -> {}",
        config.mqtt_server, config.mqtt_port, config.mqtt_topic
    );
    info!("  Alert interval: {}s", config.alert_interval_secs);
    debug!("{:?}", config);

    let outcome = match EarthquakeMonitor::new(&config) {
        Ok(monitor) => monitor.start(shutdown::shutdown_signal()).await,
        Err(e) => Err(e),
    };
    if let Err(e) = outcome {
        error!("Earthquake monitor stopped: {}", e);
        return Err(e).context("Earthquake monitor failed");
    }

    info!("Earthquake monitor stopped");
    Ok(())
}
