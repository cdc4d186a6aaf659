use anyhow::Result;
use solarpoll::api::MonitoringClient;
use solarpoll::logging::init_logging;
use solarpoll::sink::LogSink;
use solarpoll::{Config, Poller, Reconciler};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;

    info!("SolarPoll {} starting up", env!("APP_VERSION"));

    let api = Arc::new(MonitoringClient::new(config.api.clone()));
    let reconciler = Reconciler::new(api, Arc::new(LogSink::new()), config.lookback_minutes);
    let poller = Poller::new(reconciler, config);

    match poller.run().await {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Poller failed with error: {}", e);
            Err(anyhow::anyhow!("Poller error: {}", e))
        }
    }
}
