use anyhow::Result;
use std::path::Path;
use telemetry_agent::buffer::MetricBuffer;
use telemetry_agent::config::{AppConfig, ConfigSource};
use telemetry_agent::delivery::HttpDeliveryClient;
use telemetry_agent::retry::RetryCoordinator;
use telemetry_agent::sampler::{Sampler, SysinfoSampler};
use telemetry_agent::scheduler::Scheduler;
use telemetry_agent::spool::DurableSpool;
use telemetry_agent::{logging, status, version};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = AppConfig::path_from_env();
    let (app_config, source) = AppConfig::load_or_create(Path::new(&config_path))?;
    let _log_guard = logging::init(&app_config.log_level, app_config.logging.log_dir())?;

    tracing::info!(
        name = version::NAME,
        version = version::VERSION,
        config = %config_path,
        "starting"
    );
    if source == ConfigSource::CreatedDefault {
        tracing::warn!(path = %config_path, "config file not found; wrote defaults");
    }
    if app_config.api_key.is_empty() {
        tracing::warn!("api_key is empty; the collector will likely reject deliveries");
    }

    let sampler = SysinfoSampler::new(app_config.collection_interval());
    let client = HttpDeliveryClient::new(
        &app_config.server_url,
        &app_config.api_key,
        app_config.delivery_timeout(),
    )?;

    if std::env::args().skip(1).any(|a| a == "--test-connection") {
        return test_connection(&sampler, &client).await;
    }

    let spool = DurableSpool::connect(&app_config.spool.path).await?;
    spool.init().await?;
    match spool.count_unsent().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(unsent = n, path = %app_config.spool.path, "spool holds undelivered aggregates"),
        Err(e) => tracing::warn!(error = %e, "could not count spooled aggregates"),
    }

    let coordinator = RetryCoordinator::new(client, spool, app_config.retry_policy());
    let buffer = MetricBuffer::new(app_config.buffer_interval(), app_config.buffer.max_size);
    let scheduler = Scheduler::new(sampler, buffer, coordinator, app_config.scheduler_config());
    let handle = scheduler.spawn();
    let status_logger = status::spawn_status_logger(handle.status());

    tracing::info!(
        server_url = %app_config.server_url,
        collection_interval_secs = app_config.collection_interval,
        buffer_interval_secs = app_config.buffer_interval,
        "agent running"
    );

    shutdown_signal().await;
    tracing::info!("Received shutdown signal");
    handle.shutdown().await?;
    let _ = status_logger.await;
    Ok(())
}

async fn test_connection(sampler: &SysinfoSampler, client: &HttpDeliveryClient) -> Result<()> {
    let snapshot = sampler
        .collect()
        .await
        .map_err(|e| anyhow::anyhow!("collect: {}", e))?;
    match client.test_connection(&snapshot).await {
        Ok(ack) => {
            tracing::info!(url = client.url(), status = ack.status, "connection test passed");
            Ok(())
        }
        Err(e) => {
            tracing::error!(url = client.url(), error = %e, "connection test failed");
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
