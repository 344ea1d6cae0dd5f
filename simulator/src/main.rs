use anyhow::{Context, Result};
use axum::{routing::get, Router};
use clap::Parser;
use simulator::broker::MqttConnector;
use simulator::config::SimulatorArgs;
use simulator::fleet::FleetRunner;
use simulator::metrics;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = SimulatorArgs::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting IoT fleet simulator");

    let fleet = args.fleet().context("Failed to load fleet configuration")?;
    let settings = args.stream_settings();
    info!(
        "Broker: {}:{}, Devices: {}, Layout: {:?}",
        args.broker,
        args.port,
        fleet.len(),
        settings.layout
    );
    info!(
        "Periods: measurements {:?}, info {:?}, status {:?}",
        settings.schedule.measurements, settings.schedule.info, settings.schedule.status
    );

    metrics::init_metrics().context("Failed to register metrics")?;

    let cancel = CancellationToken::new();

    if let Some(addr) = args.metrics_addr.clone() {
        let metrics_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(&addr, metrics_cancel).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    let connector = MqttConnector::new(args.mqtt_settings(), cancel.clone());
    let runner = FleetRunner::new(connector, fleet, settings, args.seed)?;
    let mut fleet_handle = tokio::spawn(runner.run(cancel.clone()));

    let report = tokio::select! {
        report = &mut fleet_handle => report?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            cancel.cancel();
            fleet_handle.await?
        }
    };
    cancel.cancel();

    info!(
        "Shutting down: {} devices ran, {} failed to connect",
        report.connected, report.failed
    );
    Ok(())
}

async fn serve_metrics(addr: &str, cancel: CancellationToken) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Metrics endpoint listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
