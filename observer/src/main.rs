use anyhow::{Context, Result};
use clap::Parser;
use observer::{run_observer, ObserverSettings};
use simulator::broker::{Credentials, MqttConnector, MqttSettings};
use simulator::topic::OBSERVE_FILTER;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "observer")]
#[command(about = "Logs every payload published by the simulated device fleet")]
#[command(version)]
struct ObserverArgs {
    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    broker: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    port: u16,

    /// Auth token, sent as the MQTT username
    #[arg(long, env = "OBSERVER_TOKEN", default_value = "")]
    token: String,

    /// Defaults to observer-<uuid>
    #[arg(long, env = "OBSERVER_CLIENT_ID")]
    client_id: Option<String>,

    /// Topic filter to subscribe to
    #[arg(long, env = "OBSERVER_TOPIC", default_value = OBSERVE_FILTER)]
    topic: String,

    /// Do not publish the one-shot control message after subscribing
    #[arg(long)]
    no_enable: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ObserverArgs::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting fleet observer");
    info!("MQTT broker: {}:{}", args.broker, args.port);

    let client_id = args
        .client_id
        .clone()
        .unwrap_or_else(|| format!("observer-{}", uuid::Uuid::new_v4()));
    let settings = ObserverSettings {
        credentials: Credentials {
            client_id,
            username: args.token.clone(),
            password: String::new(),
        },
        filter: args.topic.clone(),
        send_enable: !args.no_enable,
    };

    let cancel = CancellationToken::new();
    let mqtt_settings = MqttSettings {
        host: args.broker.clone(),
        port: args.port,
        ..MqttSettings::default()
    };
    let connector = MqttConnector::new(mqtt_settings, cancel.clone());

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
        shutdown.cancel();
    });

    let received = run_observer(&connector, &settings, cancel.clone())
        .await
        .context("Observer failed")?;
    cancel.cancel();

    info!("Shutting down after {} messages", received);
    Ok(())
}
