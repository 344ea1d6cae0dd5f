//! Subscribes to every simulated device's topics and logs what arrives.

use simulator::broker::{Connection, Connector, Credentials, Message};
use simulator::errors::Result;
use simulator::topic::{CONTROL_PAYLOAD, CONTROL_TOPIC};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ObserverSettings {
    pub credentials: Credentials,
    pub filter: String,
    /// Publish the one-shot control message after subscribing.
    pub send_enable: bool,
}

/// Connects, subscribes and logs incoming payloads until cancelled.
/// Returns the number of messages received.
pub async fn run_observer<C: Connector + ?Sized>(
    connector: &C,
    settings: &ObserverSettings,
    cancel: CancellationToken,
) -> Result<u64> {
    let Connection { client, incoming } = connector.connect(&settings.credentials).await?;
    info!("Connected to MQTT broker as {}", settings.credentials.client_id);

    client.subscribe(&settings.filter).await?;
    info!("Subscribed to {}", settings.filter);

    if settings.send_enable {
        match client
            .publish(CONTROL_TOPIC, CONTROL_PAYLOAD.as_bytes().to_vec())
            .await
        {
            Ok(()) => info!("Sent {} to {}", CONTROL_PAYLOAD, CONTROL_TOPIC),
            Err(e) => warn!("Failed to send control message: {}", e),
        }
    }

    let received = observe(incoming, cancel).await;
    // Dropped only now so the session stays open while observing
    drop(client);
    Ok(received)
}

/// Logs every message as-is, without validating its shape.
pub async fn observe(mut incoming: mpsc::Receiver<Message>, cancel: CancellationToken) -> u64 {
    let mut received = 0;

    loop {
        tokio::select! {
            biased;

            message = incoming.recv() => match message {
                Some(message) => {
                    received += 1;
                    info!(topic = %message.topic, "{}", String::from_utf8_lossy(&message.payload));
                }
                None => {
                    warn!("Connection closed");
                    break;
                }
            },
            _ = cancel.cancelled() => break,
        }
    }

    info!("Observed {} messages", received);
    received
}
