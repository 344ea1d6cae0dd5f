use super::{BrokerClient, Connection, Connector, Credentials, Message, INCOMING_CAPACITY};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// Capacity of the request queue between a client handle and its event loop.
    pub capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            capacity: 100,
        }
    }
}

/// Opens `rumqttc` sessions. Every session's event loop runs on its own task
/// until `cancel` fires.
pub struct MqttConnector {
    settings: MqttSettings,
    cancel: CancellationToken,
}

impl MqttConnector {
    pub fn new(settings: MqttSettings, cancel: CancellationToken) -> Self {
        Self { settings, cancel }
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Connection> {
        info!(
            "Connecting to MQTT broker at {}:{} as {}",
            self.settings.host, self.settings.port, credentials.client_id
        );

        let mut mqtt_options = MqttOptions::new(
            credentials.client_id.clone(),
            self.settings.host.clone(),
            self.settings.port,
        );
        mqtt_options.set_credentials(credentials.username.clone(), credentials.password.clone());
        mqtt_options.set_keep_alive(self.settings.keep_alive);
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, self.settings.capacity);

        let handshake =
            tokio::time::timeout(self.settings.connect_timeout, wait_for_connack(&mut eventloop)).await;
        let reason = match handshake {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => Some(reason),
            Err(_) => Some(format!(
                "no CONNACK within {:?}",
                self.settings.connect_timeout
            )),
        };
        if let Some(reason) = reason {
            return Err(Error::Connection {
                client_id: credentials.client_id.clone(),
                reason,
            });
        }

        let (tx, rx) = mpsc::channel(INCOMING_CAPACITY);
        tokio::spawn(run_eventloop(
            eventloop,
            tx,
            self.cancel.clone(),
            credentials.client_id.clone(),
        ));

        Ok(Connection {
            client: Arc::new(MqttClient { client }),
            incoming: rx,
        })
    }
}

struct MqttClient {
    client: AsyncClient,
}

#[async_trait]
impl BrokerClient for MqttClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| Error::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, filter: &str) -> Result<()> {
        self.client.subscribe(filter, QoS::AtMostOnce).await?;
        Ok(())
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> std::result::Result<(), String> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(format!("broker refused connection: {:?}", ack.code))
                };
            }
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }
}

/// Services the session's network I/O and forwards incoming publishes.
async fn run_eventloop(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
    client_id: String,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Stopping MQTT eventloop for {}", client_id);
                break;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(
                        "Received message on topic {}, size: {} bytes",
                        publish.topic,
                        publish.payload.len()
                    );
                    if tx.send(to_message(&publish)).await.is_err() {
                        debug!("No receiver for incoming messages of {}", client_id);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT eventloop error for {}: {}", client_id, e);
                    // rumqttc reconnects on the next poll
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

fn to_message(publish: &Publish) -> Message {
    Message {
        topic: publish.topic.clone(),
        payload: publish.payload.to_vec(),
    }
}
