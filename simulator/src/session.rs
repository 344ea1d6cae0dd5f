use crate::broker::{BrokerClient, Connector};
use crate::device::Device;
use crate::errors::{Error, Result};
use crate::metrics::{CONNECTED_DEVICES, CONNECT_FAILURES_TOTAL};
use crate::model::{Frame, FrameKind};
use crate::topic::TopicLayout;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// `Connected` means the broker acknowledged the session once. Later
/// transport errors are handled by the client's event loop, which
/// reconnects on its own, and do not move the state back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One device's broker session.
pub struct DeviceSession {
    device: Arc<Device>,
    layout: TopicLayout,
    publish_timeout: Duration,
    state: SessionState,
    client: Option<Arc<dyn BrokerClient>>,
}

impl DeviceSession {
    pub fn new(device: Arc<Device>, layout: TopicLayout, publish_timeout: Duration) -> Self {
        Self {
            device,
            layout,
            publish_timeout,
            state: SessionState::Disconnected,
            client: None,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn topic(&self, kind: FrameKind) -> String {
        self.layout.topic(&self.device.device_id, kind)
    }

    /// A refused session is left `Disconnected`; reconnecting is up to the caller.
    pub async fn connect<C: Connector + ?Sized>(&mut self, connector: &C) -> Result<()> {
        self.state = SessionState::Connecting;

        match connector.connect(&self.device.credentials()).await {
            Ok(connection) => {
                // Devices never subscribe, so incoming messages are not read
                self.client = Some(connection.client);
                self.state = SessionState::Connected;
                CONNECTED_DEVICES.inc();
                info!("Device {} connected as {}", self.device.device_id, self.device.client_id);
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                CONNECT_FAILURES_TOTAL.inc();
                error!("Failed to connect device {}: {}", self.device.device_id, e);
                Err(e)
            }
        }
    }

    pub async fn publish(&self, frame: &Frame) -> Result<()> {
        let client = match (&self.client, self.state) {
            (Some(client), SessionState::Connected) => client,
            _ => return Err(Error::NotConnected(self.device.device_id.clone())),
        };

        let topic = self.topic(frame.kind());
        let payload = frame.to_payload()?;
        debug!("Publishing {} bytes to {}", payload.len(), topic);

        match tokio::time::timeout(self.publish_timeout, client.publish(&topic, payload)).await {
            Ok(result) => result,
            Err(_) => Err(Error::PublishTimeout(topic)),
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.state == SessionState::Connected {
            CONNECTED_DEVICES.dec();
        }
    }
}
