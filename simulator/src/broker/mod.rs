//! Broker capability the simulator and the observer connect through.
//!
//! [`MqttConnector`] talks to a real broker with `rumqttc`; [`MemoryBroker`]
//! routes messages in-process.

mod memory;
mod mqtt;

pub use memory::MemoryBroker;
pub use mqtt::{MqttConnector, MqttSettings};

use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the channel carrying a connection's incoming messages.
pub const INCOMING_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Handle of one acknowledged broker session.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    async fn subscribe(&self, filter: &str) -> Result<()>;
}

pub struct Connection {
    pub client: Arc<dyn BrokerClient>,
    /// Messages delivered for this session's subscriptions.
    pub incoming: mpsc::Receiver<Message>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a session and returns once the broker has accepted it.
    async fn connect(&self, credentials: &Credentials) -> Result<Connection>;
}
