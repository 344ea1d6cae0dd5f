use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection error for client {client_id}: {reason}")]
    Connection { client_id: String, reason: String },

    #[error("Unknown sensor kind: {0}")]
    UnknownSensorKind(String),

    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Publish to {0} timed out")]
    PublishTimeout(String),

    #[error("Session for device {0} is not connected")]
    NotConnected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller should degrade and carry on rather than stop.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Per-tick and per-measurement failures
            Error::UnknownSensorKind(_) => true,
            Error::Publish { .. } => true,
            Error::PublishTimeout(_) => true,
            Error::NotConnected(_) => true,
            Error::Mqtt(_) => true,
            Error::Json(_) => true,

            // A refused session stays down; startup problems stop the binary
            Error::Connection { .. } => false,
            Error::Config(_) => false,
            Error::Io(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
