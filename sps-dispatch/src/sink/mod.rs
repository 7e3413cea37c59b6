pub mod csv;
pub mod memory;
pub mod mqtt;

use async_trait::async_trait;
use sps_core::Reading;

/// Ways a sink can fail to take a reading. None of them affect polling.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("storage write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage lock poisoned: {0}")]
    Poisoned(String),

    #[error("broker {host}:{port} unreachable")]
    Unreachable { host: String, port: u16 },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("publish failed: {0}")]
    Publish(#[from] rumqttc::ClientError),

    #[error("broker connection failed: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("broker did not confirm the publish in time")]
    Timeout,
}

/// Destination for completed readings.
///
/// Sinks are called one after another for every reading, in the order the
/// reading arrived from its sensor.
#[async_trait]
pub trait ReadingSink: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Take one reading.
    async fn accept(&self, reading: &Reading) -> Result<(), SinkError>;
}
