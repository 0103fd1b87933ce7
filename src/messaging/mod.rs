mod kafka_publisher;
mod kafka_source;

use async_trait::async_trait;

use crate::errors::{PublishError, QueueReadError};

pub use kafka_publisher::KafkaPublisher;
pub use kafka_source::KafkaSource;

/// Enqueue one serialized event. Resolves once the broker has accepted it.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// At-least-once stream of raw queue messages.
#[async_trait]
pub trait MessageSource: Send {
    /// Block until the next message or read error. `None` means the source
    /// is exhausted; a broker-backed source never returns it.
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, QueueReadError>>;
}
