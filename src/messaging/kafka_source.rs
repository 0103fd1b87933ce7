use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::Message;
use rdkafka::ClientConfig;

use super::MessageSource;
use crate::errors::QueueReadError;

/// Consumer side of the queue.
///
/// Offsets are auto-committed on read, so a message counts as processed as
/// soon as it is handed to the dispatcher, before either sink write lands.
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> KafkaResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .create()?;

        consumer.subscribe(&[topic])?;
        tracing::info!(topic = %topic, group_id = %group_id, "Subscribed to Kafka topic");

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, QueueReadError>> {
        let message = match self.consumer.recv().await {
            Ok(message) => message,
            Err(e) => return Some(Err(QueueReadError::Kafka(e))),
        };

        tracing::trace!(
            partition = message.partition(),
            offset = message.offset(),
            "Received queue message"
        );

        // A tombstone has no body and falls through to the decoder as empty.
        Some(Ok(message.payload().map(<[u8]>::to_vec).unwrap_or_default()))
    }
}
