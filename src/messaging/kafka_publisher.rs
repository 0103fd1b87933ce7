use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    error::KafkaResult,
    producer::{FutureProducer, FutureRecord, Producer},
    util::Timeout,
};
use std::time::Duration;

use super::EventPublisher;
use crate::errors::PublishError;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

/// Producer side of the queue. One long-lived producer shared by every
/// gateway worker; each send waits for the broker acknowledgement.
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
    circuit_breaker: CircuitBreaker,
}

impl KafkaPublisher {
    pub fn new(brokers: &str, topic: &str, timeout: Duration) -> KafkaResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", "all")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
            timeout,
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        })
    }

    pub fn circuit_breaker(&self) -> CircuitBreaker {
        self.circuit_breaker.clone()
    }

    /// Wait for queued messages to be delivered before the process exits.
    pub fn flush(&self) -> KafkaResult<()> {
        self.producer.flush(Timeout::After(self.timeout))
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&self.topic).key(key).payload(payload);

                self.producer
                    .send(record, Timeout::After(self.timeout))
                    .await
                    .map_err(|(e, _)| PublishError::Kafka(e))
            })
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(topic = %self.topic, key = %key, "Published to Kafka");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %self.topic, "Circuit breaker open - Kafka unavailable");
                Err(PublishError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %self.topic, "Failed to publish to Kafka");
                Err(e)
            }
        }
    }
}
