use rdkafka::error::KafkaError;

// ============================================================================
// Pipeline Errors
// ============================================================================
//
// None of these ever reach the HTTP caller once its request has been
// accepted. They surface only through logs and metrics.
//
// ============================================================================

/// Malformed queue message. The message is dropped.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message body is empty")]
    Empty,

    #[error("invalid message json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no project_id")]
    MissingProjectId,
}

/// Transient broker failure while waiting for the next message.
#[derive(Debug, thiserror::Error)]
pub enum QueueReadError {
    #[error("kafka read failed: {0}")]
    Kafka(#[from] KafkaError),

    #[error("queue read failed: {0}")]
    Source(String),
}

/// A sink backend rejected or timed out on an insert.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("scylla insert failed: {0}")]
    Scylla(#[from] scylla::errors::ExecutionError),

    #[error("clickhouse insert failed: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    #[error("record rejected: {0}")]
    InvalidRecord(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("kafka send failed: {0}")]
    Kafka(#[from] KafkaError),

    #[error("publisher circuit breaker is open")]
    CircuitOpen,

    #[error("publish failed: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("wide-record store query failed: {0}")]
    WideStore(String),

    #[error("index store query failed: {0}")]
    Index(#[from] clickhouse::error::Error),
}
