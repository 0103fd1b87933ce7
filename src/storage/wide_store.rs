use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::prepared::PreparedStatement;
use scylla::statement::Consistency;
use std::collections::HashMap;
use std::sync::Arc;

use super::{RecordLookup, RecordSink};
use crate::config::ScyllaSettings;
use crate::errors::{QueryError, WriteError};
use crate::models::{LogRecord, StoredLog};

// ============================================================================
// Wide-record store (ScyllaDB / Cassandra)
// ============================================================================
//
// Table `logs`, primary key ((project_id), log_id). Holds the full event
// with its flattened payload map for exact-key retrieval.
//
// ============================================================================

const INSERT_LOG: &str =
    "INSERT INTO logs (project_id, log_id, event_name, timestamp, payload) VALUES (?, ?, ?, ?, ?)";

const SELECT_LOG: &str = "SELECT project_id, log_id, event_name, timestamp, payload \
     FROM logs WHERE project_id = ? AND log_id = ? LIMIT 1";

pub async fn connect_scylla(settings: &ScyllaSettings) -> anyhow::Result<Arc<Session>> {
    let mut builder = SessionBuilder::new()
        .known_nodes(&settings.hosts)
        .use_keyspace(&settings.keyspace, false);

    if settings.user.is_some() || settings.password.is_some() {
        builder = builder.user(
            settings.user.clone().unwrap_or_default(),
            settings.password.clone().unwrap_or_default(),
        );
    }

    let session = builder
        .build()
        .await
        .with_context(|| format!("connecting to Scylla at {:?}", settings.hosts))?;

    tracing::info!(hosts = ?settings.hosts, keyspace = %settings.keyspace, "Connected to Scylla");
    Ok(Arc::new(session))
}

pub struct ScyllaLogSink {
    session: Arc<Session>,
    insert: PreparedStatement,
}

impl ScyllaLogSink {
    pub async fn new(session: Arc<Session>) -> anyhow::Result<Self> {
        let mut insert = session
            .prepare(INSERT_LOG)
            .await
            .context("preparing wide-record insert")?;
        insert.set_consistency(Consistency::Quorum);

        Ok(Self { session, insert })
    }
}

#[async_trait]
impl RecordSink<LogRecord> for ScyllaLogSink {
    fn name(&self) -> &'static str {
        "wide"
    }

    async fn write_log(&self, record: &LogRecord) -> Result<(), WriteError> {
        let timestamp = DateTime::<Utc>::from_timestamp(record.timestamp, 0).ok_or_else(|| {
            WriteError::InvalidRecord(format!("timestamp out of range: {}", record.timestamp))
        })?;

        self.session
            .execute_unpaged(
                &self.insert,
                (
                    record.project_id.as_str(),
                    record.log_id.to_string(),
                    record.event_name.as_str(),
                    timestamp,
                    &record.payload,
                ),
            )
            .await?;

        Ok(())
    }
}

pub struct ScyllaRecordLookup {
    session: Arc<Session>,
    select: PreparedStatement,
}

impl ScyllaRecordLookup {
    pub async fn new(session: Arc<Session>) -> anyhow::Result<Self> {
        let mut select = session
            .prepare(SELECT_LOG)
            .await
            .context("preparing wide-record lookup")?;
        select.set_consistency(Consistency::One);

        Ok(Self { session, select })
    }
}

type LogRow = (
    String,
    String,
    String,
    DateTime<Utc>,
    Option<HashMap<String, String>>,
);

#[async_trait]
impl RecordLookup for ScyllaRecordLookup {
    async fn find(&self, project_id: &str, log_id: &str) -> Result<Option<StoredLog>, QueryError> {
        let result = self
            .session
            .execute_unpaged(&self.select, (project_id, log_id))
            .await
            .map_err(|e| QueryError::WideStore(e.to_string()))?;

        let rows_result = result
            .into_rows_result()
            .map_err(|e| QueryError::WideStore(e.to_string()))?;

        let row = rows_result
            .maybe_first_row::<LogRow>()
            .map_err(|e| QueryError::WideStore(e.to_string()))?;

        Ok(row.map(|(project_id, log_id, event_name, timestamp, payload)| StoredLog {
            project_id,
            log_id,
            event_name,
            timestamp: timestamp.timestamp(),
            payload: payload.unwrap_or_default(),
        }))
    }
}
