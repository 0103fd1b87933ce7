// ============================================================================
// Storage
// ============================================================================
//
// Write side: one `RecordSink` per backend, each taking its own record shape
// and performing exactly one insert. No batching, no retry.
//
// Read side: `RecordLookup` (wide-record store, exact key) and `IndexSearch`
// (index store, time-ordered scan) back the read API. They share backend
// handles with the sinks but are separate types so the sinks stay
// write-only.
//
// ============================================================================

mod index_store;
mod projects;
mod wide_store;

use async_trait::async_trait;

use crate::errors::{QueryError, WriteError};
use crate::models::{IndexHit, StoredLog};

pub use index_store::{connect_clickhouse, ClickHouseIndexSearch, ClickHouseIndexSink};
pub use projects::{connect_postgres, PgProjectKeyStore, ProjectKeyStore};
pub use wide_store::{connect_scylla, ScyllaLogSink, ScyllaRecordLookup};

pub const SEARCH_LIMIT: u64 = 100;

/// Persist one record to one backend.
#[async_trait]
pub trait RecordSink<R>: Send + Sync {
    /// Label used in logs, metrics and health reports.
    fn name(&self) -> &'static str;

    async fn write_log(&self, record: &R) -> Result<(), WriteError>;
}

#[async_trait]
pub trait RecordLookup: Send + Sync {
    async fn find(&self, project_id: &str, log_id: &str) -> Result<Option<StoredLog>, QueryError>;
}

#[async_trait]
pub trait IndexSearch: Send + Sync {
    /// Newest first, at most `SEARCH_LIMIT` hits. A non-empty `search`
    /// filters `event_name` by case-insensitive substring.
    async fn search(&self, project_id: &str, search: Option<&str>) -> Result<Vec<IndexHit>, QueryError>;
}
