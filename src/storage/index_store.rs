use anyhow::Context;
use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};

use super::{IndexSearch, RecordSink, SEARCH_LIMIT};
use crate::config::ClickHouseSettings;
use crate::errors::{QueryError, WriteError};
use crate::models::{IndexHit, IndexRecord};

// ============================================================================
// Index store (ClickHouse)
// ============================================================================
//
// Table `logs_index`, MergeTree ordered by (project_id, timestamp). One row
// per event with the designated searchable key pulled out of the payload.
//
// ============================================================================

const INDEX_TABLE: &str = "logs_index";

#[derive(Debug, Row, Serialize)]
struct IndexRow {
    project_id: String,
    log_id: String,
    event_name: String,
    timestamp: i64,
    searchable_key: Option<String>,
}

impl From<&IndexRecord> for IndexRow {
    fn from(record: &IndexRecord) -> Self {
        Self {
            project_id: record.project_id.clone(),
            log_id: record.log_id.to_string(),
            event_name: record.event_name.clone(),
            timestamp: record.timestamp,
            searchable_key: record.searchable_key.clone(),
        }
    }
}

#[derive(Debug, Row, Deserialize)]
struct HitRow {
    log_id: String,
    event_name: String,
    timestamp: i64,
}

pub async fn connect_clickhouse(settings: &ClickHouseSettings) -> anyhow::Result<Client> {
    let client = Client::default()
        .with_url(settings.url())
        .with_database(&settings.database)
        .with_user(&settings.user)
        .with_password(&settings.password);

    client
        .query("SELECT 1")
        .execute()
        .await
        .with_context(|| format!("connecting to ClickHouse at {}", settings.url()))?;

    tracing::info!(url = %settings.url(), database = %settings.database, "Connected to ClickHouse");
    Ok(client)
}

pub struct ClickHouseIndexSink {
    client: Client,
}

impl ClickHouseIndexSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecordSink<IndexRecord> for ClickHouseIndexSink {
    fn name(&self) -> &'static str {
        "index"
    }

    async fn write_log(&self, record: &IndexRecord) -> Result<(), WriteError> {
        let mut insert = self.client.insert::<IndexRow>(INDEX_TABLE)?;
        insert.write(&IndexRow::from(record)).await?;
        insert.end().await?;
        Ok(())
    }
}

pub struct ClickHouseIndexSearch {
    client: Client,
}

impl ClickHouseIndexSearch {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Escape LIKE wildcards so the search term matches literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl IndexSearch for ClickHouseIndexSearch {
    async fn search(&self, project_id: &str, search: Option<&str>) -> Result<Vec<IndexHit>, QueryError> {
        let term = search.map(str::trim).filter(|s| !s.is_empty());

        let query = match term {
            Some(term) => self
                .client
                .query(
                    "SELECT ?fields FROM logs_index \
                     WHERE project_id = ? AND event_name ILIKE ? \
                     ORDER BY timestamp DESC LIMIT ?",
                )
                .bind(project_id)
                .bind(like_pattern(term))
                .bind(SEARCH_LIMIT),
            None => self
                .client
                .query(
                    "SELECT ?fields FROM logs_index \
                     WHERE project_id = ? \
                     ORDER BY timestamp DESC LIMIT ?",
                )
                .bind(project_id)
                .bind(SEARCH_LIMIT),
        };

        let rows = query.fetch_all::<HitRow>().await?;

        Ok(rows
            .into_iter()
            .map(|row| IndexHit {
                log_id: row.log_id,
                event_name: row.event_name,
                timestamp: row.timestamp,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogId;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("click"), "%click%");
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
    }

    #[test]
    fn test_index_row_from_record() {
        let log_id = LogId::generate();
        let row = IndexRow::from(&IndexRecord {
            project_id: "p1".into(),
            log_id,
            event_name: "click".into(),
            timestamp: 1_700_000_000,
            searchable_key: None,
        });

        assert_eq!(row.log_id, log_id.to_string());
        assert_eq!(row.searchable_key, None);
        assert_eq!(row.timestamp, 1_700_000_000);
    }
}
