//! In-memory stand-ins for the queue, the sinks and the project database.
//! Used by the unit tests and by the integration suite under `tests/`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};

use crate::errors::{PublishError, QueryError, QueueReadError, WriteError};
use crate::messaging::{EventPublisher, MessageSource};
use crate::models::{IndexHit, IndexRecord, LogRecord, StoredLog};
use crate::storage::{IndexSearch, ProjectKeyStore, RecordLookup, RecordSink, SEARCH_LIMIT};

pub struct MemorySink<R> {
    name: &'static str,
    records: Mutex<Vec<R>>,
}

impl<R: Clone> MemorySink<R> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            records: Mutex::new(Vec::new()),
        }
    }

    pub async fn records(&self) -> Vec<R> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> RecordSink<R> for MemorySink<R> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn write_log(&self, record: &R) -> Result<(), WriteError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl IndexSearch for MemorySink<IndexRecord> {
    async fn search(&self, project_id: &str, search: Option<&str>) -> Result<Vec<IndexHit>, QueryError> {
        let term = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<IndexRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.project_id == project_id)
            .filter(|r| match term {
                Some(ref term) => r.event_name.to_lowercase().contains(term),
                None => true,
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(rows
            .into_iter()
            .take(SEARCH_LIMIT as usize)
            .map(|r| IndexHit {
                log_id: r.log_id.to_string(),
                event_name: r.event_name,
                timestamp: r.timestamp,
            })
            .collect())
    }
}

#[async_trait]
impl RecordLookup for MemorySink<LogRecord> {
    async fn find(&self, project_id: &str, log_id: &str) -> Result<Option<StoredLog>, QueryError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|r| r.project_id == project_id && r.log_id.to_string() == log_id)
            .map(|r| StoredLog {
                project_id: r.project_id.clone(),
                log_id: r.log_id.to_string(),
                event_name: r.event_name.clone(),
                timestamp: r.timestamp,
                payload: r.payload.clone(),
            }))
    }
}

/// Sink whose backend rejects every insert.
pub struct FailingSink {
    name: &'static str,
}

impl FailingSink {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl<R: Send + Sync> RecordSink<R> for FailingSink {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn write_log(&self, _record: &R) -> Result<(), WriteError> {
        Err(WriteError::InvalidRecord(format!("{} backend unavailable", self.name)))
    }
}

/// Sink that holds every write until `open` releases it.
pub struct GatedSink<R> {
    inner: MemorySink<R>,
    gate: Semaphore,
}

impl<R: Clone> GatedSink<R> {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: MemorySink::new(name),
            gate: Semaphore::new(0),
        }
    }

    /// Let `writes` pending or future writes through.
    pub fn open(&self, writes: usize) {
        self.gate.add_permits(writes);
    }

    pub fn inner(&self) -> &MemorySink<R> {
        &self.inner
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> RecordSink<R> for GatedSink<R> {
    fn name(&self) -> &'static str {
        self.inner.name
    }

    async fn write_log(&self, record: &R) -> Result<(), WriteError> {
        self.gate
            .acquire()
            .await
            .map_err(|_| WriteError::InvalidRecord("gate closed".into()))?
            .forget();
        self.inner.write_log(record).await
    }
}

/// Queue source fed from a channel. Exhausted once every sender is dropped.
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Result<Vec<u8>, QueueReadError>>,
}

impl ChannelSource {
    pub fn new() -> (mpsc::UnboundedSender<Result<Vec<u8>, QueueReadError>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, QueueReadError>> {
        self.rx.recv().await
    }
}

/// Publisher that keeps every accepted message in memory. Optionally forwards
/// them into a `ChannelSource` so a dispatcher can consume them.
#[derive(Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    failing: AtomicBool,
    forward: Option<mpsc::UnboundedSender<Result<Vec<u8>, QueueReadError>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forwarding_to(tx: mpsc::UnboundedSender<Result<Vec<u8>, QueueReadError>>) -> Self {
        Self {
            forward: Some(tx),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// `(key, payload)` pairs in publish order.
    pub async fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(PublishError::Rejected("broker unavailable".into()));
        }

        self.published
            .lock()
            .await
            .push((key.to_string(), payload.to_vec()));

        if let Some(ref tx) = self.forward {
            tx.send(Ok(payload.to_vec()))
                .map_err(|_| PublishError::Rejected("queue closed".into()))?;
        }
        Ok(())
    }
}

/// Fixed project -> API key table.
#[derive(Default)]
pub struct StaticKeyStore {
    keys: HashMap<String, String>,
    unavailable: bool,
}

impl StaticKeyStore {
    pub fn new<I, K, V>(keys: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            unavailable: false,
        }
    }

    /// Store whose every lookup fails, as if the database were down.
    pub fn unavailable() -> Self {
        Self {
            keys: HashMap::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl ProjectKeyStore for StaticKeyStore {
    async fn api_key(&self, project_id: &str) -> Result<Option<String>, sqlx::Error> {
        if self.unavailable {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(self.keys.get(project_id).cloned())
    }
}

/// Poll `sink` until it holds at least `count` records or two seconds pass,
/// then return what it holds. Writes are detached, so tests cannot await them.
pub async fn wait_for_records<R: Clone>(sink: &Arc<MemorySink<R>>, count: usize) -> Vec<R> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);

    loop {
        let records = sink.records().await;
        if records.len() >= count || tokio::time::Instant::now() >= deadline {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
