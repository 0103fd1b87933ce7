use actix::Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::actors::{HealthMonitorActor, HealthStatus, UpdateHealth};
use crate::errors::{DecodeError, WriteError};
use crate::identity::{self, Identity};
use crate::metrics::Metrics;
use crate::models::{IndexRecord, IngestedEvent, LogId, LogRecord};
use crate::storage::RecordSink;

/// Handles to the two writes spawned for one event.
///
/// The dispatcher loop drops these, leaving the writes detached. Tests await
/// them to observe each outcome.
pub struct Dispatched {
    pub log_id: LogId,
    pub wide: JoinHandle<Result<(), WriteError>>,
    pub index: JoinHandle<Result<(), WriteError>>,
}

/// One sink plus its optional in-flight limit and last reported health.
struct Lane<R> {
    sink: Arc<dyn RecordSink<R>>,
    limit: Option<Arc<Semaphore>>,
    degraded: Arc<AtomicBool>,
}

impl<R: Send + Sync + 'static> Lane<R> {
    fn new(sink: Arc<dyn RecordSink<R>>) -> Self {
        Self {
            sink,
            limit: None,
            degraded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the write as an independent task. Only waits when a write limit
    /// is configured and the sink is saturated.
    async fn spawn(
        &self,
        record: R,
        log_id: LogId,
        metrics: Arc<Metrics>,
        health: Option<Addr<HealthMonitorActor>>,
    ) -> JoinHandle<Result<(), WriteError>> {
        let permit = match self.limit {
            Some(ref limit) => limit.clone().acquire_owned().await.ok(),
            None => None,
        };

        let sink = self.sink.clone();
        let degraded = self.degraded.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let name = sink.name();
            let in_flight = metrics.sink_in_flight.with_label_values(&[name]);

            in_flight.inc();
            let started = Instant::now();
            let result = sink.write_log(&record).await;
            in_flight.dec();

            metrics.record_sink_write(name, started.elapsed().as_secs_f64(), result.is_ok());

            match result {
                Ok(()) => {
                    tracing::debug!(sink = name, log_id = %log_id, "Stored record");
                    if degraded.swap(false, Ordering::Relaxed) {
                        report(&health, name, HealthStatus::Healthy, format!("recovered at log_id={log_id}"));
                    }
                }
                Err(ref e) => {
                    tracing::error!(sink = name, log_id = %log_id, error = %e, "Could not write record");
                    if !degraded.swap(true, Ordering::Relaxed) {
                        report(
                            &health,
                            name,
                            HealthStatus::Degraded(e.to_string()),
                            format!("first failed write log_id={log_id}"),
                        );
                    }
                }
            }

            result
        })
    }
}

fn report(health: &Option<Addr<HealthMonitorActor>>, sink: &str, status: HealthStatus, details: String) {
    if let Some(health) = health {
        health.do_send(UpdateHealth::new(format!("{sink}_sink"), status).with_details(details));
    }
}

/// Turns one queue message into a `LogRecord` and an `IndexRecord` and
/// writes them concurrently, each to its own sink.
///
/// The two writes are unordered and uncorrelated: neither waits for the
/// other and a failure of one does not affect the other.
pub struct FanOut {
    wide: Lane<LogRecord>,
    index: Lane<IndexRecord>,
    searchable_field: String,
    metrics: Arc<Metrics>,
    health: Option<Addr<HealthMonitorActor>>,
}

impl FanOut {
    pub fn new(
        wide: Arc<dyn RecordSink<LogRecord>>,
        index: Arc<dyn RecordSink<IndexRecord>>,
        searchable_field: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            wide: Lane::new(wide),
            index: Lane::new(index),
            searchable_field: searchable_field.into(),
            metrics,
            health: None,
        }
    }

    /// Cap in-flight writes per sink. Once a sink has `max_in_flight` writes
    /// pending, dispatching waits for one to finish, which holds back the
    /// queue read loop. The other sink's write for the same event is spawned
    /// without waiting. 0 leaves fan-out unbounded.
    pub fn with_write_limit(mut self, max_in_flight: usize) -> Self {
        if max_in_flight > 0 {
            self.wide.limit = Some(Arc::new(Semaphore::new(max_in_flight)));
            self.index.limit = Some(Arc::new(Semaphore::new(max_in_flight)));
        }
        self
    }

    pub fn with_health(mut self, health: Addr<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn dispatch(&self, bytes: &[u8]) -> Result<Dispatched, DecodeError> {
        let event = IngestedEvent::decode(bytes)?;
        Ok(self.fan_out(&event).await)
    }

    pub async fn fan_out(&self, event: &IngestedEvent) -> Dispatched {
        let Identity { log_id, timestamp } = identity::assign(event);

        let log = LogRecord::from_event(event, log_id, timestamp);
        let index = IndexRecord::from_event(event, log_id, timestamp, &self.searchable_field);

        // Each lane waits only on its own write limit.
        let (wide, index) = tokio::join!(
            self.wide
                .spawn(log, log_id, self.metrics.clone(), self.health.clone()),
            self.index
                .spawn(index, log_id, self.metrics.clone(), self.health.clone()),
        );

        Dispatched { log_id, wide, index }
    }
}
