//! Consumer loop: queue message -> identity -> concurrent writes to both sinks.
//!
//! The loop never waits for a write. Offsets are committed by the queue on
//! read, so a crash or a failed insert after a message is read loses that
//! record in one or both stores; nothing replays it.

mod fan_out;

use actix::Addr;
use std::sync::Arc;

use crate::actors::{HealthMonitorActor, HealthStatus, UpdateHealth, CONSUMER};
use crate::messaging::MessageSource;
use crate::metrics::Metrics;

pub use fan_out::{Dispatched, FanOut};

pub struct Dispatcher<S> {
    source: S,
    fan_out: FanOut,
    metrics: Arc<Metrics>,
    health: Option<Addr<HealthMonitorActor>>,
}

impl<S: MessageSource> Dispatcher<S> {
    pub fn new(source: S, fan_out: FanOut, metrics: Arc<Metrics>) -> Self {
        Self {
            source,
            fan_out,
            metrics,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Addr<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }

    fn report(&self, status: HealthStatus) {
        if let Some(ref health) = self.health {
            let read_errors = self.metrics.queue_read_errors.get();
            health.do_send(
                UpdateHealth::new(CONSUMER, status).with_details(format!("read_errors_total={read_errors}")),
            );
        }
    }

    /// Run until the source is exhausted. A broker-backed source never is,
    /// so in production this runs for the life of the process.
    ///
    /// Read errors are logged and the next read starts immediately, with no
    /// backoff. Undecodable messages are logged and dropped.
    pub async fn run(mut self) {
        tracing::info!("Dispatcher started");
        self.report(HealthStatus::Healthy);

        let mut read_failing = false;

        loop {
            // Waiting: the only suspension point of the loop.
            let bytes = match self.source.next_message().await {
                None => break,
                Some(Err(e)) => {
                    self.metrics.queue_read_errors.inc();
                    tracing::error!(error = %e, "Could not read message from queue");
                    if !read_failing {
                        read_failing = true;
                        self.report(HealthStatus::Degraded(e.to_string()));
                    }
                    continue;
                }
                Some(Ok(bytes)) => bytes,
            };

            if read_failing {
                read_failing = false;
                self.report(HealthStatus::Healthy);
            }

            // Dispatching: decode, stamp identity, spawn both writes.
            self.metrics.queue_messages_consumed.inc();

            match self.fan_out.dispatch(&bytes).await {
                Ok(dispatched) => {
                    tracing::debug!(log_id = %dispatched.log_id, "Dispatched event to sinks");
                }
                Err(e) => {
                    self.metrics.queue_decode_errors.inc();
                    tracing::warn!(error = %e, len = bytes.len(), "Dropping undecodable queue message");
                }
            }
        }

        tracing::info!("Queue source closed, dispatcher stopping");
    }
}
