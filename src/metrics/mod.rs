// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

pub use server::metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the ingestion pipeline
// ============================================================================
//
// Covers both halves of the pipeline:
// - Gateway request outcomes
// - Queue consumption (messages, read errors, decode drops)
// - Per-sink write outcomes, latency and in-flight writes
// - Publisher circuit breaker state
//
// Scraped via /metrics on the metrics server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub gateway_requests: IntCounterVec,

    pub queue_messages_consumed: IntCounter,
    pub queue_read_errors: IntCounter,
    pub queue_decode_errors: IntCounter,

    pub sink_writes: IntCounterVec,
    pub sink_write_duration: HistogramVec,
    pub sink_in_flight: IntGaugeVec,

    pub publisher_circuit_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let gateway_requests = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Ingestion requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(gateway_requests.clone()))?;

        let queue_messages_consumed = IntCounter::new(
            "queue_messages_consumed_total",
            "Messages read from the queue",
        )?;
        registry.register(Box::new(queue_messages_consumed.clone()))?;

        let queue_read_errors = IntCounter::new(
            "queue_read_errors_total",
            "Failed reads from the queue",
        )?;
        registry.register(Box::new(queue_read_errors.clone()))?;

        let queue_decode_errors = IntCounter::new(
            "queue_decode_errors_total",
            "Queue messages dropped because they could not be decoded",
        )?;
        registry.register(Box::new(queue_decode_errors.clone()))?;

        let sink_writes = IntCounterVec::new(
            Opts::new("sink_writes_total", "Sink writes by outcome"),
            &["sink", "outcome"],
        )?;
        registry.register(Box::new(sink_writes.clone()))?;

        let sink_write_duration = HistogramVec::new(
            HistogramOpts::new("sink_write_duration_seconds", "Sink write round-trip time")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["sink"],
        )?;
        registry.register(Box::new(sink_write_duration.clone()))?;

        let sink_in_flight = IntGaugeVec::new(
            Opts::new("sink_in_flight_writes", "Sink writes currently awaiting the backend"),
            &["sink"],
        )?;
        registry.register(Box::new(sink_in_flight.clone()))?;

        let publisher_circuit_state = IntGauge::new(
            "publisher_circuit_state",
            "Publisher circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(publisher_circuit_state.clone()))?;

        Ok(Self {
            registry,
            gateway_requests,
            queue_messages_consumed,
            queue_read_errors,
            queue_decode_errors,
            sink_writes,
            sink_write_duration,
            sink_in_flight,
            publisher_circuit_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_gateway_request(&self, outcome: &str) {
        self.gateway_requests.with_label_values(&[outcome]).inc();
    }

    pub fn record_sink_write(&self, sink: &str, duration_secs: f64, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.sink_writes.with_label_values(&[sink, outcome]).inc();
        self.sink_write_duration
            .with_label_values(&[sink])
            .observe(duration_secs);
    }
}
