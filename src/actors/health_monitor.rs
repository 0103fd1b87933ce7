use actix::prelude::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::health::{ComponentHealth, HealthStatus, PUBLISHER};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitState};

// ============================================================================
// Health Monitor Actor
// ============================================================================
//
// Aggregates health reported by the pipeline components:
// - kafka_publisher: polled from the publisher's circuit breaker
// - queue_consumer: reported by the dispatcher loop
// - one entry per sink: reported by fan-out writes
//
// Reports arrive fire-and-forget via `do_send`.
//
// ============================================================================

const CIRCUIT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Message)]
#[rtype(result = "()")]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

impl UpdateHealth {
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            component: component.into(),
            status,
            details: None,
        }
    }

    /// Context for the report, such as the event that triggered it.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Message)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    publisher_circuit: Option<CircuitBreaker>,
    metrics: Option<Arc<Metrics>>,
}

impl HealthMonitorActor {
    pub fn new() -> Self {
        Self {
            components: HashMap::new(),
            publisher_circuit: None,
            metrics: None,
        }
    }

    /// Poll the publisher's circuit breaker and mirror it into health and the
    /// `publisher_circuit_state` gauge.
    pub fn watch_publisher(mut self, circuit: CircuitBreaker, metrics: Arc<Metrics>) -> Self {
        self.publisher_circuit = Some(circuit);
        self.metrics = Some(metrics);
        self
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => unhealthy.push(format!("{}: {}", name, msg)),
                HealthStatus::Degraded(_) => has_degraded = true,
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy.is_empty() {
            unhealthy.sort();
            HealthStatus::Unhealthy(unhealthy.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Default for HealthMonitorActor {
    fn default() -> Self {
        Self::new()
    }
}

fn circuit_health(state: CircuitState) -> HealthStatus {
    match state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
        CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
    }
}

impl Actor for HealthMonitorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor started");

        let addr = ctx.address();
        ctx.run_interval(CIRCUIT_POLL_INTERVAL, move |act, _ctx| {
            let Some(circuit) = act.publisher_circuit.clone() else {
                return;
            };
            let metrics = act.metrics.clone();
            let addr = addr.clone();

            actix::spawn(async move {
                let state = circuit.state().await;
                if let Some(metrics) = metrics {
                    metrics.publisher_circuit_state.set(state.as_gauge());
                }
                addr.do_send(UpdateHealth::new(PUBLISHER, circuit_health(state)));
            });
        });
    }
}

impl Handler<UpdateHealth> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateHealth, _: &mut Self::Context) {
        tracing::debug!(
            component = %msg.component,
            status = ?msg.status,
            "Updated component health"
        );

        let health = ComponentHealth::new(msg.component.clone(), msg.status).with_details(msg.details);
        self.components.insert(msg.component, health);
    }
}

impl Handler<GetSystemHealth> for HealthMonitorActor {
    type Result = MessageResult<GetSystemHealth>;

    fn handle(&mut self, _msg: GetSystemHealth, _: &mut Self::Context) -> Self::Result {
        MessageResult(SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        })
    }
}
