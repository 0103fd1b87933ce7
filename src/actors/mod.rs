// ============================================================================
// Actors Module
// ============================================================================
//
// Actors are reserved for infrastructure concerns. The dispatcher loop and
// the gateway are plain async code; only health aggregation is an actor.
//
// ============================================================================

mod health;
mod health_monitor;

pub use health::{ComponentHealth, HealthStatus, CONSUMER, PUBLISHER};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
