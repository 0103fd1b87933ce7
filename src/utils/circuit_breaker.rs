use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards the Kafka publisher. While open, publish attempts fail fast so the
// gateway can answer 500 without waiting out the producer timeout.
//
//   Closed --(failure_threshold failures)--> Open
//   Open --(open_for elapsed)--> HalfOpen
//   HalfOpen --(success_threshold successes)--> Closed
//   HalfOpen --(any failure)--> Open
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0=Closed, 1=Open, 2=HalfOpen
    pub fn as_gauge(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_for: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_for: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error> std::error::Error for CircuitBreakerError<E> {}

struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

impl Inner {
    fn transition(&mut self, to: CircuitState) {
        if self.state != to {
            tracing::info!(from = ?self.state, to = ?to, "Circuit breaker transition");
        }
        self.state = to;
        self.successes = 0;
        match to {
            CircuitState::Open => self.opened_at = Some(Instant::now()),
            CircuitState::Closed => {
                self.failures = 0;
                self.opened_at = None;
            }
            CircuitState::HalfOpen => {}
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<Inner>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            })),
            config,
        }
    }

    /// Run `operation` unless the circuit is open.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == CircuitState::Open {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.open_for);
                if !cooled_down {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
                inner.transition(CircuitState::HalfOpen);
            }
        }

        let outcome = operation.await;

        let mut inner = self.inner.lock().await;
        match (&outcome, inner.state) {
            (Ok(_), CircuitState::HalfOpen) => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    inner.transition(CircuitState::Closed);
                }
            }
            (Ok(_), _) => inner.failures = 0,
            (Err(_), CircuitState::HalfOpen) => inner.transition(CircuitState::Open),
            (Err(_), _) => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    tracing::warn!(failures = inner.failures, "Opening circuit breaker");
                    inner.transition(CircuitState::Open);
                }
            }
        }

        outcome.map_err(CircuitBreakerError::OperationFailed)
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: u32, open_for_ms: u64, successes: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: failures,
            open_for: Duration::from_millis(open_for_ms),
            success_threshold: successes,
        })
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let cb = breaker(3, 60_000, 1);

        for _ in 0..3 {
            assert!(cb.call(async { Err::<(), _>("boom") }).await.is_err());
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(2, 60_000, 1);

        let _ = cb.call(async { Err::<(), _>("boom") }).await;
        let _ = cb.call(async { Ok::<_, &str>(()) }).await;
        let _ = cb.call(async { Err::<(), _>("boom") }).await;

        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_recovery_and_relapse() {
        let cb = breaker(1, 50, 2);

        let _ = cb.call(async { Err::<(), _>("boom") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cb.call(async { Ok::<_, &str>(()) }).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        let _ = cb.call(async { Err::<(), _>("boom") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        for _ in 0..2 {
            assert!(cb.call(async { Ok::<_, &str>(()) }).await.is_ok());
        }
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
