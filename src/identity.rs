use chrono::Utc;

use crate::models::{IngestedEvent, LogId};

/// Identity stamped onto a record at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Identity {
    pub log_id: LogId,
    pub timestamp: i64,
}

/// Assign a fresh `log_id` and the current wall-clock second.
///
/// Nothing is derived from the event itself, so redelivering the same queue
/// message yields a different identity. Concurrent dispatches may share a
/// timestamp. Any client-side event time in the payload is ignored.
pub fn assign(_event: &IngestedEvent) -> Identity {
    Identity {
        log_id: LogId::generate(),
        timestamp: Utc::now().timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn event() -> IngestedEvent {
        IngestedEvent {
            project_id: "p1".to_string(),
            event_name: "click".to_string(),
            payload: Default::default(),
        }
    }

    #[test]
    fn test_timestamp_tracks_wall_clock() {
        let before = Utc::now().timestamp();
        let identity = assign(&event());
        let after = Utc::now().timestamp();

        assert!(identity.timestamp >= before && identity.timestamp <= after);
    }

    #[test]
    fn test_same_event_gets_new_identity() {
        let e = event();
        assert_ne!(assign(&e).log_id, assign(&e).log_id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ids_never_collide() {
        const TASKS: usize = 4;
        const PER_TASK: usize = 25_000;

        let handles: Vec<_> = (0..TASKS)
            .map(|_| {
                tokio::spawn(async move {
                    let e = event();
                    (0..PER_TASK).map(|_| assign(&e).log_id).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::with_capacity(TASKS * PER_TASK);
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate log_id {}", id);
            }
        }
        assert_eq!(seen.len(), 100_000);
    }
}
