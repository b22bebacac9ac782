//! Structured observability events.
//!
//! The scheduler core emits one event per notable transition to an injected
//! [`EventSink`]. The default [`TracingSink`] turns them into `tracing` log
//! records; tests use [`RecordingSink`] to assert on exact sequences.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::task::TaskId;

/// An event emitted by the scheduler core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SchedulerEvent {
    /// A fire time was queued for a task.
    TaskScheduled {
        id: TaskId,
        name: String,
        fire_at: DateTime<Utc>,
    },
    /// A firing was dispatched.
    TaskStarted {
        id: TaskId,
        name: String,
        scheduled_for: DateTime<Utc>,
    },
    /// A callback returned successfully.
    TaskCompleted {
        id: TaskId,
        name: String,
        finished_at: DateTime<Utc>,
    },
    /// A callback returned an error or panicked. Future firings are
    /// unaffected.
    TaskFailed {
        id: TaskId,
        name: String,
        error: String,
    },
    /// A firing was skipped because the previous invocation was still
    /// running and the task's overlap policy is skip-and-reschedule.
    TaskSkippedOverlap {
        id: TaskId,
        name: String,
        fire_at: DateTime<Utc>,
    },
    /// A task was unregistered.
    TaskCancelled { id: TaskId, name: String },
    /// The worker pool rejected or dropped a submission.
    PoolSaturated { id: TaskId, name: String },
    /// The drain phase of shutdown exceeded its timeout.
    ShutdownTimedOut { remaining: usize },
}

/// Receives scheduler events. Implementations must be cheap and non-blocking;
/// they run on the scheduler loop.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: &SchedulerEvent);
}

/// Logs every event through `tracing`. This is the degenerate "print a line
/// per firing" sink, structured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SchedulerEvent) {
        match event {
            SchedulerEvent::TaskScheduled { id, name, fire_at } => {
                debug!(%id, name, %fire_at, "task scheduled");
            }
            SchedulerEvent::TaskStarted {
                id,
                name,
                scheduled_for,
            } => {
                info!(%id, name, %scheduled_for, "task started");
            }
            SchedulerEvent::TaskCompleted {
                id,
                name,
                finished_at,
            } => {
                info!(%id, name, %finished_at, "task completed");
            }
            SchedulerEvent::TaskFailed { id, name, error } => {
                warn!(%id, name, error, "task failed");
            }
            SchedulerEvent::TaskSkippedOverlap { id, name, fire_at } => {
                warn!(%id, name, %fire_at, "firing skipped, previous invocation still running");
            }
            SchedulerEvent::TaskCancelled { id, name } => {
                info!(%id, name, "task cancelled");
            }
            SchedulerEvent::PoolSaturated { id, name } => {
                warn!(%id, name, "worker pool saturated, firing dropped");
            }
            SchedulerEvent::ShutdownTimedOut { remaining } => {
                warn!(remaining, "drain timed out, remaining runs force-cancelled");
            }
        }
    }
}

/// Buffers every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SchedulerEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events emitted so far, in order.
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.lock().clone()
    }

    /// Drain and return the buffered events.
    pub fn take(&self) -> Vec<SchedulerEvent> {
        let mut guard = self.lock();
        std::mem::take(&mut *guard)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SchedulerEvent>> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &SchedulerEvent) {
        self.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn recording_sink_preserves_order() {
        let sink = RecordingSink::new();
        let id = TaskId(1);
        sink.emit(&SchedulerEvent::TaskStarted {
            id,
            name: "a".to_string(),
            scheduled_for: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        });
        sink.emit(&SchedulerEvent::TaskCancelled {
            id,
            name: "a".to_string(),
        });

        let events = sink.take();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SchedulerEvent::TaskStarted { .. }));
        assert!(matches!(events[1], SchedulerEvent::TaskCancelled { .. }));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn events_serialize_with_kebab_case_tags() {
        let event = SchedulerEvent::TaskSkippedOverlap {
            id: TaskId(3),
            name: "slow".to_string(),
            fire_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"task-skipped-overlap\""));
    }
}
