//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the worker pool does with a submission when every slot is busy and
/// the overflow queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject the submission; the firing is dropped and reported.
    #[default]
    Reject,
    /// Drop the oldest queued (not yet started) submission to make room.
    /// With a zero-capacity queue there is nothing to drop, so this
    /// degenerates to `Reject`.
    DropOldest,
}

/// Configuration for the scheduler core and its worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker pool execution slots.
    pub worker_slots: usize,
    /// Bounded overflow queue capacity for submissions beyond the slots.
    pub queue_capacity: usize,
    /// Policy when slots and queue are both full.
    pub overflow: OverflowPolicy,
    /// Default drain timeout used when the scheduler stops because its
    /// handle was dropped without an explicit `stop`.
    pub drain_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_slots: 4,
            queue_capacity: 16,
            overflow: OverflowPolicy::default(),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl SchedulerConfig {
    pub fn with_worker_slots(mut self, slots: usize) -> Self {
        self.worker_slots = slots.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}
