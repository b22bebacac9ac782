//! Task types.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trigger::Trigger;

/// Identity of a registered task. Assigned by the scheduler in registration
/// order; ids are never reused within a scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type alias for the future a task callback returns.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'static>>;

/// Type alias for a task callback: a zero-argument unit of work that may fail.
pub type TaskCallback = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Registered but not yet queued (only before the engine starts).
    #[default]
    Idle,
    /// A fire time is pending in the queue.
    Scheduled,
    /// At least one invocation is executing.
    Running,
    /// Unregistered; terminal. In-flight execution may still finish but its
    /// result is discarded.
    Cancelled,
}

/// Whether a new firing may dispatch while a prior invocation of the same
/// task is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Skip the firing and catch up with a single late fire once the
    /// running invocation completes.
    #[default]
    SkipAndReschedule,
    /// Dispatch anyway; invocations of the same task may overlap.
    AllowConcurrent,
}

/// Where a task's callback executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Hand off to the worker pool (the default; required for any callback
    /// with unbounded duration).
    #[default]
    Pool,
    /// Run inline on the scheduler loop. This blocks all scheduling until
    /// the callback returns; only for trivial, fast tasks.
    Inline,
}

/// Per-task execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOptions {
    pub overlap: OverlapPolicy,
    pub dispatch: DispatchMode,
}

impl TaskOptions {
    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }
}

/// A registered task. Owned exclusively by the scheduler loop; everything
/// outside sees only [`TaskSnapshot`]s.
pub(crate) struct Task {
    pub id: TaskId,
    pub name: String,
    pub trigger: Trigger,
    pub callback: TaskCallback,
    pub options: TaskOptions,
    pub state: TaskState,
    /// Registration sequence; breaks fire-time ties FIFO.
    pub seq: u64,
    /// Number of invocations currently in flight (can exceed 1 only under
    /// `AllowConcurrent`).
    pub running: u32,
    /// A fixed-rate firing was skipped due to overlap; fire once on
    /// completion.
    pub pending_catchup: bool,
    pub last_scheduled_start: Option<DateTime<Utc>>,
    pub last_completion: Option<DateTime<Utc>>,
    pub runs_started: u64,
    pub failures: u64,
}

impl Task {
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            trigger: self.trigger.to_string(),
            state: self.state,
            last_scheduled_start: self.last_scheduled_start,
            last_completion: self.last_completion,
            runs_started: self.runs_started,
            failures: self.failures,
        }
    }
}

/// Read-only view of a task's current state and run metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    /// Canonical trigger spec string (`fixedRate:<ms>`, `fixedDelay:<ms>`,
    /// or `cron:<expr>`).
    pub trigger: String,
    pub state: TaskState,
    pub last_scheduled_start: Option<DateTime<Utc>>,
    pub last_completion: Option<DateTime<Utc>>,
    pub runs_started: u64,
    pub failures: u64,
}
