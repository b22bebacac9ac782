//! In-process recurring task scheduler.
//!
//! This crate provides an engine that:
//! - Fires tasks on fixed-rate, fixed-delay, and six-field cron triggers
//! - Runs callbacks on a bounded worker pool, isolated from the loop
//! - Handles overlap (skip-and-reschedule or allow-concurrent) and drift
//! - Supports cancellation and graceful drain on shutdown
//! - Emits structured events to an injectable sink
//!
//! Trigger specs use the grammar `fixedRate:<ms>`, `fixedDelay:<ms>`, or
//! `cron:<sec min hour dom month dow>`. Task state is in-memory only; nothing
//! survives a restart.

mod clock;
mod config;
mod cron;
mod error;
mod events;
mod pool;
mod scheduler;
mod task;
mod trigger;

pub use clock::{Clock, ManualClock, SystemClock, VirtualClock};
pub use config::{OverflowPolicy, SchedulerConfig};
pub use cron::CronExpression;
pub use error::{ParseError, SchedulerError};
pub use events::{EventSink, RecordingSink, SchedulerEvent, TracingSink};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use task::{
    DispatchMode, OverlapPolicy, TaskCallback, TaskFuture, TaskId, TaskOptions, TaskSnapshot,
    TaskState,
};
pub use trigger::Trigger;
