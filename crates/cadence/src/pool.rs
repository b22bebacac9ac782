//! Bounded worker pool.
//!
//! A fixed number of worker tasks drain a bounded overflow queue. Callbacks
//! run inside their own spawned task so panics are caught as join errors and
//! never take down a worker or the scheduler loop. Every run that reaches a
//! worker produces exactly one [`Completion`] on the completions channel,
//! aborted runs included; queued runs removed before starting by
//! displacement or [`WorkerPool::abort_task`] are handed back to the caller
//! as [`DroppedRun`]s instead, so the pool never blocks on the completions
//! channel from the scheduler loop's own call path.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::OverflowPolicy;
use crate::error::SchedulerError;
use crate::task::{TaskFuture, TaskId};

/// Poll interval while waiting for in-flight work to drain.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One firing handed to the pool.
pub(crate) struct WorkItem {
    pub task_id: TaskId,
    pub scheduled_for: DateTime<Utc>,
    pub fut: TaskFuture,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Success,
    Failure(String),
    Panicked(String),
    /// Force-cancelled (hard cancel or drain timeout).
    Aborted,
    /// Accepted but displaced from the overflow queue before starting.
    Dropped,
}

/// Identifier of an accepted run that was removed before it started.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DroppedRun {
    pub task_id: TaskId,
    pub scheduled_for: DateTime<Utc>,
}

/// Completion notification for one accepted submission.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub task_id: TaskId,
    pub scheduled_for: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
}

struct PoolState {
    queue: VecDeque<WorkItem>,
    /// Number of workers currently executing a callback.
    busy: usize,
    accepting: bool,
    inflight: HashMap<u64, (TaskId, tokio::task::AbortHandle)>,
    next_run_id: u64,
}

struct PoolShared {
    state: Mutex<PoolState>,
    notify: Notify,
    slots: usize,
    capacity: usize,
    policy: OverflowPolicy,
    clock: Arc<dyn Clock>,
    completions: mpsc::Sender<Completion>,
}

/// Bounded set of execution slots plus a bounded overflow queue.
pub(crate) struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        slots: usize,
        capacity: usize,
        policy: OverflowPolicy,
        clock: Arc<dyn Clock>,
        completions: mpsc::Sender<Completion>,
    ) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                busy: 0,
                accepting: true,
                inflight: HashMap::new(),
                next_run_id: 0,
            }),
            notify: Notify::new(),
            slots: slots.max(1),
            capacity,
            policy,
            clock,
            completions,
        });

        let workers = (0..shared.slots)
            .map(|_| {
                let shared = Arc::clone(&shared);
                tokio::spawn(worker_loop(shared))
            })
            .collect();

        Self { shared, workers }
    }

    /// Submit one firing. `Ok(Some(_))` reports a previously queued run that
    /// was displaced to make room under [`OverflowPolicy::DropOldest`]; the
    /// caller accounts for it. Fails with [`SchedulerError::PoolExhausted`]
    /// when every slot is busy and the overflow queue is full (or, under
    /// `DropOldest`, when there is nothing queued to displace).
    pub async fn submit(&self, item: WorkItem) -> Result<Option<DroppedRun>, SchedulerError> {
        let displaced = {
            let mut state = self.shared.state.lock().await;
            if !state.accepting {
                return Err(SchedulerError::NotRunning);
            }

            let outstanding = state.busy + state.queue.len();
            if outstanding < self.shared.slots + self.shared.capacity {
                state.queue.push_back(item);
                None
            } else {
                match self.shared.policy {
                    OverflowPolicy::Reject => return Err(SchedulerError::PoolExhausted),
                    OverflowPolicy::DropOldest => match state.queue.pop_front() {
                        Some(old) => {
                            state.queue.push_back(item);
                            let dropped = DroppedRun {
                                task_id: old.task_id,
                                scheduled_for: old.scheduled_for,
                            };
                            debug!(task_id = %dropped.task_id, "displaced oldest queued run");
                            Some(dropped)
                        }
                        // All outstanding work is already running.
                        None => return Err(SchedulerError::PoolExhausted),
                    },
                }
            }
        };

        self.shared.notify.notify_one();
        Ok(displaced)
    }

    /// Abort in-flight runs of a task and drop its queued, not-yet-started
    /// submissions. Returns the dropped queued runs; aborted in-flight runs
    /// report their own completion.
    pub async fn abort_task(&self, task_id: TaskId) -> Vec<DroppedRun> {
        let mut state = self.shared.state.lock().await;
        for (id, handle) in state.inflight.values() {
            if *id == task_id {
                handle.abort();
            }
        }
        let mut dropped = Vec::new();
        state.queue.retain(|item| {
            if item.task_id == task_id {
                dropped.push(DroppedRun {
                    task_id: item.task_id,
                    scheduled_for: item.scheduled_for,
                });
                false
            } else {
                true
            }
        });
        dropped
    }

    /// Stop accepting work, wait up to `drain` for in-flight and queued runs
    /// to finish, then force-cancel the remainder.
    ///
    /// `Err(n)` means `n` runs were force-cancelled after the timeout.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(self, drain: Duration) -> Result<(), usize> {
        {
            let mut state = self.shared.state.lock().await;
            state.accepting = false;
        }
        self.shared.notify.notify_waiters();

        let deadline = tokio::time::Instant::now() + drain;
        loop {
            let remaining = {
                let state = self.shared.state.lock().await;
                state.busy + state.queue.len()
            };
            if remaining == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(remaining, "drain timed out, force-cancelling remaining runs");
                // Abort in-flight runs; the workers observe the join error
                // and report an Aborted completion for each. Queued runs
                // never reach a worker, so their completions are sent here.
                let drained: Vec<(TaskId, DateTime<Utc>)> = {
                    let mut state = self.shared.state.lock().await;
                    for (_, handle) in state.inflight.values() {
                        handle.abort();
                    }
                    state
                        .queue
                        .drain(..)
                        .map(|item| (item.task_id, item.scheduled_for))
                        .collect()
                };
                for (task_id, scheduled_for) in drained {
                    self.send_completion(task_id, scheduled_for, RunOutcome::Aborted)
                        .await;
                }
                for worker in self.workers {
                    let _ = worker.await;
                }
                return Err(remaining);
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        for worker in self.workers {
            let _ = worker.await;
        }
        Ok(())
    }

    async fn send_completion(
        &self,
        task_id: TaskId,
        scheduled_for: DateTime<Utc>,
        outcome: RunOutcome,
    ) {
        let completion = Completion {
            task_id,
            scheduled_for,
            finished_at: self.shared.clock.now(),
            outcome,
        };
        let _ = self.shared.completions.send(completion).await;
    }
}

async fn worker_loop(shared: Arc<PoolShared>) {
    loop {
        // Register as a waiter before checking the queue, so a notification
        // sent between the check and the park is not lost.
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let item = {
            let mut state = shared.state.lock().await;
            match state.queue.pop_front() {
                Some(item) => {
                    state.busy += 1;
                    // Wake a sibling if there is more queued work; notify
                    // permits do not accumulate.
                    if !state.queue.is_empty() {
                        shared.notify.notify_one();
                    }
                    Some(item)
                }
                None if !state.accepting => return,
                None => None,
            }
        };

        match item {
            Some(item) => {
                run_one(&shared, item).await;
                let mut state = shared.state.lock().await;
                state.busy -= 1;
            }
            None => notified.await,
        }
    }
}

/// Execute one callback inside its own spawned task so panics and aborts
/// surface as join errors instead of unwinding through the worker.
async fn run_one(shared: &Arc<PoolShared>, item: WorkItem) {
    let WorkItem {
        task_id,
        scheduled_for,
        fut,
    } = item;

    let join = tokio::spawn(fut);
    let run_id = {
        let mut state = shared.state.lock().await;
        let run_id = state.next_run_id;
        state.next_run_id += 1;
        state.inflight.insert(run_id, (task_id, join.abort_handle()));
        run_id
    };

    let result = join.await;

    {
        let mut state = shared.state.lock().await;
        state.inflight.remove(&run_id);
    }

    let outcome = match result {
        Ok(Ok(())) => RunOutcome::Success,
        Ok(Err(error)) => RunOutcome::Failure(error),
        Err(join_err) if join_err.is_panic() => RunOutcome::Panicked(join_err.to_string()),
        Err(_) => RunOutcome::Aborted,
    };

    let completion = Completion {
        task_id,
        scheduled_for,
        finished_at: shared.clock.now(),
        outcome,
    };
    let _ = shared.completions.send(completion).await;
}
