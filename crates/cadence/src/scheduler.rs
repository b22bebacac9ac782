//! Scheduler core: the engine loop, task registry, and lifecycle.
//!
//! One loop task owns the fire-time queue and all task mutation
//! (single-writer). Registration, cancellation, and listing from other tasks
//! go through a command channel and are acknowledged over oneshot replies, so
//! the ordered queue is never raced. The loop blocks only while waiting for
//! the earliest fire time or for a command/completion.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::events::{EventSink, SchedulerEvent, TracingSink};
use crate::pool::{Completion, DroppedRun, RunOutcome, WorkItem, WorkerPool};
use crate::task::{DispatchMode, OverlapPolicy, Task, TaskCallback, TaskId, TaskOptions, TaskSnapshot, TaskState};
use crate::trigger::Trigger;

/// Upper bound on how long the loop sleeps between wake-ups.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Capacity of the command channel feeding the loop.
const COMMAND_QUEUE_SIZE: usize = 32;

/// Capacity of the completions channel from the worker pool.
const COMPLETION_QUEUE_SIZE: usize = 64;

/// One pending firing. Ordered by fire time, ties broken by registration
/// sequence (FIFO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    fire_at: DateTime<Utc>,
    seq: u64,
    task_id: TaskId,
}

enum Command {
    Register {
        name: String,
        spec: String,
        callback: TaskCallback,
        options: TaskOptions,
        reply: oneshot::Sender<Result<TaskId, SchedulerError>>,
    },
    Unregister {
        id: TaskId,
        hard: bool,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    List {
        reply: oneshot::Sender<Vec<TaskSnapshot>>,
    },
    Stop {
        drain: Duration,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
}

/// Buffered definition collected before the engine starts.
struct PendingDef {
    name: String,
    trigger: Trigger,
    callback: TaskCallback,
    options: TaskOptions,
}

/// The scheduler, before `start`.
///
/// Tasks registered here are validated immediately (trigger spec parse,
/// cron satisfiability) and queued when the engine starts. More tasks can be
/// registered through the [`SchedulerHandle`] while the engine runs.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    defs: Vec<PendingDef>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
            defs: Vec::new(),
        }
    }

    /// Substitute the time source (tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Substitute the observability sink.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register a task before the engine starts.
    ///
    /// The trigger spec is parsed and validated now; an unsatisfiable cron
    /// expression fails here, not later. The first fire time is computed
    /// when the engine starts.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        trigger_spec: &str,
        callback: TaskCallback,
        options: TaskOptions,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        if self.defs.iter().any(|d| d.name == name) {
            return Err(SchedulerError::TaskExists(name));
        }
        let trigger = Trigger::parse(trigger_spec)?;
        // Surfaces UnsatisfiableSchedule at registration.
        trigger.initial_fire_time(self.clock.now())?;
        self.defs.push(PendingDef {
            name,
            trigger,
            callback,
            options,
        });
        Ok(())
    }

    /// Start the engine loop and worker pool.
    pub fn start(self) -> SchedulerHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (completions_tx, completions_rx) = mpsc::channel(COMPLETION_QUEUE_SIZE);

        let pool = WorkerPool::new(
            self.config.worker_slots,
            self.config.queue_capacity,
            self.config.overflow,
            Arc::clone(&self.clock),
            completions_tx,
        );

        let mut core = Core {
            config: self.config,
            clock: self.clock,
            sink: self.sink,
            tasks: HashMap::new(),
            queue: BinaryHeap::new(),
            pool: Some(pool),
            commands_rx,
            completions_rx,
            next_id: 0,
            stopping: false,
        };

        let now = core.clock.now();
        for def in self.defs {
            // Validated at registration; a cron expression can only have
            // become unsatisfiable if the horizon passed in between.
            if let Err(e) = core.admit_task(def.name.clone(), def.trigger, def.callback, def.options, now) {
                warn!(name = %def.name, error = %e, "dropping task at start");
            }
        }

        let join = tokio::spawn(core.run());
        SchedulerHandle {
            commands: commands_tx,
            join,
        }
    }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Register a task while the engine runs. The task is scheduled before
    /// the reply returns.
    pub async fn register(
        &self,
        name: impl Into<String>,
        trigger_spec: &str,
        callback: TaskCallback,
        options: TaskOptions,
    ) -> Result<TaskId, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Register {
            name: name.into(),
            spec: trigger_spec.to_string(),
            callback,
            options,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SchedulerError::NotRunning)?
    }

    /// Cancel a task. Pending firings are dropped before the next dispatch;
    /// an in-flight execution finishes but its result is discarded.
    pub async fn unregister(&self, id: TaskId) -> Result<(), SchedulerError> {
        self.cancel(id, false).await
    }

    /// Cancel a task and abort its in-flight executions.
    pub async fn hard_cancel(&self, id: TaskId) -> Result<(), SchedulerError> {
        self.cancel(id, true).await
    }

    /// Snapshot all registered tasks.
    pub async fn list(&self) -> Result<Vec<TaskSnapshot>, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::List { reply }).await?;
        rx.await.map_err(|_| SchedulerError::NotRunning)
    }

    /// Stop the engine: no further firings dispatch, in-flight work is
    /// drained for up to `drain`, then force-cancelled.
    ///
    /// [`SchedulerError::ShutdownTimeout`] is a warning, not a failure: the
    /// scheduler has still stopped when it is returned.
    pub async fn stop(self, drain: Duration) -> Result<(), SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { drain, reply }).await?;
        let result = rx.await.map_err(|_| SchedulerError::NotRunning)?;
        let _ = self.join.await;
        result
    }

    async fn cancel(&self, id: TaskId, hard: bool) -> Result<(), SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unregister { id, hard, reply }).await?;
        rx.await.map_err(|_| SchedulerError::NotRunning)?
    }

    async fn send(&self, command: Command) -> Result<(), SchedulerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SchedulerError::NotRunning)
    }
}

/// Loop-owned state. Nothing here is shared; all mutation happens on the
/// loop task.
struct Core {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    tasks: HashMap<TaskId, Task>,
    queue: BinaryHeap<Reverse<QueueEntry>>,
    pool: Option<WorkerPool>,
    commands_rx: mpsc::Receiver<Command>,
    completions_rx: mpsc::Receiver<Completion>,
    next_id: u64,
    stopping: bool,
}

impl Core {
    async fn run(mut self) {
        info!(tasks = self.tasks.len(), "scheduler started");

        let (drain, reply) = loop {
            self.dispatch_due().await;
            let sleep_for = self.sleep_duration();

            tokio::select! {
                command = self.commands_rx.recv() => match command {
                    Some(Command::Stop { drain, reply }) => break (drain, Some(reply)),
                    Some(command) => self.handle_command(command).await,
                    // All handles dropped: stop with the configured drain.
                    None => break (self.config.drain_timeout, None),
                },
                completion = self.completions_rx.recv() => {
                    if let Some(completion) = completion {
                        self.handle_completion(completion);
                    }
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        };

        let result = self.drain(drain).await;
        if let Some(reply) = reply {
            let _ = reply.send(result);
        } else if let Err(e) = result {
            warn!(error = %e, "drain after handle drop");
        }
        info!("scheduler stopped");
    }

    /// Pop and dispatch every entry whose fire time has arrived.
    async fn dispatch_due(&mut self) {
        loop {
            let now = self.clock.now();
            match self.queue.peek() {
                Some(Reverse(entry)) if entry.fire_at <= now => {}
                _ => return,
            }
            let Some(Reverse(entry)) = self.queue.pop() else {
                return;
            };

            let Some(task) = self.tasks.get_mut(&entry.task_id) else {
                // Stale entry for an unregistered task.
                continue;
            };
            if task.state == TaskState::Cancelled {
                continue;
            }

            if task.running > 0 && task.options.overlap == OverlapPolicy::SkipAndReschedule {
                task.pending_catchup = true;
                let event = SchedulerEvent::TaskSkippedOverlap {
                    id: task.id,
                    name: task.name.clone(),
                    fire_at: entry.fire_at,
                };
                self.sink.emit(&event);
                continue;
            }

            self.dispatch(entry).await;
        }
    }

    async fn dispatch(&mut self, entry: QueueEntry) {
        let now = self.clock.now();

        let Some(task) = self.tasks.get(&entry.task_id) else {
            return;
        };
        let name = task.name.clone();
        let callback = Arc::clone(&task.callback);
        let mode = task.options.dispatch;
        // Fixed-rate is anchored to the scheduled start, so its successor is
        // queued at dispatch and may overlap the run. Fixed-delay and cron
        // queue their successor on completion.
        let fixed_rate_next = match &task.trigger {
            Trigger::FixedRate(_) => task.trigger.next_fire_time(entry.fire_at, now, now).ok(),
            _ => None,
        };

        if mode == DispatchMode::Pool {
            let item = WorkItem {
                task_id: entry.task_id,
                scheduled_for: entry.fire_at,
                fut: callback(),
            };
            let submitted = match &self.pool {
                Some(pool) => pool.submit(item).await,
                None => Err(SchedulerError::NotRunning),
            };
            match submitted {
                Err(e) => {
                    debug!(id = %entry.task_id, error = %e, "submission rejected");
                    self.sink.emit(&SchedulerEvent::PoolSaturated {
                        id: entry.task_id,
                        name: name.clone(),
                    });
                    // The firing never started, so there is no run state to
                    // unwind; just queue the next fire.
                    match fixed_rate_next {
                        Some(next) => self.push_entry(entry.task_id, entry.seq, &name, next),
                        None => self.reschedule_rejected(entry, now),
                    }
                    return;
                }
                Ok(Some(dropped)) => self.queued_run_displaced(dropped, now),
                Ok(None) => {}
            }
        }

        let Some(task) = self.tasks.get_mut(&entry.task_id) else {
            return;
        };
        task.state = TaskState::Running;
        task.running += 1;
        task.runs_started += 1;
        task.last_scheduled_start = Some(entry.fire_at);

        self.sink.emit(&SchedulerEvent::TaskStarted {
            id: entry.task_id,
            name: name.clone(),
            scheduled_for: entry.fire_at,
        });
        debug!(id = %entry.task_id, name = %name, scheduled_for = %entry.fire_at, "dispatching");

        if let Some(next) = fixed_rate_next {
            self.push_entry(entry.task_id, entry.seq, &name, next);
        }

        if mode == DispatchMode::Inline {
            // Documented hazard: this blocks the scheduler loop until the
            // callback returns.
            let outcome = match callback().await {
                Ok(()) => RunOutcome::Success,
                Err(error) => RunOutcome::Failure(error),
            };
            let finished_at = self.clock.now();
            self.finish_run(entry.task_id, entry.fire_at, finished_at, outcome);
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        self.finish_run(
            completion.task_id,
            completion.scheduled_for,
            completion.finished_at,
            completion.outcome,
        );
    }

    /// Record the end of one run and queue the task's next firing.
    fn finish_run(
        &mut self,
        task_id: TaskId,
        scheduled_for: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        outcome: RunOutcome,
    ) {
        let Some(task) = self.tasks.get_mut(&task_id) else {
            // Unregistered while in flight; result discarded.
            return;
        };
        task.running = task.running.saturating_sub(1);

        if task.state == TaskState::Cancelled {
            if task.running == 0 {
                self.tasks.remove(&task_id);
            }
            return;
        }

        let name = task.name.clone();
        match &outcome {
            RunOutcome::Success => {
                task.last_completion = Some(finished_at);
                self.sink.emit(&SchedulerEvent::TaskCompleted {
                    id: task_id,
                    name: name.clone(),
                    finished_at,
                });
            }
            RunOutcome::Failure(error) | RunOutcome::Panicked(error) => {
                task.failures += 1;
                task.last_completion = Some(finished_at);
                self.sink.emit(&SchedulerEvent::TaskFailed {
                    id: task_id,
                    name: name.clone(),
                    error: error.clone(),
                });
            }
            // PoolSaturated was already emitted at submission.
            RunOutcome::Dropped => {
                task.last_completion = Some(finished_at);
            }
            RunOutcome::Aborted => return,
        }

        if self.stopping {
            return;
        }

        let now = self.clock.now();
        let task = match self.tasks.get_mut(&task_id) {
            Some(task) => task,
            None => return,
        };
        match &task.trigger {
            Trigger::FixedRate(_) => {
                // The successor entry was queued at dispatch; a skipped
                // firing catches up with a single immediate fire.
                if task.pending_catchup {
                    task.pending_catchup = false;
                    let seq = task.seq;
                    self.push_entry(task_id, seq, &name, now);
                } else if task.running == 0 {
                    task.state = TaskState::Scheduled;
                }
            }
            Trigger::FixedDelay(_) | Trigger::Cron(_) => {
                match task.trigger.next_fire_time(scheduled_for, finished_at, now) {
                    Ok(next) => {
                        let seq = task.seq;
                        self.push_entry(task_id, seq, &name, next);
                    }
                    // A cron schedule exhausted its horizon at runtime.
                    Err(e) => self.cancel_exhausted(task_id, name, e.to_string()),
                }
            }
        }
    }

    /// Queue the next fire for a firing the pool rejected before it started.
    /// Fixed-rate successors are queued at dispatch and never reach here.
    fn reschedule_rejected(&mut self, entry: QueueEntry, now: DateTime<Utc>) {
        let Some(task) = self.tasks.get_mut(&entry.task_id) else {
            return;
        };
        let name = task.name.clone();
        match task.trigger.next_fire_time(entry.fire_at, now, now) {
            Ok(next) => self.push_entry(entry.task_id, entry.seq, &name, next),
            Err(e) => self.cancel_exhausted(entry.task_id, name, e.to_string()),
        }
    }

    /// A queued run was displaced under `DropOldest`. It was accounted as
    /// started when accepted, so it closes out like any other run.
    fn queued_run_displaced(&mut self, dropped: DroppedRun, now: DateTime<Utc>) {
        if let Some(task) = self.tasks.get(&dropped.task_id) {
            self.sink.emit(&SchedulerEvent::PoolSaturated {
                id: dropped.task_id,
                name: task.name.clone(),
            });
        }
        self.finish_run(dropped.task_id, dropped.scheduled_for, now, RunOutcome::Dropped);
    }

    fn cancel_exhausted(&mut self, task_id: TaskId, name: String, error: String) {
        self.sink.emit(&SchedulerEvent::TaskFailed {
            id: task_id,
            name: name.clone(),
            error,
        });
        self.sink.emit(&SchedulerEvent::TaskCancelled { id: task_id, name });
        self.tasks.remove(&task_id);
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register {
                name,
                spec,
                callback,
                options,
                reply,
            } => {
                let result = self.register_task(name, &spec, callback, options);
                let _ = reply.send(result);
            }
            Command::Unregister { id, hard, reply } => {
                let result = self.unregister_task(id, hard).await;
                let _ = reply.send(result);
            }
            Command::List { reply } => {
                let mut snapshots: Vec<TaskSnapshot> =
                    self.tasks.values().map(Task::snapshot).collect();
                snapshots.sort_by_key(|s| s.id);
                let _ = reply.send(snapshots);
            }
            // Handled by the loop.
            Command::Stop { .. } => {}
        }
    }

    #[tracing::instrument(skip(self, callback, options))]
    fn register_task(
        &mut self,
        name: String,
        spec: &str,
        callback: TaskCallback,
        options: TaskOptions,
    ) -> Result<TaskId, SchedulerError> {
        if self
            .tasks
            .values()
            .any(|t| t.name == name && t.state != TaskState::Cancelled)
        {
            return Err(SchedulerError::TaskExists(name));
        }
        let trigger = Trigger::parse(spec)?;
        self.admit_task(name, trigger, callback, options, self.clock.now())
    }

    /// Insert a task and queue its first firing.
    fn admit_task(
        &mut self,
        name: String,
        trigger: Trigger,
        callback: TaskCallback,
        options: TaskOptions,
        now: DateTime<Utc>,
    ) -> Result<TaskId, SchedulerError> {
        let first_fire = trigger.initial_fire_time(now)?;
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let task = Task {
            id,
            name: name.clone(),
            trigger,
            callback,
            options,
            state: TaskState::Scheduled,
            seq: id.0,
            running: 0,
            pending_catchup: false,
            last_scheduled_start: None,
            last_completion: None,
            runs_started: 0,
            failures: 0,
        };
        self.tasks.insert(id, task);
        self.push_entry(id, id.0, &name, first_fire);
        Ok(id)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    async fn unregister_task(&mut self, id: TaskId, hard: bool) -> Result<(), SchedulerError> {
        let Some(task) = self.tasks.get_mut(&id) else {
            return Err(SchedulerError::TaskNotFound(id));
        };
        if task.state == TaskState::Cancelled {
            return Err(SchedulerError::TaskNotFound(id));
        }
        task.state = TaskState::Cancelled;
        let name = task.name.clone();
        let running = task.running;
        // Pending queue entries are dropped lazily when popped.
        if running == 0 {
            self.tasks.remove(&id);
        }
        self.sink.emit(&SchedulerEvent::TaskCancelled { id, name });

        if hard {
            let dropped = match &self.pool {
                Some(pool) => pool.abort_task(id).await,
                None => Vec::new(),
            };
            // Aborted in-flight runs report their own completion; queued
            // runs never will, so they are closed out here.
            let now = self.clock.now();
            for run in dropped {
                self.finish_run(run.task_id, run.scheduled_for, now, RunOutcome::Aborted);
            }
        }
        Ok(())
    }

    fn push_entry(&mut self, task_id: TaskId, seq: u64, name: &str, fire_at: DateTime<Utc>) {
        self.queue.push(Reverse(QueueEntry {
            fire_at,
            seq,
            task_id,
        }));
        if let Some(task) = self.tasks.get_mut(&task_id)
            && task.running == 0
        {
            task.state = TaskState::Scheduled;
        }
        self.sink.emit(&SchedulerEvent::TaskScheduled {
            id: task_id,
            name: name.to_string(),
            fire_at,
        });
    }

    /// How long to sleep until the earliest pending fire time.
    fn sleep_duration(&self) -> Duration {
        let Some(Reverse(entry)) = self.queue.peek() else {
            return MAX_SLEEP;
        };
        let now = self.clock.now();
        (entry.fire_at - now).to_std().unwrap_or(Duration::ZERO).min(MAX_SLEEP)
    }

    /// Shut down the worker pool, consuming completions while it drains so
    /// workers are never blocked on a full channel.
    async fn drain(&mut self, drain: Duration) -> Result<(), SchedulerError> {
        self.stopping = true;
        let Some(pool) = self.pool.take() else {
            return Ok(());
        };

        let shutdown = pool.shutdown(drain);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = &mut shutdown => {
                    return match result {
                        Ok(()) => Ok(()),
                        Err(remaining) => {
                            self.sink.emit(&SchedulerEvent::ShutdownTimedOut { remaining });
                            Err(SchedulerError::ShutdownTimeout {
                                timeout: drain,
                                remaining,
                            })
                        }
                    };
                }
                completion = self.completions_rx.recv() => {
                    if let Some(completion) = completion {
                        self.handle_completion(completion);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::RecordingSink;
    use chrono::TimeZone;

    fn noop() -> TaskCallback {
        Arc::new(|| Box::pin(async { Ok(()) }))
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn queue_entries_order_by_fire_time_then_seq() {
        let early = QueueEntry {
            fire_at: fixed_now(),
            seq: 5,
            task_id: TaskId(5),
        };
        let tie_first = QueueEntry {
            fire_at: fixed_now() + chrono::Duration::seconds(1),
            seq: 0,
            task_id: TaskId(0),
        };
        let tie_second = QueueEntry {
            fire_at: fixed_now() + chrono::Duration::seconds(1),
            seq: 1,
            task_id: TaskId(1),
        };

        let mut heap = BinaryHeap::new();
        for entry in [tie_second, early, tie_first] {
            heap.push(Reverse(entry));
        }
        assert_eq!(heap.pop(), Some(Reverse(early)));
        assert_eq!(heap.pop(), Some(Reverse(tie_first)));
        assert_eq!(heap.pop(), Some(Reverse(tie_second)));
    }

    #[test]
    fn pre_start_registration_validates_spec() {
        let clock = Arc::new(ManualClock::new(fixed_now()));
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).with_clock(clock);

        let err = scheduler
            .register("bad", "every:5000", noop(), TaskOptions::default())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Parse(_)));

        let err = scheduler
            .register("never", "cron:0 0 0 30 2 *", noop(), TaskOptions::default())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnsatisfiableSchedule(_)));
    }

    #[test]
    fn pre_start_registration_rejects_duplicate_names() {
        let clock = Arc::new(ManualClock::new(fixed_now()));
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).with_clock(clock);

        scheduler
            .register("tick", "fixedRate:1000", noop(), TaskOptions::default())
            .unwrap();
        let err = scheduler
            .register("tick", "fixedRate:2000", noop(), TaskOptions::default())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TaskExists(name) if name == "tick"));
    }

    #[tokio::test]
    async fn stopped_scheduler_reports_not_running() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let handle = scheduler.start();
        let second = SchedulerHandle {
            commands: handle.commands.clone(),
            join: tokio::spawn(async {}),
        };
        handle.stop(Duration::from_secs(1)).await.unwrap();

        let err = second.list().await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotRunning));
    }

    #[tokio::test]
    async fn registry_list_and_unregister_round_trip() {
        let sink = Arc::new(RecordingSink::new());
        let scheduler =
            Scheduler::new(SchedulerConfig::default()).with_event_sink(sink.clone());
        let handle = scheduler.start();

        let id = handle
            .register("daily", "cron:0 0 12 * * *", noop(), TaskOptions::default())
            .await
            .unwrap();
        let tasks = handle.list().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, id);
        assert_eq!(tasks[0].trigger, "cron:0 0 12 * * *");
        assert_eq!(tasks[0].state, TaskState::Scheduled);

        handle.unregister(id).await.unwrap();
        assert!(handle.list().await.unwrap().is_empty());

        let err = handle.unregister(id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::TaskNotFound(_)));

        // Same name again is a fresh, independent task.
        let id2 = handle
            .register("daily", "cron:0 0 12 * * *", noop(), TaskOptions::default())
            .await
            .unwrap();
        assert_ne!(id, id2);

        handle.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_active_name_rejected_while_running() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let handle = scheduler.start();

        handle
            .register("tick", "fixedDelay:60000", noop(), TaskOptions::default())
            .await
            .unwrap();
        let err = handle
            .register("tick", "fixedDelay:60000", noop(), TaskOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TaskExists(_)));

        handle.stop(Duration::from_secs(1)).await.unwrap();
    }
}
