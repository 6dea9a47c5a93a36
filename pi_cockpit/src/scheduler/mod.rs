//! Recurring background task runner.
//!
//! A [`Scheduler`] is either stopped or running a timer. Each timer tick:
//! 1. asks the task whether it is still enabled, and stops the timer if not
//! 2. skips the tick if the previous run has not returned yet
//! 3. runs the task, logging any failure without stopping the timer
//!
//! The first tick fires immediately on [`Scheduler::start`]. Stopping cancels
//! future ticks, including ones already spawned that have not started their
//! run; a run already in flight completes.

pub mod errors;

pub use errors::{TaskError, TaskResult};

use async_trait::async_trait;
use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

/// Work driven by a [`Scheduler`]
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Re-read on every tick; returning `false` stops the scheduler
    async fn is_enabled(&self) -> bool {
        true
    }

    /// Execute one run
    async fn run(&self) -> TaskResult<()>;
}

/// What happened on a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    Failed,
    /// Previous run still in progress
    Skipped,
    /// Task reported itself disabled; the timer was stopped
    Stopped,
    /// The timer that issued the tick was stopped or replaced
    Cancelled,
}

struct TimerHandle {
    handle: JoinHandle<()>,
    interval: Duration,
    generation: u64,
}

struct Inner {
    name: String,
    timer: Mutex<Option<TimerHandle>>,
    generation: AtomicU64,
    in_progress: AtomicBool,
    skipped: AtomicU64,
}

/// Held while a run is in progress; clears the flag on drop
pub struct TickGuard {
    inner: Arc<Inner>,
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.inner.in_progress.store(false, Ordering::Release);
    }
}

/// Interval scheduler with an overlap guard
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                timer: Mutex::new(None),
                generation: AtomicU64::new(0),
                in_progress: AtomicBool::new(false),
                skipped: AtomicU64::new(0),
            }),
        }
    }

    /// Start (or restart) the timer
    ///
    /// Any existing timer is replaced, so this also changes the interval of a
    /// running scheduler. The task runs once immediately, then every `interval`.
    ///
    /// # Arguments
    ///
    /// * `task` - Work to run on each tick
    /// * `interval` - Time between ticks; zero is raised to one second
    pub fn start(&self, task: Arc<dyn ScheduledTask>, interval: Duration) {
        let interval = if interval.is_zero() {
            log::warn!(
                "{} scheduler: zero interval requested, using 1s",
                self.inner.name
            );
            Duration::from_secs(1)
        } else {
            interval
        };

        let mut timer = self.lock_timer();
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let handle = tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            task,
            interval,
            generation,
        ));

        if let Some(previous) = timer.replace(TimerHandle {
            handle,
            interval,
            generation,
        }) {
            previous.handle.abort();
            log::info!(
                "{} scheduler rescheduled: every {:?} (was {:?})",
                self.inner.name,
                interval,
                previous.interval
            );
        } else {
            log::info!(
                "{} scheduler started: every {:?}",
                self.inner.name,
                interval
            );
        }
    }

    /// Stop the timer. Stopping a stopped scheduler is a no-op.
    pub fn stop(&self) {
        let mut timer = self.lock_timer();
        if let Some(previous) = timer.take() {
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
            previous.handle.abort();
            log::info!("{} scheduler stopped", self.inner.name);
        }
    }

    /// Stop only if the running timer is the one that issued the tick
    fn stop_generation(&self, generation: u64) {
        let mut timer = self.lock_timer();
        if timer.as_ref().is_some_and(|t| t.generation == generation) {
            if let Some(previous) = timer.take() {
                self.inner.generation.fetch_add(1, Ordering::AcqRel);
                previous.handle.abort();
            }
            log::info!("{} scheduler stopped (disabled)", self.inner.name);
        }
    }

    /// Whether ticks issued under `generation` may still run
    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::Acquire) == generation
    }

    pub fn is_running(&self) -> bool {
        self.lock_timer().is_some()
    }

    /// Interval of the running timer, if any
    pub fn interval(&self) -> Option<Duration> {
        self.lock_timer().as_ref().map(|t| t.interval)
    }

    /// Whether a run is executing right now
    pub fn is_tick_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::Acquire)
    }

    /// Ticks skipped because the previous run was still going
    pub fn skipped_ticks(&self) -> u64 {
        self.inner.skipped.load(Ordering::Relaxed)
    }

    /// Claim the in-progress flag for a run outside the timer
    ///
    /// # Returns
    ///
    /// * `Option<TickGuard>` - `None` if a run is already in progress
    pub fn try_begin(&self) -> Option<TickGuard> {
        self.inner
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard {
                inner: self.inner.clone(),
            })
    }

    /// Run one tick against the current timer
    pub async fn tick(&self, task: &dyn ScheduledTask) -> TickOutcome {
        let generation = self.inner.generation.load(Ordering::Acquire);
        self.tick_for(task, generation).await
    }

    async fn tick_for(&self, task: &dyn ScheduledTask, generation: u64) -> TickOutcome {
        if !self.is_current(generation) {
            return TickOutcome::Cancelled;
        }
        if !task.is_enabled().await {
            log::info!("{} disabled, stopping scheduler", task.name());
            self.stop_generation(generation);
            return TickOutcome::Stopped;
        }

        let Some(_guard) = self.try_begin() else {
            self.inner.skipped.fetch_add(1, Ordering::Relaxed);
            log::warn!("{} still running, skipping this tick", task.name());
            return TickOutcome::Skipped;
        };
        // is_enabled may have yielded long enough for a stop or restart.
        if !self.is_current(generation) {
            log::debug!("{} tick cancelled by stop", task.name());
            return TickOutcome::Cancelled;
        }

        match task.run().await {
            Ok(()) => {
                log::debug!("{} completed", task.name());
                TickOutcome::Completed
            }
            Err(e) => {
                log::error!("{} failed: {}", task.name(), e);
                TickOutcome::Failed
            }
        }
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<TimerHandle>> {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_timer(
    inner: Weak<Inner>,
    task: Arc<dyn ScheduledTask>,
    period: Duration,
    generation: u64,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let scheduler = Scheduler { inner };
        let task = task.clone();

        // Runs are spawned so a slow run does not hold up the ticker.
        tokio::spawn(async move {
            scheduler.tick_for(task.as_ref(), generation).await;
        });
    }
}
