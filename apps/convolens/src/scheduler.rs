// ============================================================================
// CONCURRENCY-LIMITED SCHEDULER
// ============================================================================
// Runs submitted futures under two limits derived from a requests-per-minute
// budget: a cap on tasks in flight and a minimum spacing between dispatches.
//
// All bookkeeping lives in one dispatch loop task. It wakes on:
// - a submission or cancel command
// - a dispatched task completing
// - a timer armed for the instant the spacing interval clears
//
// `cancel_all` drops every pending task and starts a new generation. Tasks
// already dispatched run to completion, but their completions belong to the
// old generation and no longer touch the counters.
// ============================================================================

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};

use crate::config::SchedulerConfig;
use crate::constants::MAX_CONCURRENT_REQUESTS;
use crate::error::{ConfigError, ConvoError, ConvoResult, SchedulerError, SchedulerResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// ----------------------------------------------------------------------------
// Limits
// ----------------------------------------------------------------------------

/// Effective dispatch limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerLimits {
    pub max_in_flight: usize,
    pub min_interval: Duration,
}

impl SchedulerLimits {
    /// interval = 60s / rpm; cap = clamp(ceil(rpm / 60), 1, 50), optionally
    /// lowered by `max_concurrency`.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, ConfigError> {
        let rpm = config.requests_per_minute;
        if rpm == 0 {
            return Err(ConfigError::invalid_value(
                "scheduler.requests_per_minute",
                "must be greater than zero",
            ));
        }

        let derived = (rpm as usize).div_ceil(60).clamp(1, MAX_CONCURRENT_REQUESTS);
        let max_in_flight = match config.max_concurrency {
            Some(0) => {
                return Err(ConfigError::invalid_value(
                    "scheduler.max_concurrency",
                    "must be greater than zero",
                ))
            }
            Some(limit) => derived.min(limit),
            None => derived,
        };

        Ok(Self {
            max_in_flight,
            min_interval: Duration::from_micros(60_000_000 / rpm as u64),
        })
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Snapshot published by the dispatch loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub pending: usize,
    pub in_flight: usize,
    pub generation: u64,
}

// ----------------------------------------------------------------------------
// Task Handle
// ----------------------------------------------------------------------------

/// Resolves to the task's output, or to the reason it never produced one.
pub struct TaskHandle<T> {
    rx: Option<oneshot::Receiver<SchedulerResult<T>>>,
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("attached", &self.rx.is_some())
            .finish()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = SchedulerResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            // A dropped sender means the pending task was discarded.
            Some(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(SchedulerError::Cancelled))),
            None => Poll::Ready(Err(SchedulerError::Closed)),
        }
    }
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

enum Command {
    Submit(Job),
    CancelAll,
}

/// Cheap to clone; every clone feeds the same dispatch loop.
#[derive(Clone)]
pub struct Scheduler {
    commands: mpsc::UnboundedSender<Command>,
    stats: watch::Receiver<SchedulerStats>,
    limits: SchedulerLimits,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("limits", &self.limits)
            .field("stats", &*self.stats.borrow())
            .finish()
    }
}

impl Scheduler {
    /// Start a scheduler. Must be called inside a Tokio runtime.
    pub fn new(config: &SchedulerConfig) -> ConvoResult<Self> {
        let limits = SchedulerLimits::from_config(config)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConvoError::Internal(format!("Scheduler needs a Tokio runtime: {}", e)))?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (completions, completion_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats) = watch::channel(SchedulerStats::default());

        let dispatch = DispatchLoop {
            limits,
            pending: VecDeque::new(),
            in_flight: 0,
            last_dispatch: None,
            generation: 0,
            completions,
            stats: stats_tx,
        };
        runtime.spawn(dispatch.run(command_rx, completion_rx));

        info!(
            target: "convolens::scheduler",
            rpm = config.requests_per_minute,
            max_in_flight = limits.max_in_flight,
            min_interval_ms = limits.min_interval.as_millis() as u64,
            "Scheduler started"
        );

        Ok(Self {
            commands,
            stats,
            limits,
        })
    }

    pub fn limits(&self) -> SchedulerLimits {
        self.limits
    }

    /// Queue a future for dispatch. The returned handle resolves once the
    /// future has run, or with `Cancelled` if it is dropped before dispatch.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|panic| SchedulerError::TaskPanicked {
                    message: panic_message(panic.as_ref()),
                });
            let _ = tx.send(outcome);
        });

        match self.commands.send(Command::Submit(job)) {
            Ok(()) => TaskHandle { rx: Some(rx) },
            Err(_) => TaskHandle { rx: None },
        }
    }

    /// Drop every pending task and reset in-flight and spacing bookkeeping.
    pub fn cancel_all(&self) {
        let _ = self.commands.send(Command::CancelAll);
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.stats.borrow()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ----------------------------------------------------------------------------
// Dispatch Loop
// ----------------------------------------------------------------------------

struct DispatchLoop {
    limits: SchedulerLimits,
    pending: VecDeque<Job>,
    in_flight: usize,
    last_dispatch: Option<Instant>,
    generation: u64,
    completions: mpsc::UnboundedSender<u64>,
    stats: watch::Sender<SchedulerStats>,
}

impl DispatchLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<u64>,
    ) {
        let mut accepting = true;

        loop {
            self.dispatch_ready();

            // Every handle is gone and nothing is queued: in-flight tasks
            // finish on their own.
            if !accepting && self.pending.is_empty() {
                break;
            }

            let deadline = self.next_deadline();
            tokio::select! {
                command = commands.recv(), if accepting => match command {
                    Some(Command::Submit(job)) => {
                        self.pending.push_back(job);
                        self.stats.send_modify(|s| s.submitted += 1);
                    }
                    Some(Command::CancelAll) => self.cancel_all(),
                    None => accepting = false,
                },
                Some(generation) = completions.recv() => self.complete(generation),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
            }
            self.publish();
        }

        debug!(target: "convolens::scheduler", "Dispatch loop stopped");
    }

    /// Dispatch as many pending tasks as both limits allow right now.
    fn dispatch_ready(&mut self) {
        while !self.pending.is_empty() && self.in_flight < self.limits.max_in_flight {
            let now = Instant::now();
            if let Some(last) = self.last_dispatch {
                if now.duration_since(last) < self.limits.min_interval {
                    break;
                }
            }
            let Some(job) = self.pending.pop_front() else {
                break;
            };

            self.in_flight += 1;
            self.last_dispatch = Some(now);
            let generation = self.generation;
            let completions = self.completions.clone();
            tokio::spawn(async move {
                job.await;
                let _ = completions.send(generation);
            });

            self.stats.send_modify(|s| s.dispatched += 1);
            trace!(
                target: "convolens::scheduler",
                in_flight = self.in_flight,
                pending = self.pending.len(),
                "Task dispatched"
            );
        }
        self.publish();
    }

    /// When the spacing interval clears, if that is what blocks dispatch
    fn next_deadline(&self) -> Option<Instant> {
        if self.pending.is_empty() || self.in_flight >= self.limits.max_in_flight {
            return None;
        }
        self.last_dispatch.map(|last| last + self.limits.min_interval)
    }

    fn complete(&mut self, generation: u64) {
        self.stats.send_modify(|s| s.completed += 1);
        if generation == self.generation {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
    }

    fn cancel_all(&mut self) {
        let dropped = self.pending.len();
        self.pending.clear();
        self.in_flight = 0;
        self.last_dispatch = None;
        self.generation += 1;
        self.stats.send_modify(|s| s.cancelled += dropped as u64);

        info!(
            target: "convolens::scheduler",
            dropped,
            generation = self.generation,
            "Pending tasks cancelled"
        );
    }

    fn publish(&self) {
        let (pending, in_flight, generation) = (self.pending.len(), self.in_flight, self.generation);
        self.stats.send_if_modified(|s| {
            let changed =
                s.pending != pending || s.in_flight != in_flight || s.generation != generation;
            s.pending = pending;
            s.in_flight = in_flight;
            s.generation = generation;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::sleep;

    fn config(rpm: u32, max_concurrency: Option<usize>) -> SchedulerConfig {
        SchedulerConfig {
            requests_per_minute: rpm,
            max_concurrency,
        }
    }

    #[test]
    fn test_limits_derivation() {
        let limits = SchedulerLimits::from_config(&config(60, None)).unwrap();
        assert_eq!(limits.max_in_flight, 1);
        assert_eq!(limits.min_interval, Duration::from_secs(1));

        let limits = SchedulerLimits::from_config(&config(600, None)).unwrap();
        assert_eq!(limits.max_in_flight, 10);
        assert_eq!(limits.min_interval, Duration::from_millis(100));

        let limits = SchedulerLimits::from_config(&config(61, None)).unwrap();
        assert_eq!(limits.max_in_flight, 2);

        let limits = SchedulerLimits::from_config(&config(100_000, None)).unwrap();
        assert_eq!(limits.max_in_flight, MAX_CONCURRENT_REQUESTS);

        let limits = SchedulerLimits::from_config(&config(600, Some(3))).unwrap();
        assert_eq!(limits.max_in_flight, 3);

        assert!(SchedulerLimits::from_config(&config(0, None)).is_err());
        assert!(SchedulerLimits::from_config(&config(60, Some(0))).is_err());
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let err = Scheduler::new(&config(60, None)).unwrap_err();
        assert_eq!(err.category(), "internal");
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_never_exceeds_cap() {
        let scheduler = Scheduler::new(&config(6000, Some(2))).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                scheduler.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_secs(1)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    i
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        assert_eq!(
            results.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
            (0..8).collect::<Vec<_>>()
        );
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.stats().dispatched, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatches_respect_min_interval() {
        let scheduler = Scheduler::new(&config(120, None)).unwrap();
        let starts = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let starts = starts.clone();
                scheduler.submit(async move {
                    starts.lock().unwrap().push(Instant::now());
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 5);
        for pair in starts.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_drops_pending_only() {
        let scheduler = Scheduler::new(&config(60, None)).unwrap();

        let first = scheduler.submit(async {
            sleep(Duration::from_secs(10)).await;
            "done"
        });
        let second = scheduler.submit(async { "never" });
        let third = scheduler.submit(async { "never" });
        scheduler.cancel_all();

        assert_eq!(first.await, Ok("done"));
        assert_eq!(second.await, Err(SchedulerError::Cancelled));
        assert_eq!(third.await, Err(SchedulerError::Cancelled));

        // The scheduler keeps serving after a cancel.
        assert_eq!(scheduler.submit(async { 7 }).await, Ok(7));
        let stats = scheduler.stats();
        assert_eq!(stats.cancelled, 2);
        assert_eq!(stats.generation, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_is_reported() {
        let scheduler = Scheduler::new(&config(600, None)).unwrap();
        let handle = scheduler.submit(async {
            if true {
                panic!("boom");
            }
            1u8
        });
        assert_eq!(
            handle.await,
            Err(SchedulerError::TaskPanicked { message: "boom".into() })
        );
        assert_eq!(scheduler.submit(async { 2u8 }).await, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_tasks_survive_scheduler_drop() {
        let scheduler = Scheduler::new(&config(60, None)).unwrap();
        let a = scheduler.submit(async { 1 });
        let b = scheduler.submit(async { 2 });
        drop(scheduler);
        assert_eq!(a.await, Ok(1));
        assert_eq!(b.await, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_polling() {
        let scheduler = Scheduler::new(&config(60, None)).unwrap();
        let _blocker = scheduler.submit(sleep(Duration::from_secs(30)));
        let mut queued = tokio_test::task::spawn(scheduler.submit(async { 5 }));
        tokio_test::assert_pending!(queued.poll());

        let mut detached = tokio_test::task::spawn(TaskHandle::<u8> { rx: None });
        tokio_test::assert_ready_eq!(detached.poll(), Err(SchedulerError::Closed));
    }
}
