//! Periodic job scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Runs a job repeatedly at a fixed interval.
pub trait Scheduler: Send + Sync {
    /// Runs `job` once right away, then every `interval` until the returned
    /// handle is cancelled.
    fn schedule(
        &self,
        name: &str,
        interval: Duration,
        job: Box<dyn FnMut() + Send>,
    ) -> ScheduleHandle;
}

/// Handle to a scheduled job. Cancelling stops further ticks; a tick that is
/// already running completes.
pub struct ScheduleHandle {
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ScheduleHandle {
    /// Handle for a job driven by `cancelled` without a dedicated thread.
    pub fn from_flag(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            thread: None,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancels and waits for the running tick, if any, to finish.
    pub fn stop(mut self) {
        self.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Scheduled job panicked");
            }
        }
    }
}

/// Scheduler running each job on its own thread.
#[derive(Debug, Clone)]
pub struct ThreadScheduler {
    /// Granularity of the cancellation check while waiting.
    pub poll_interval: Duration,
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(
        &self,
        name: &str,
        interval: Duration,
        mut job: Box<dyn FnMut() + Send>,
    ) -> ScheduleHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let poll = self.poll_interval.min(interval).max(Duration::from_millis(1));
        let name = name.to_string();

        let thread = thread::spawn(move || {
            tracing::debug!(job = %name, interval_secs = interval.as_secs(), "Job scheduled");

            while !flag.load(Ordering::SeqCst) {
                let started = Instant::now();
                job();

                while started.elapsed() < interval {
                    if flag.load(Ordering::SeqCst) {
                        break;
                    }
                    thread::sleep(poll.min(interval.saturating_sub(started.elapsed())));
                }
            }

            tracing::debug!(job = %name, "Job cancelled");
        });

        ScheduleHandle {
            cancelled,
            thread: Some(thread),
        }
    }
}
