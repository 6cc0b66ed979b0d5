//! Poll loop that claims pending jobs and runs them concurrently.
//!
//! Ownership of a job is decided only by the store's atomic claim. The
//! runner tracks an in-memory active set purely to bound concurrency and
//! to skip rows it is already working on.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info};

use super::processor::ProcessJob;
use crate::db::job_store::JobStore;

struct RunnerState {
    active: Mutex<HashSet<String>>,
    cancelled: Mutex<HashSet<String>>,
    running: AtomicBool,
}

/// Removes a job id from the active set when the task ends, on success,
/// failure and panic alike.
struct ActiveGuard {
    state: Arc<RunnerState>,
    job_id: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.state.active.lock() {
            active.remove(&self.job_id);
        }
    }
}

pub struct JobRunner {
    jobs: Arc<dyn JobStore>,
    processor: Arc<dyn ProcessJob>,
    max_concurrent: usize,
    poll_interval: Duration,
    state: Arc<RunnerState>,
}

impl JobRunner {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        processor: Arc<dyn ProcessJob>,
        max_concurrent: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            processor,
            max_concurrent,
            poll_interval,
            state: Arc::new(RunnerState {
                active: Mutex::new(HashSet::new()),
                cancelled: Mutex::new(HashSet::new()),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Runs the poll loop until [`JobRunner::stop`] is called. Spawned
    /// job tasks outlive the loop and finish on their own.
    pub async fn run(&self) {
        self.state.running.store(true, Ordering::SeqCst);
        info!(
            "Job runner started (max {} concurrent, poll every {:?})",
            self.max_concurrent, self.poll_interval
        );

        while self.state.running.load(Ordering::SeqCst) {
            if let Err(e) = self.poll_once().await {
                error!("Poll cycle failed: {}", e);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        info!("Job runner stopped");
    }

    /// One poll cycle: fill free slots with freshly claimed jobs.
    pub async fn poll_once(&self) -> Result<(), crate::db::StoreError> {
        let slots = self.max_concurrent.saturating_sub(self.active_count());
        if slots == 0 {
            return Ok(());
        }

        let pending = self.jobs.list_pending(slots)?;
        for job in pending {
            if self.is_active(&job.id) || self.is_cancelled(&job.id) {
                continue;
            }

            // The conditional update decides ownership; a lost race is
            // an ordinary outcome, not an error.
            let Some(claimed) = self.jobs.claim(&job.id)? else {
                debug!("Job {} was claimed elsewhere", job.id);
                continue;
            };

            if let Ok(mut active) = self.state.active.lock() {
                active.insert(claimed.id.clone());
            }

            let processor = self.processor.clone();
            let guard = ActiveGuard {
                state: self.state.clone(),
                job_id: claimed.id.clone(),
            };
            tokio::spawn(async move {
                let _guard = guard;
                processor.process(claimed).await;
            });
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.state.running.store(false, Ordering::SeqCst);
    }

    pub fn active_count(&self) -> usize {
        self.state.active.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.state
            .active
            .lock()
            .map(|a| a.contains(job_id))
            .unwrap_or(false)
    }

    /// Marks a job so this runner never claims it in a future cycle.
    /// A job that is already running is unaffected.
    pub fn request_cancel(&self, job_id: &str) {
        if let Ok(mut cancelled) = self.state.cancelled.lock() {
            cancelled.insert(job_id.to_string());
        }
    }

    fn is_cancelled(&self, job_id: &str) -> bool {
        self.state
            .cancelled
            .lock()
            .map(|c| c.contains(job_id))
            .unwrap_or(false)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
