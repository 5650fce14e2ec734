//! Job scheduler loop.
//!
//! Picks the next pending job and hands it to the [`JobRunner`]. Only one job
//! runs at a time; the busy flag keeps overlapping polls from starting a
//! second one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::models::{Job, JobStatus};
use crate::orchestrator::recovery::RecoveryManager;
use crate::orchestrator::runner::JobRunner;
use crate::store::{JobStore, StoreError};

pub struct Scheduler {
    store: Arc<dyn JobStore>,
    runner: JobRunner,
    recovery: Arc<RecoveryManager>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    priority_ordering: bool,
    busy: AtomicBool,
}

/// Clears the busy flag however the poll ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        runner: JobRunner,
        recovery: Arc<RecoveryManager>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        priority_ordering: bool,
    ) -> Self {
        Self {
            store,
            runner,
            recovery,
            clock,
            poll_interval,
            priority_ordering,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Oldest eligible pending job, or the highest priority one when
    /// priority ordering is on.
    pub fn next_job(&self) -> Result<Option<Job>, StoreError> {
        let mut pending = self.store.jobs_with_status(JobStatus::Pending)?;
        let by_priority = self.priority_ordering;
        pending.sort_by(|a, b| {
            let priority = if by_priority {
                b.priority.cmp(&a.priority)
            } else {
                std::cmp::Ordering::Equal
            };
            priority
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(pending.into_iter().next())
    }

    /// Run at most one job to completion. Returns whether a job ran.
    pub fn poll_once(&self) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let _busy = BusyGuard(&self.busy);

        let job = match self.next_job() {
            Ok(Some(job)) => job,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!("Failed to select next job, retrying next tick: {e}");
                return false;
            }
        };

        tracing::info!(job_id = %job.id, name = %job.name, "Picked up job");
        match self.runner.run(job.id) {
            Ok(Some(status)) => {
                tracing::info!(job_id = %job.id, status = %status, "Job released");
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::error!(job_id = %job.id, "Job run aborted, retrying next tick: {e}");
                false
            }
        }
    }

    /// Recover orphans, then poll until `stop` fires or its sender is dropped.
    pub fn run(&self, stop: &Receiver<()>) {
        match self.recovery.cleanup_orphaned_jobs(self.clock.now()) {
            Ok(report) if !report.failed.is_empty() => tracing::warn!(
                failed = report.failed.len(),
                "Some orphaned jobs could not be reset"
            ),
            Ok(_) => {}
            Err(e) => tracing::error!("Orphan cleanup failed: {e}"),
        }

        tracing::info!(interval_secs = self.poll_interval.as_secs(), "Scheduler started");
        loop {
            if self.poll_once() {
                match stop.try_recv() {
                    Err(TryRecvError::Empty) => continue,
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                }
            }
            match stop.recv_timeout(self.poll_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::info!("Scheduler stopped");
    }
}
