//! Crash recovery and runaway-job protection.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::JobStatus;
use crate::process::ProcessSlot;
use crate::store::{JobStore, StoreError};

/// Whether more than `ceiling` has elapsed since `start`.
///
/// Exactly `ceiling` is not timed out, and a start in the future never is.
pub fn has_timed_out(start: DateTime<Utc>, now: DateTime<Utc>, ceiling: Duration) -> bool {
    let elapsed = now.signed_duration_since(start);
    match chrono::Duration::from_std(ceiling) {
        Ok(ceiling) => elapsed > ceiling,
        Err(_) => false,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub reset: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

pub struct RecoveryManager {
    store: Arc<dyn JobStore>,
    slot: ProcessSlot,
    job_timeout: Duration,
}

impl RecoveryManager {
    pub fn new(store: Arc<dyn JobStore>, slot: ProcessSlot, job_timeout: Duration) -> Self {
        Self {
            store,
            slot,
            job_timeout,
        }
    }

    /// Put every job left `processing` by a previous worker back in the
    /// queue. Runs once at startup, before anything is spawned.
    pub fn cleanup_orphaned_jobs(&self, now: DateTime<Utc>) -> Result<CleanupReport, StoreError> {
        let mut report = CleanupReport::default();
        for job in self.store.jobs_with_status(JobStatus::Processing)? {
            let result = self.store.update_job(job.id, &mut |job| {
                if job.status != JobStatus::Processing {
                    return Ok(());
                }
                job.try_reset_orphan(now)?;
                Ok(())
            });
            match result {
                Ok(_) => {
                    tracing::info!(job_id = %job.id, "Reset orphaned job to pending");
                    report.reset.push(job.id);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, "Failed to reset orphaned job: {e}");
                    report.failed.push(job.id);
                }
            }
        }
        if !report.reset.is_empty() {
            tracing::info!(count = report.reset.len(), "Recovered orphaned jobs");
        }
        Ok(report)
    }

    /// Fail processing jobs that have run longer than the configured
    /// ceiling. Returns the ids of jobs that were failed.
    pub fn check_timeouts(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let processing = match self.store.jobs_with_status(JobStatus::Processing) {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!("Timeout check could not list jobs: {e}");
                return Vec::new();
            }
        };

        let message = timeout_message(self.job_timeout);
        let mut timed_out = Vec::new();
        for job in processing {
            let Some(started_at) = job.started_at else {
                continue;
            };
            if !has_timed_out(started_at, now, self.job_timeout) {
                continue;
            }

            let mut failed = false;
            let result = self.store.update_job(job.id, &mut |job| {
                failed = false;
                if job.status != JobStatus::Processing {
                    return Ok(());
                }
                job.try_fail(&message, now)?;
                failed = true;
                Ok(())
            });
            match result {
                Ok(_) if failed => {
                    tracing::warn!(job_id = %job.id, "{message}");
                    if self.slot.owner() == Some(job.id) {
                        self.slot.kill_current_process();
                    }
                    timed_out.push(job.id);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(job_id = %job.id, "Failed to time out job: {e}"),
            }
        }
        timed_out
    }
}

fn timeout_message(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("Job timed out after {} hours", secs / 3600)
    } else {
        format!("Job timed out after {secs} seconds")
    }
}
