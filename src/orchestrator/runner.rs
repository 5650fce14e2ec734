//! Runs one job from `pending` to a terminal status.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::fs::{Area, Storage};
use crate::models::{AttemptStatus, Credential, Dictionary, Job, JobDictionary, JobStatus};
use crate::orchestrator::batch::BatchCoordinator;
use crate::orchestrator::dictionaries::{ordered_dictionaries, remaining_for_run};
use crate::orchestrator::executor::{
    AttackExecutor, AttemptObserver, AttemptReport, AttemptRequest, ProgressUpdate,
};
use crate::store::{JobStore, StoreError};

pub const NO_DICTIONARIES_ERROR: &str = "No dictionaries available";
pub const EXHAUSTED_ERROR: &str = "All dictionaries exhausted without finding the password";

pub struct JobRunner {
    store: Arc<dyn JobStore>,
    executor: AttackExecutor,
    batch: BatchCoordinator,
    storage: Storage,
    clock: Arc<dyn Clock>,
    shutdown: Arc<AtomicBool>,
}

enum Step {
    Continue,
    Done,
    /// Another component moved the job out of `processing`
    Interrupted(JobStatus),
    /// The runner already wrote a final status
    Finished(JobStatus),
    /// The worker is shutting down; the job stays `processing` for orphan
    /// recovery on the next start
    Shutdown,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: AttackExecutor,
        batch: BatchCoordinator,
        storage: Storage,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            executor,
            batch,
            storage,
            clock,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set to stop between attempts without touching the job status.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Session handle for run `run_id` starting at `now`. Every run gets its
    /// own transcript, even when two runs start within the same second.
    pub fn session_name(job: &Job, run_id: Uuid, now: DateTime<Utc>) -> String {
        let run = run_id.simple().to_string();
        format!("sift-{}-{}-{}", job.short_id(), now.timestamp(), &run[..8])
    }

    /// Drive `job_id` through every remaining dictionary.
    ///
    /// Returns the job's status when the runner let go of it, or `None` if
    /// the job could not be started (no longer pending).
    pub fn run(&self, job_id: Uuid) -> Result<Option<JobStatus>, StoreError> {
        let now = self.clock.now();
        let mut run_id = None;
        let job = self.store.update_job(job_id, &mut |job| {
            if job.status != JobStatus::Pending {
                return Ok(());
            }
            let started = job.try_start(String::new(), now)?;
            job.session = Some(Self::session_name(job, started, now));
            run_id = Some(started);
            Ok(())
        })?;
        let Some(run_id) = run_id else {
            tracing::debug!(job_id = %job_id, status = %job.status, "Job not pending, skipping");
            return Ok(None);
        };
        let session = job.session.clone().unwrap_or_default();
        tracing::info!(job_id = %job_id, session = %session, batch = job.batch_mode, "Job started");

        match self.drive(&job, &session, run_id) {
            Ok(status) => Ok(status),
            Err(e) => {
                self.requeue_after_error(&job, &e);
                Err(e)
            }
        }
    }

    fn drive(
        &self,
        job: &Job,
        session: &str,
        run_id: Uuid,
    ) -> Result<Option<JobStatus>, StoreError> {
        let dictionaries = ordered_dictionaries(self.store.list_dictionaries()?);
        let attempts = self.store.attempts_for_job(job.id)?;
        let remaining = remaining_for_run(dictionaries, &attempts, run_id);
        if remaining.is_empty() {
            return self.finish(job, false, Some(NO_DICTIONARIES_ERROR));
        }

        let mut cracked = false;
        for dictionary in &remaining {
            let (step, report) = self.attempt(job, session, run_id, dictionary)?;
            cracked |= report.success;
            match step {
                Step::Continue => {}
                Step::Done => break,
                Step::Interrupted(status) => return Ok(Some(self.interrupted(job, status))),
                Step::Finished(status) => return Ok(Some(status)),
                Step::Shutdown => {
                    self.executor.slot().kill_current_process();
                    tracing::info!(job_id = %job.id, "Worker shutting down, leaving job for recovery");
                    return Ok(Some(JobStatus::Processing));
                }
            }
        }
        self.finish(job, cracked, None)
    }

    /// A store error cut the run short: stop the tool and hand the job back
    /// to the scheduler. If even that write fails the job stays `processing`
    /// until orphan cleanup or the timeout check.
    fn requeue_after_error(&self, job: &Job, error: &StoreError) {
        self.executor.slot().kill_current_process();
        let now = self.clock.now();
        let reason = error.to_string();
        let result = self.store.update_job(job.id, &mut |job| {
            if job.status == JobStatus::Processing {
                job.try_return_to_queue(&reason, now)?;
            }
            Ok(())
        });
        match result {
            Ok(_) => tracing::warn!(job_id = %job.id, "Run interrupted by store error, job requeued: {error}"),
            Err(e) => tracing::error!(job_id = %job.id, "Failed to requeue job after store error: {e}"),
        }
    }

    fn attempt(
        &self,
        job: &Job,
        session: &str,
        run_id: Uuid,
        dictionary: &Dictionary,
    ) -> Result<(Step, AttemptReport), StoreError> {
        if self.shutting_down() {
            return Ok((Step::Shutdown, AttemptReport::default()));
        }
        if let Some(status) = self.external_status(job.id) {
            return Ok((Step::Interrupted(status), AttemptReport::default()));
        }

        let now = self.clock.now();
        let batch_mode = job.batch_mode;
        let marked = self.store.update_job(job.id, &mut |job| {
            if job.status == JobStatus::Processing {
                job.current_dictionary = Some(dictionary.name.clone());
                if !batch_mode {
                    job.progress = 0.0;
                }
                job.append_log(now, &format!("Trying dictionary {}", dictionary.name));
            }
            Ok(())
        });
        if let Err(e) = marked {
            tracing::warn!(job_id = %job.id, dictionary = %dictionary.name, "Failed to store current dictionary: {e}");
        }

        let request = AttemptRequest {
            job_id: job.id,
            hash_file: &job.hash_file,
            dictionary: &dictionary.path,
            session,
        };
        let mut observer = RunObserver {
            store: self.store.as_ref(),
            batch: &self.batch,
            clock: self.clock.as_ref(),
            job_id: job.id,
        };

        let report = match self.executor.run(&request, &mut observer) {
            Ok(report) => report,
            Err(e) if e.is_fatal() => {
                tracing::error!(job_id = %job.id, "{e}");
                let message = e.to_string();
                self.record_attempt(
                    job.id,
                    run_id,
                    dictionary,
                    AttemptStatus::Failed,
                    Some(message.clone()),
                );
                let status = self
                    .finish(job, false, Some(&message))?
                    .unwrap_or(JobStatus::Failed);
                return Ok((Step::Finished(status), AttemptReport::default()));
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, dictionary = %dictionary.name, "Attempt failed: {e}");
                AttemptReport {
                    error: Some(e.to_string()),
                    ..AttemptReport::default()
                }
            }
        };

        let status = if report.success {
            AttemptStatus::Completed
        } else {
            AttemptStatus::Failed
        };
        self.record_attempt(job.id, run_id, dictionary, status, report.error.clone());

        if self.shutting_down() {
            return Ok((Step::Shutdown, report));
        }
        if let Some(status) = self.external_status(job.id) {
            return Ok((Step::Interrupted(status), report));
        }

        let step = if job.batch_mode {
            match self.store.get_job(job.id) {
                Ok(current) if current.all_items_cracked() => Step::Done,
                Ok(_) => Step::Continue,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, "Failed to read batch progress: {e}");
                    Step::Continue
                }
            }
        } else if report.success {
            Step::Done
        } else {
            Step::Continue
        };
        Ok((step, report))
    }

    fn record_attempt(
        &self,
        job_id: Uuid,
        run_id: Uuid,
        dictionary: &Dictionary,
        status: AttemptStatus,
        error: Option<String>,
    ) {
        let attempt = JobDictionary {
            job_id,
            dictionary_id: dictionary.id,
            dictionary_name: dictionary.name.clone(),
            run_id,
            status,
            error,
            attempted_at: self.clock.now(),
        };
        if let Err(e) = self.store.append_attempt(&attempt) {
            tracing::warn!(job_id = %job_id, "Failed to record dictionary attempt: {e}");
        }
    }

    /// The job's status if something other than this runner moved it out of
    /// `processing`. An unreadable record counts as still processing.
    fn external_status(&self, job_id: Uuid) -> Option<JobStatus> {
        match self.store.get_job(job_id) {
            Ok(job) => (job.status != JobStatus::Processing).then_some(job.status),
            Err(e) => {
                tracing::warn!(job_id = %job_id, "Failed to read job status, assuming processing: {e}");
                None
            }
        }
    }

    /// Someone else decided the job's fate: stop the tool, keep their status.
    fn interrupted(&self, job: &Job, status: JobStatus) -> JobStatus {
        self.executor.slot().kill_current_process();
        tracing::info!(job_id = %job.id, status = %status, "Job left processing, stopping run");
        if matches!(status, JobStatus::Completed | JobStatus::Failed) {
            if job.batch_mode {
                if let Err(e) = self.batch.finalize(job.id) {
                    tracing::warn!(job_id = %job.id, "Failed to finalize batch items: {e}");
                }
            }
            self.settle_source(job, status);
        }
        status
    }

    /// Write the final status for a run this runner saw through to the end.
    fn finish(
        &self,
        job: &Job,
        cracked: bool,
        error: Option<&str>,
    ) -> Result<Option<JobStatus>, StoreError> {
        let batch_status = if job.batch_mode {
            Some(self.batch.finalize(job.id)?)
        } else {
            None
        };
        let mut status = match (error, batch_status) {
            (Some(_), _) => JobStatus::Failed,
            (None, Some(status)) => status,
            (None, None) if cracked => JobStatus::Completed,
            (None, None) => JobStatus::Failed,
        };

        let now = self.clock.now();
        let message = error.unwrap_or(if job.batch_mode {
            "No batch target was cracked"
        } else {
            EXHAUSTED_ERROR
        });
        let mut applied = false;
        let stored = self.store.update_job(job.id, &mut |job| {
            applied = false;
            if job.status != JobStatus::Processing {
                return Ok(());
            }
            match status {
                JobStatus::Completed => {
                    job.try_finish(JobStatus::Completed, now)?;
                    job.append_log(now, "Job completed");
                }
                _ => job.try_fail(message, now)?,
            }
            applied = true;
            Ok(())
        })?;
        if !applied {
            status = stored.status;
        }

        tracing::info!(job_id = %job.id, status = %status, "Job finished");
        if status.is_terminal() {
            self.settle_source(job, status);
        }
        Ok(Some(status))
    }

    /// Move a single-target job's capture out of the pending area.
    fn settle_source(&self, job: &Job, status: JobStatus) {
        let Some(source) = job.source_file.as_ref() else {
            return;
        };
        let area = match status {
            JobStatus::Completed => Area::Completed,
            JobStatus::Failed => Area::Failed,
            _ => return,
        };
        match self.storage.relocate(source, area) {
            Ok(moved) => {
                let result = self.store.update_job(job.id, &mut |job| {
                    job.source_file = Some(moved.clone());
                    Ok(())
                });
                if let Err(e) = result {
                    tracing::warn!(job_id = %job.id, "Failed to record moved capture: {e}");
                }
            }
            Err(e) => tracing::warn!(
                job_id = %job.id,
                "Failed to move {} to {area}: {e}",
                source.display()
            ),
        }
    }
}

/// Persists what the executor reports while an attempt runs.
struct RunObserver<'a> {
    store: &'a dyn JobStore,
    batch: &'a BatchCoordinator,
    clock: &'a dyn Clock,
    job_id: Uuid,
}

impl AttemptObserver for RunObserver<'_> {
    fn on_progress(&mut self, progress: &ProgressUpdate) {
        let result = self.store.update_job(self.job_id, &mut |job| {
            if job.status == JobStatus::Processing {
                job.progress = progress.percent;
                if progress.speed.is_some() {
                    job.speed = progress.speed.clone();
                }
                if progress.eta.is_some() {
                    job.eta = progress.eta.clone();
                }
            }
            Ok(())
        });
        if let Err(e) = result {
            tracing::warn!(job_id = %self.job_id, "Failed to store progress: {e}");
        }
    }

    fn on_cracked(&mut self, credential: &Credential) {
        if let Err(e) = self
            .batch
            .record_crack(self.job_id, credential, self.clock.now())
        {
            tracing::warn!(job_id = %self.job_id, "Failed to record cracked credential: {e}");
        }
    }

    fn on_log(&mut self, message: &str) {
        let now = self.clock.now();
        let result = self.store.update_job(self.job_id, &mut |job| {
            job.append_log(now, message);
            Ok(())
        });
        if let Err(e) = result {
            tracing::warn!(job_id = %self.job_id, "Failed to append job log: {e}");
        }
    }
}
