use chrono::{DateTime, SecondsFormat, Utc};
use std::path::PathBuf;
use uuid::Uuid;

use super::transitions::TransitionError;
use super::types::{Job, JobStatus};

impl Job {
    /// Create a pending single-target job.
    pub fn new(name: impl Into<String>, hash_file: PathBuf, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: JobStatus::Pending,
            priority: 0,
            batch_mode: false,
            hash_file,
            source_file: None,
            items_total: 0,
            items_cracked: 0,
            current_dictionary: None,
            progress: 0.0,
            speed: None,
            eta: None,
            session: None,
            run_id: None,
            created_at,
            started_at: None,
            completed_at: None,
            error: None,
            logs: String::new(),
        }
    }

    /// Create a pending batch job covering `items_total` targets.
    pub fn new_batch(
        name: impl Into<String>,
        hash_file: PathBuf,
        items_total: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut job = Self::new(name, hash_file, created_at);
        job.batch_mode = true;
        job.items_total = items_total;
        job
    }

    pub fn with_source_file(mut self, path: PathBuf) -> Self {
        self.source_file = Some(path);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Append a timestamped line to the job log.
    pub fn append_log(&mut self, at: DateTime<Utc>, message: &str) {
        self.logs.push_str(&format!(
            "[{}] {}\n",
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
            message
        ));
    }

    /// Validated status change.
    pub fn try_set_status(&mut self, status: JobStatus) -> Result<(), TransitionError> {
        self.status = self.status.try_transition(status)?;
        Ok(())
    }

    /// Enter `Processing` for a fresh run bound to `session`.
    pub fn try_start(
        &mut self,
        session: String,
        now: DateTime<Utc>,
    ) -> Result<Uuid, TransitionError> {
        self.try_set_status(JobStatus::Processing)?;
        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        self.session = Some(session);
        self.started_at = Some(now);
        self.completed_at = None;
        self.error = None;
        self.progress = 0.0;
        self.speed = None;
        self.eta = None;
        self.current_dictionary = None;
        self.append_log(now, "Job started");
        Ok(run_id)
    }

    /// Move to a terminal status and release the session handle.
    pub fn try_finish(
        &mut self,
        status: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.try_set_status(status)?;
        self.completed_at = Some(now);
        self.session = None;
        if status == JobStatus::Completed {
            self.progress = 100.0;
        }
        Ok(())
    }

    /// Fail the job with an explicit error, logged to the job history.
    pub fn try_fail(&mut self, message: &str, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.try_finish(JobStatus::Failed, now)?;
        self.error = Some(message.to_string());
        self.append_log(now, &format!("Error: {message}"));
        Ok(())
    }

    /// Put an orphaned processing job back in the queue.
    pub fn try_reset_orphan(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.try_set_status(JobStatus::Pending)?;
        self.started_at = None;
        self.session = None;
        self.run_id = None;
        self.append_log(now, "Reset to pending after worker restart");
        Ok(())
    }

    /// Hand a processing job back to the scheduler after its run broke off.
    pub fn try_return_to_queue(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.try_set_status(JobStatus::Pending)?;
        self.started_at = None;
        self.session = None;
        self.run_id = None;
        self.current_dictionary = None;
        self.append_log(now, &format!("Returned to pending: {reason}"));
        Ok(())
    }

    /// Send a failed, stopped or paused job back to the queue.
    pub fn try_requeue(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.try_set_status(JobStatus::Pending)?;
        self.started_at = None;
        self.completed_at = None;
        self.session = None;
        self.run_id = None;
        self.error = None;
        self.progress = 0.0;
        self.speed = None;
        self.eta = None;
        self.current_dictionary = None;
        self.append_log(now, "Requeued");
        Ok(())
    }

    /// Raise the cracked counter to the number of completed items, capped
    /// at the total. The counter never moves backwards.
    pub fn sync_items_cracked(&mut self, completed: u32) -> bool {
        let target = completed.min(self.items_total);
        if target <= self.items_cracked {
            return false;
        }
        self.items_cracked = target;
        true
    }

    pub fn all_items_cracked(&self) -> bool {
        self.batch_mode && self.items_total > 0 && self.items_cracked >= self.items_total
    }

    /// First segment of the UUID, used in session names and CLI output.
    pub fn short_id(&self) -> String {
        self.id
            .to_string()
            .split('-')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}
