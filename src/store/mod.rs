//! Persistence collaborator for jobs, batch items, dictionary attempts,
//! results and dictionaries.
//!
//! The engine only talks to [`JobStore`]. [`FileStore`] is the bundled
//! implementation: one JSON document per record, guarded by advisory locks.

mod file;
pub mod locking;
#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use uuid::Uuid;

use crate::models::{
    CrackResult, Dictionary, Job, JobDictionary, JobItem, JobStatus, TransitionError,
};

pub use file::FileStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Job item not found: {0}")]
    ItemNotFound(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Callback applied to a job inside a read-modify-write.
pub type JobUpdate<'a> = &'a mut dyn FnMut(&mut Job) -> Result<(), StoreError>;

/// Callback applied to an item; returns `true` when the item changed.
pub type ItemUpdate<'a> = &'a mut dyn FnMut(&mut JobItem) -> bool;

pub trait JobStore: Send + Sync {
    fn list_jobs(&self) -> Result<Vec<Job>, StoreError>;

    fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .list_jobs()?
            .into_iter()
            .filter(|job| job.status == status)
            .collect())
    }

    fn get_job(&self, id: Uuid) -> Result<Job, StoreError>;

    /// Insert or overwrite a job record.
    fn save_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Atomically apply `apply` to the stored job. Nothing is written if it
    /// returns an error.
    fn update_job(&self, id: Uuid, apply: JobUpdate<'_>) -> Result<Job, StoreError>;

    fn items_for_job(&self, job_id: Uuid) -> Result<Vec<JobItem>, StoreError>;

    fn save_item(&self, item: &JobItem) -> Result<(), StoreError>;

    /// Atomically apply `apply` to the stored item; returns the item only if
    /// `apply` reported a change.
    fn update_item(
        &self,
        job_id: Uuid,
        item_id: Uuid,
        apply: ItemUpdate<'_>,
    ) -> Result<Option<JobItem>, StoreError>;

    /// Append one dictionary attempt to the job's history.
    fn append_attempt(&self, attempt: &JobDictionary) -> Result<(), StoreError>;

    fn attempts_for_job(&self, job_id: Uuid) -> Result<Vec<JobDictionary>, StoreError>;

    /// Write-once insert keyed by `(job_id, credential_hash)`.
    ///
    /// Returns `false` when the result already existed.
    fn insert_result(&self, result: &CrackResult) -> Result<bool, StoreError>;

    fn results_for_job(&self, job_id: Uuid) -> Result<Vec<CrackResult>, StoreError>;

    fn list_dictionaries(&self) -> Result<Vec<Dictionary>, StoreError>;

    fn save_dictionary(&self, dictionary: &Dictionary) -> Result<(), StoreError>;
}
