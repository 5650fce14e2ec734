//! `FileStore` wrapper that fails chosen operations on demand.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::{FileStore, ItemUpdate, JobStore, JobUpdate, StoreError};
use crate::models::{CrackResult, Dictionary, Job, JobDictionary, JobItem};

pub const ALWAYS: usize = usize::MAX;

pub struct FaultyStore {
    inner: Arc<FileStore>,
    get_job_failures: AtomicUsize,
    update_job_failures: AtomicUsize,
    insert_result_failures: AtomicUsize,
    list_dictionaries_failures: AtomicUsize,
    broken_job: Option<Uuid>,
}

impl FaultyStore {
    pub fn new(inner: Arc<FileStore>) -> Self {
        Self {
            inner,
            get_job_failures: AtomicUsize::new(0),
            update_job_failures: AtomicUsize::new(0),
            insert_result_failures: AtomicUsize::new(0),
            list_dictionaries_failures: AtomicUsize::new(0),
            broken_job: None,
        }
    }

    pub fn fail_get_job(self, times: usize) -> Self {
        self.get_job_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn fail_update_job(self, times: usize) -> Self {
        self.update_job_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn fail_insert_result(self, times: usize) -> Self {
        self.insert_result_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn fail_list_dictionaries(self, times: usize) -> Self {
        self.list_dictionaries_failures.store(times, Ordering::SeqCst);
        self
    }

    /// Every `update_job` on `id` fails.
    pub fn break_job(mut self, id: Uuid) -> Self {
        self.broken_job = Some(id);
        self
    }
}

fn trip(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
            0 => None,
            ALWAYS => Some(ALWAYS),
            n => Some(n - 1),
        })
        .is_ok()
}

fn injected(op: &str) -> StoreError {
    StoreError::Io {
        path: PathBuf::from(op),
        source: io::Error::other("injected failure"),
    }
}

impl JobStore for FaultyStore {
    fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.list_jobs()
    }

    fn get_job(&self, id: Uuid) -> Result<Job, StoreError> {
        if trip(&self.get_job_failures) {
            return Err(injected("get_job"));
        }
        self.inner.get_job(id)
    }

    fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.save_job(job)
    }

    fn update_job(&self, id: Uuid, apply: JobUpdate<'_>) -> Result<Job, StoreError> {
        if self.broken_job == Some(id) || trip(&self.update_job_failures) {
            return Err(injected("update_job"));
        }
        self.inner.update_job(id, apply)
    }

    fn items_for_job(&self, job_id: Uuid) -> Result<Vec<JobItem>, StoreError> {
        self.inner.items_for_job(job_id)
    }

    fn save_item(&self, item: &JobItem) -> Result<(), StoreError> {
        self.inner.save_item(item)
    }

    fn update_item(
        &self,
        job_id: Uuid,
        item_id: Uuid,
        apply: ItemUpdate<'_>,
    ) -> Result<Option<JobItem>, StoreError> {
        self.inner.update_item(job_id, item_id, apply)
    }

    fn append_attempt(&self, attempt: &JobDictionary) -> Result<(), StoreError> {
        self.inner.append_attempt(attempt)
    }

    fn attempts_for_job(&self, job_id: Uuid) -> Result<Vec<JobDictionary>, StoreError> {
        self.inner.attempts_for_job(job_id)
    }

    fn insert_result(&self, result: &CrackResult) -> Result<bool, StoreError> {
        if trip(&self.insert_result_failures) {
            return Err(injected("insert_result"));
        }
        self.inner.insert_result(result)
    }

    fn results_for_job(&self, job_id: Uuid) -> Result<Vec<CrackResult>, StoreError> {
        self.inner.results_for_job(job_id)
    }

    fn list_dictionaries(&self) -> Result<Vec<Dictionary>, StoreError> {
        if trip(&self.list_dictionaries_failures) {
            return Err(injected("list_dictionaries"));
        }
        self.inner.list_dictionaries()
    }

    fn save_dictionary(&self, dictionary: &Dictionary) -> Result<(), StoreError> {
        self.inner.save_dictionary(dictionary)
    }
}
