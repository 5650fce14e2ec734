//! File-backed store.
//!
//! Layout under the store root:
//!
//! ```text
//! jobs/<job-id>.json
//! items/<job-id>/<item-id>.json
//! attempts/<job-id>.jsonl
//! results/<job-id>/<credential-hash>.json
//! dictionaries/<dictionary-id>.json
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::locking::{locked_append, locked_read, locked_update, locked_write};
use super::{ItemUpdate, JobStore, JobUpdate, StoreError};
use crate::models::{CrackResult, Dictionary, Job, JobDictionary, JobItem};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { root: root.into() };
        for dir in ["jobs", "items", "attempts", "results", "dictionaries"] {
            let path = store.root.join(dir);
            fs::create_dir_all(&path).map_err(|source| StoreError::Io { path, source })?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_path(&self, id: Uuid) -> PathBuf {
        self.root.join("jobs").join(format!("{id}.json"))
    }

    fn items_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join("items").join(job_id.to_string())
    }

    fn item_path(&self, job_id: Uuid, item_id: Uuid) -> PathBuf {
        self.items_dir(job_id).join(format!("{item_id}.json"))
    }

    fn attempts_path(&self, job_id: Uuid) -> PathBuf {
        self.root.join("attempts").join(format!("{job_id}.jsonl"))
    }

    fn results_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join("results").join(job_id.to_string())
    }

    fn dictionary_path(&self, id: Uuid) -> PathBuf {
        self.root.join("dictionaries").join(format!("{id}.json"))
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn encode<T: Serialize>(path: &Path, value: &T) -> Result<String, StoreError> {
    serde_json::to_string_pretty(value).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn decode<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T, StoreError> {
    serde_json::from_str(content).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = locked_read(path).map_err(io_err(path))?;
    decode(path, &content)
}

fn write_record<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let content = encode(path, value)?;
    locked_write(path, &content).map_err(io_err(path))
}

/// Load every `.json` record in `dir`. Unreadable records are skipped with a
/// warning so one corrupt file does not hide the rest.
fn read_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_record(&path) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record"),
        }
    }
    Ok(records)
}

/// Run a read-modify-write against an existing record file.
fn update_record<T, R>(
    path: &Path,
    missing: impl FnOnce() -> StoreError,
    apply: impl FnOnce(&mut T) -> Result<Option<R>, StoreError>,
) -> Result<Option<R>, StoreError>
where
    T: Serialize + DeserializeOwned,
{
    if !path.exists() {
        return Err(missing());
    }

    // Errors raised inside the closure travel out through io::Error::other and
    // are recovered below.
    let mut inner_err: Option<StoreError> = None;
    let outcome = locked_update(path, |current| {
        let Some(content) = current else {
            return Ok((None, None));
        };
        let mut record: T = match decode(path, content) {
            Ok(record) => record,
            Err(e) => {
                inner_err = Some(e);
                return Err(io::Error::other("decode failed"));
            }
        };
        match apply(&mut record) {
            Ok(Some(value)) => match encode(path, &record) {
                Ok(next) => Ok((Some(next), Some(value))),
                Err(e) => {
                    inner_err = Some(e);
                    Err(io::Error::other("encode failed"))
                }
            },
            Ok(None) => Ok((None, None)),
            Err(e) => {
                inner_err = Some(e);
                Err(io::Error::other("update rejected"))
            }
        }
    });

    match outcome {
        Ok(value) => Ok(value),
        Err(source) => Err(inner_err.unwrap_or_else(|| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })),
    }
}

impl JobStore for FileStore {
    fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        read_all(&self.root.join("jobs"))
    }

    fn get_job(&self, id: Uuid) -> Result<Job, StoreError> {
        let path = self.job_path(id);
        if !path.exists() {
            return Err(StoreError::JobNotFound(id));
        }
        read_record(&path)
    }

    fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        write_record(&self.job_path(job.id), job)
    }

    fn update_job(&self, id: Uuid, apply: JobUpdate<'_>) -> Result<Job, StoreError> {
        let path = self.job_path(id);
        let updated = update_record(
            &path,
            || StoreError::JobNotFound(id),
            |job: &mut Job| {
                apply(job)?;
                Ok(Some(job.clone()))
            },
        )?;
        updated.ok_or(StoreError::JobNotFound(id))
    }

    fn items_for_job(&self, job_id: Uuid) -> Result<Vec<JobItem>, StoreError> {
        let mut items: Vec<JobItem> = read_all(&self.items_dir(job_id))?;
        items.sort_by(|a, b| a.essid.cmp(&b.essid).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    fn save_item(&self, item: &JobItem) -> Result<(), StoreError> {
        write_record(&self.item_path(item.job_id, item.id), item)
    }

    fn update_item(
        &self,
        job_id: Uuid,
        item_id: Uuid,
        apply: ItemUpdate<'_>,
    ) -> Result<Option<JobItem>, StoreError> {
        let path = self.item_path(job_id, item_id);
        update_record(
            &path,
            || StoreError::ItemNotFound(item_id),
            |item: &mut JobItem| Ok(apply(item).then(|| item.clone())),
        )
    }

    fn append_attempt(&self, attempt: &JobDictionary) -> Result<(), StoreError> {
        let path = self.attempts_path(attempt.job_id);
        let line = serde_json::to_string(attempt).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        locked_append(&path, &line).map_err(io_err(&path))
    }

    fn attempts_for_job(&self, job_id: Uuid) -> Result<Vec<JobDictionary>, StoreError> {
        let path = self.attempts_path(job_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = locked_read(&path).map_err(io_err(&path))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| decode(&path, line))
            .collect()
    }

    fn insert_result(&self, result: &CrackResult) -> Result<bool, StoreError> {
        let dir = self.results_dir(result.job_id);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let path = dir.join(format!("{}.json", result.credential_hash));
        let content = encode(&path, result)?;

        // create_new makes the insert write-once even across threads
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        file.write_all(content.as_bytes())
            .and_then(|_| file.flush())
            .map_err(io_err(&path))?;
        Ok(true)
    }

    fn results_for_job(&self, job_id: Uuid) -> Result<Vec<CrackResult>, StoreError> {
        let mut results: Vec<CrackResult> = read_all(&self.results_dir(job_id))?;
        results.sort_by(|a, b| a.cracked_at.cmp(&b.cracked_at));
        Ok(results)
    }

    fn list_dictionaries(&self) -> Result<Vec<Dictionary>, StoreError> {
        read_all(&self.root.join("dictionaries"))
    }

    fn save_dictionary(&self, dictionary: &Dictionary) -> Result<(), StoreError> {
        write_record(&self.dictionary_path(dictionary.id), dictionary)
    }
}
