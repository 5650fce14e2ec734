//! Batch coordinator: reconciles cracked credentials against a job's
//! targets.
//!
//! Both the runner (live tool output) and the session monitor (transcript
//! re-parse) report the same credentials, so recording is idempotent: an
//! item is completed once, a result is written once, and `items_cracked`
//! follows the number of completed items. A recording cut short by a store
//! error is finished by the next report of the same credential.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::fs::{Area, Storage};
use crate::models::{CrackResult, Credential, ItemStatus, Job, JobItem, JobStatus};
use crate::store::{JobStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrackOutcome {
    /// New credential, persisted
    Recorded,
    /// Already known for this job; nothing changed
    Duplicate,
    /// Batch job with no matching target; only the result was written
    Unmatched,
}

#[derive(Clone)]
pub struct BatchCoordinator {
    store: Arc<dyn JobStore>,
    storage: Storage,
}

impl BatchCoordinator {
    pub fn new(store: Arc<dyn JobStore>, storage: Storage) -> Self {
        Self { store, storage }
    }

    pub fn record_crack(
        &self,
        job_id: Uuid,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<CrackOutcome, StoreError> {
        let job = self.store.get_job(job_id)?;
        let result = CrackResult::from_credential(job_id, credential, now);

        if !job.batch_mode {
            let inserted = self.store.insert_result(&result)?;
            if inserted {
                self.log_to_job(job_id, now, &format!("Password found for {}", credential.label()));
                tracing::info!(job_id = %job_id, target = %credential.label(), "Password found");
                return Ok(CrackOutcome::Recorded);
            }
            return Ok(CrackOutcome::Duplicate);
        }

        let items = self.store.items_for_job(job_id)?;
        let Some(item) = find_item(&items, credential) else {
            let inserted = self.store.insert_result(&result)?;
            if inserted {
                tracing::warn!(
                    job_id = %job_id,
                    target = %credential.label(),
                    "Cracked credential matches no batch item"
                );
                return Ok(CrackOutcome::Unmatched);
            }
            return Ok(CrackOutcome::Duplicate);
        };

        // Write-once result goes first; a retry resumes from the item
        let inserted = self.store.insert_result(&result)?;
        let password = credential.password.clone();
        let changed = self.store.update_item(job_id, item.id, &mut |item| {
            if item.status == ItemStatus::Completed {
                return false;
            }
            item.mark_completed(&password, now);
            true
        })?;

        let current = self.store.items_for_job(job_id)?;
        let completed = current
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .count() as u32;
        let label = item.essid.clone();
        let mut counted = false;
        self.store.update_job(job_id, &mut |job| {
            counted = job.sync_items_cracked(completed);
            if counted {
                job.append_log(now, &format!("Password found for {label}"));
            }
            Ok(())
        })?;

        if changed.is_none() && !inserted && !counted {
            return Ok(CrackOutcome::Duplicate);
        }
        tracing::info!(job_id = %job_id, essid = %item.essid, "Batch item cracked");

        let item = changed
            .or_else(|| current.into_iter().find(|i| i.id == item.id))
            .unwrap_or_else(|| item.clone());
        self.relocate_item(&item, Area::Completed);
        Ok(CrackOutcome::Recorded)
    }

    /// Fail every unfinished item and decide the job's final status.
    ///
    /// Returns `Completed` iff at least one item was cracked.
    pub fn finalize(&self, job_id: Uuid) -> Result<JobStatus, StoreError> {
        let job = self.store.get_job(job_id)?;
        for item in self.store.items_for_job(job_id)? {
            if item.status != ItemStatus::Pending {
                continue;
            }
            let failed = self.store.update_item(job_id, item.id, &mut |item| {
                if item.status != ItemStatus::Pending {
                    return false;
                }
                item.mark_failed();
                true
            })?;
            if let Some(item) = failed {
                self.relocate_item(&item, Area::Failed);
            }
        }
        Ok(final_status(&job))
    }

    fn relocate_item(&self, item: &JobItem, area: Area) {
        let Some(source) = item.source_file.as_ref() else {
            return;
        };
        match self.storage.relocate(source, area) {
            Ok(moved) => {
                let update = self.store.update_item(item.job_id, item.id, &mut |item| {
                    if item.source_file.as_ref() == Some(&moved) {
                        return false;
                    }
                    item.source_file = Some(moved.clone());
                    true
                });
                if let Err(e) = update {
                    tracing::warn!(job_id = %item.job_id, "Failed to record moved capture: {e}");
                }
            }
            Err(e) => tracing::warn!(
                job_id = %item.job_id,
                "Failed to move {} to {area}: {e}",
                source.display()
            ),
        }
    }

    fn log_to_job(&self, job_id: Uuid, now: DateTime<Utc>, message: &str) {
        let result = self.store.update_job(job_id, &mut |job| {
            job.append_log(now, message);
            Ok(())
        });
        if let Err(e) = result {
            tracing::warn!(job_id = %job_id, "Failed to append job log: {e}");
        }
    }
}

fn final_status(job: &Job) -> JobStatus {
    if job.items_cracked > 0 {
        JobStatus::Completed
    } else {
        JobStatus::Failed
    }
}

/// Match by bssid across all items first, then by essid.
fn find_item<'a>(items: &'a [JobItem], credential: &Credential) -> Option<&'a JobItem> {
    if let Some(bssid) = credential.bssid.as_deref() {
        if let Some(item) = items.iter().find(|i| i.matches(None, Some(bssid))) {
            return Some(item);
        }
    }
    let essid = credential.essid.as_deref()?;
    items.iter().find(|i| i.matches(Some(essid), None))
}
