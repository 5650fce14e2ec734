use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Completed => write!(f, "completed"),
            ItemStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One target network inside a batch job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub essid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bssid: Option<String>,
    /// Capture file for this target, relocated once the item is settled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cracked_at: Option<DateTime<Utc>>,
}

impl JobItem {
    pub fn new(job_id: Uuid, essid: impl Into<String>, bssid: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            essid: essid.into(),
            bssid,
            source_file: None,
            status: ItemStatus::Pending,
            password: None,
            cracked_at: None,
        }
    }

    pub fn with_source_file(mut self, path: PathBuf) -> Self {
        self.source_file = Some(path);
        self
    }

    /// Match a cracked credential against this target.
    ///
    /// BSSIDs compare on hex digits only, so `aa:bb:..` matches `aabb..`.
    pub fn matches(&self, essid: Option<&str>, bssid: Option<&str>) -> bool {
        if let (Some(mine), Some(theirs)) = (self.bssid.as_deref(), bssid) {
            if normalize_bssid(mine) == normalize_bssid(theirs) {
                return true;
            }
        }
        matches!(essid, Some(e) if e == self.essid)
    }

    pub fn mark_completed(&mut self, password: &str, at: DateTime<Utc>) {
        self.status = ItemStatus::Completed;
        self.password = Some(password.to_string());
        self.cracked_at = Some(at);
    }

    pub fn mark_failed(&mut self) {
        self.status = ItemStatus::Failed;
    }
}

pub fn normalize_bssid(bssid: &str) -> String {
    bssid
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
