use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A wordlist known to the worker. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dictionary {
    pub id: Uuid,
    pub name: String,
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

impl Dictionary {
    pub fn new(name: impl Into<String>, path: PathBuf, size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            path,
            size,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptStatus::Completed => write!(f, "completed"),
            AttemptStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of running one dictionary against a job. Append-only history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDictionary {
    pub job_id: Uuid,
    pub dictionary_id: Uuid,
    pub dictionary_name: String,
    pub run_id: Uuid,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}
