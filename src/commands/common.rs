//! Helpers shared by the command implementations.

use anyhow::{bail, Context, Result};
use colored::{ColoredString, Colorize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::fs::Storage;
use crate::models::{Job, JobStatus};
use crate::store::{FileStore, JobStore};

/// Configuration, store and storage areas for one data directory.
pub struct Workspace {
    pub config: WorkerConfig,
    pub store: Arc<FileStore>,
    pub storage: Storage,
}

impl Workspace {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let config = WorkerConfig::load(data_dir)
            .with_context(|| format!("Failed to load configuration from {}", data_dir.display()))?;
        Self::with_config(config)
    }

    pub fn with_config(config: WorkerConfig) -> Result<Self> {
        let store = FileStore::open(config.store_dir())
            .with_context(|| format!("Failed to open job store in {}", config.store_dir().display()))?;
        let storage = Storage::from_config(&config);
        storage
            .ensure()
            .context("Failed to create storage directories")?;
        Ok(Self {
            config,
            store: Arc::new(store),
            storage,
        })
    }
}

/// Find a job by full id or by an unambiguous id prefix.
pub fn resolve_job(store: &dyn JobStore, reference: &str) -> Result<Job> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return store
            .get_job(id)
            .with_context(|| format!("No job with id {id}"));
    }

    let reference = reference.to_lowercase();
    let mut matches: Vec<Job> = store
        .list_jobs()
        .context("Failed to list jobs")?
        .into_iter()
        .filter(|job| job.id.to_string().starts_with(&reference))
        .collect();
    match matches.len() {
        0 => bail!("No job matches '{reference}'"),
        1 => Ok(matches.remove(0)),
        n => bail!("'{reference}' is ambiguous ({n} jobs match); use more characters"),
    }
}

pub fn colored_status(status: JobStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        JobStatus::Pending => label.yellow(),
        JobStatus::Processing => label.cyan().bold(),
        JobStatus::Paused => label.blue(),
        JobStatus::Stopped => label.dimmed(),
        JobStatus::Completed => label.green().bold(),
        JobStatus::Failed => label.red().bold(),
    }
}

/// Truncate for table output, appending an ellipsis when shortened.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
