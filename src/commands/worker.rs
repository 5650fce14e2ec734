//! `sift worker`: run the job engine in the foreground until Ctrl-C.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::common::Workspace;
use crate::clock::SystemClock;
use crate::config::{DeviceType, WorkerConfig};
use crate::orchestrator::executor::require_tools;
use crate::orchestrator::Worker;

/// Command-line values that win over `config.toml`.
#[derive(Debug, Clone, Default)]
pub struct WorkerOverrides {
    pub device: Option<DeviceType>,
    pub cracker_path: Option<PathBuf>,
    pub job_timeout_hours: Option<u64>,
    pub priority_ordering: bool,
}

impl WorkerOverrides {
    pub fn apply(&self, config: &mut WorkerConfig) {
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(path) = &self.cracker_path {
            config.cracker_path = path.clone();
        }
        if let Some(hours) = self.job_timeout_hours {
            config.job_timeout_hours = hours;
        }
        if self.priority_ordering {
            config.priority_ordering = true;
        }
    }
}

pub fn execute(data_dir: &Path, overrides: WorkerOverrides) -> Result<()> {
    let mut config = WorkerConfig::load(data_dir)
        .with_context(|| format!("Failed to load configuration from {}", data_dir.display()))?;
    overrides.apply(&mut config);
    config.validate()?;

    require_tools(&config)?;

    let workspace = Workspace::with_config(config.clone())?;
    let worker = Worker::new(config.clone(), workspace.store, Arc::new(SystemClock))
        .context("Failed to set up worker")?;

    let handle = worker.handle();
    ctrlc::set_handler(move || {
        println!("\n{} Shutting down...", "→".cyan().bold());
        handle.shutdown();
    })
    .context("Failed to set Ctrl+C handler")?;

    println!(
        "{} Worker started (device {}, timeout {}h, data {})",
        "✓".green().bold(),
        config.device,
        config.job_timeout_hours,
        config.data_dir.display()
    );
    println!("{} Press Ctrl+C to stop", "─".dimmed());

    worker.run().context("Worker failed")?;

    println!("{} Worker stopped", "✓".green().bold());
    Ok(())
}
