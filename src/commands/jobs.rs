//! Job commands: list, show, add, and the user-driven status writes.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use colored::Colorize;
use std::path::{Path, PathBuf};

use super::common::{colored_status, resolve_job, truncate, Workspace};
use crate::models::{AttemptStatus, ItemStatus, Job, JobItem, JobStatus};
use crate::store::JobStore;
use crate::validation::TargetSpec;

/// Arguments for `sift job add`.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub hash_file: PathBuf,
    pub name: Option<String>,
    pub priority: i32,
    pub capture: Option<PathBuf>,
    pub targets: Vec<TargetSpec>,
}

/// User action on a job's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Stop,
    Pause,
    Requeue,
}

impl JobAction {
    fn past_tense(&self) -> &'static str {
        match self {
            JobAction::Stop => "stopped",
            JobAction::Pause => "paused",
            JobAction::Requeue => "requeued",
        }
    }
}

pub fn list(data_dir: &Path, status: Option<JobStatus>) -> Result<()> {
    let workspace = Workspace::open(data_dir)?;
    let mut jobs = workspace.store.list_jobs().context("Failed to list jobs")?;
    if let Some(status) = status {
        jobs.retain(|job| job.status == status);
    }
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    if jobs.is_empty() {
        println!("{} No jobs", "─".dimmed());
        return Ok(());
    }

    println!(
        "{:<10} {:<24} {:<12} {:>7} {:<20} {}",
        "ID".bold(),
        "NAME".bold(),
        "STATUS".bold(),
        "PROG".bold(),
        "DICTIONARY".bold(),
        "CREATED".bold()
    );
    for job in &jobs {
        let name = if job.batch_mode {
            format!("{} [{}/{}]", job.name, job.items_cracked, job.items_total)
        } else {
            job.name.clone()
        };
        println!(
            "{:<10} {:<24} {:<12} {:>6.1}% {:<20} {}",
            job.short_id(),
            truncate(&name, 24),
            colored_status(job.status),
            job.progress,
            truncate(job.current_dictionary.as_deref().unwrap_or("-"), 20),
            format_time(job.created_at).dimmed()
        );
    }
    Ok(())
}

pub fn show(data_dir: &Path, reference: &str) -> Result<()> {
    let workspace = Workspace::open(data_dir)?;
    let store = workspace.store.as_ref();
    let job = resolve_job(store, reference)?;

    println!("{} {}", "Job".bold(), job.id);
    println!("  Name:       {}", job.name);
    println!("  Status:     {}", colored_status(job.status));
    println!("  Priority:   {}", job.priority);
    println!("  Hash file:  {}", job.hash_file.display());
    if let Some(source) = &job.source_file {
        println!("  Capture:    {}", source.display());
    }
    println!("  Progress:   {:.1}%", job.progress);
    if let Some(dictionary) = &job.current_dictionary {
        println!("  Dictionary: {dictionary}");
    }
    if let Some(speed) = &job.speed {
        println!("  Speed:      {speed}");
    }
    if let Some(eta) = &job.eta {
        println!("  ETA:        {eta}");
    }
    println!("  Created:    {}", format_time(job.created_at));
    if let Some(started) = job.started_at {
        println!("  Started:    {}", format_time(started));
    }
    if let Some(completed) = job.completed_at {
        println!("  Finished:   {}", format_time(completed));
    }
    if let Some(error) = &job.error {
        println!("  Error:      {}", error.red());
    }

    if job.batch_mode {
        let items = store.items_for_job(job.id).context("Failed to load batch items")?;
        println!();
        println!(
            "{} ({}/{} cracked)",
            "Targets".bold(),
            job.items_cracked,
            job.items_total
        );
        for item in &items {
            print_item(item);
        }
    }

    let attempts = store
        .attempts_for_job(job.id)
        .context("Failed to load dictionary attempts")?;
    if !attempts.is_empty() {
        println!();
        println!("{}", "Dictionaries".bold());
        for attempt in &attempts {
            let marker = match attempt.status {
                AttemptStatus::Completed => "✓".green().bold(),
                AttemptStatus::Failed => "✗".red().bold(),
            };
            print!("  {marker} {}", attempt.dictionary_name);
            if let Some(error) = &attempt.error {
                print!(" {}", format!("({error})").dimmed());
            }
            println!();
        }
    }

    let results = store.results_for_job(job.id).context("Failed to load results")?;
    if !results.is_empty() {
        println!();
        println!("{}", "Cracked".bold());
        for result in &results {
            let target = result
                .essid
                .as_deref()
                .or(result.bssid.as_deref())
                .unwrap_or("?");
            println!("  {} {target}: {}", "→".cyan().bold(), result.password.green());
        }
    }

    if !job.logs.is_empty() {
        println!();
        println!("{}", "Log".bold());
        for line in job.logs.lines() {
            println!("  {}", line.dimmed());
        }
    }
    Ok(())
}

fn print_item(item: &JobItem) {
    let marker = match item.status {
        ItemStatus::Completed => "✓".green().bold(),
        ItemStatus::Failed => "✗".red().bold(),
        ItemStatus::Pending => "·".dimmed(),
    };
    print!("  {marker} {}", item.essid);
    if let Some(bssid) = &item.bssid {
        print!(" ({bssid})");
    }
    if let Some(password) = &item.password {
        print!(": {}", password.green());
    }
    println!();
}

pub fn add(data_dir: &Path, new_job: NewJob) -> Result<()> {
    let workspace = Workspace::open(data_dir)?;
    let job = add_job(workspace.store.as_ref(), new_job, Utc::now())?;
    println!(
        "{} Queued job {} ({})",
        "✓".green().bold(),
        job.short_id(),
        job.name
    );
    Ok(())
}

/// Record a new pending job, plus one item per target for batch jobs.
pub fn add_job(store: &dyn JobStore, new_job: NewJob, now: DateTime<Utc>) -> Result<Job> {
    if !new_job.hash_file.is_file() {
        bail!("Hash file not found: {}", new_job.hash_file.display());
    }
    let hash_file = new_job
        .hash_file
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", new_job.hash_file.display()))?;
    let name = new_job.name.unwrap_or_else(|| {
        hash_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "job".to_string())
    });

    let mut job = if new_job.targets.is_empty() {
        Job::new(name, hash_file, now)
    } else {
        Job::new_batch(name, hash_file, new_job.targets.len() as u32, now)
    };
    job = job.with_priority(new_job.priority);
    if let Some(capture) = new_job.capture {
        job = job.with_source_file(capture);
    }
    job.append_log(now, "Job queued");
    store.save_job(&job).context("Failed to save job")?;

    for target in new_job.targets {
        let item = JobItem::new(job.id, target.essid, target.bssid);
        store.save_item(&item).context("Failed to save batch target")?;
    }
    Ok(job)
}

pub fn transition(data_dir: &Path, reference: &str, action: JobAction) -> Result<()> {
    let workspace = Workspace::open(data_dir)?;
    let job = apply_action(workspace.store.as_ref(), reference, action, Utc::now())?;
    println!(
        "{} Job {} {} ({})",
        "✓".green().bold(),
        job.short_id(),
        action.past_tense(),
        colored_status(job.status)
    );
    Ok(())
}

/// Write a user-requested status. A running worker notices on its next
/// check and kills the tool.
pub fn apply_action(
    store: &dyn JobStore,
    reference: &str,
    action: JobAction,
    now: DateTime<Utc>,
) -> Result<Job> {
    let job = resolve_job(store, reference)?;
    store
        .update_job(job.id, &mut |job| {
            match action {
                JobAction::Stop => {
                    job.try_finish(JobStatus::Stopped, now)?;
                    job.append_log(now, "Stopped by user");
                }
                JobAction::Pause => {
                    job.try_set_status(JobStatus::Paused)?;
                    job.append_log(now, "Paused by user");
                }
                JobAction::Requeue => job.try_requeue(now)?,
            }
            Ok(())
        })
        .with_context(|| format!("Cannot mark job {} {}", job.short_id(), action.past_tense()))
}

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
