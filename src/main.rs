use anyhow::Result;
use clap::{Parser, Subcommand};
use sift::commands::jobs::{JobAction, NewJob};
use sift::commands::worker::WorkerOverrides;
use sift::commands::{check, dict, jobs, worker};
use sift::config::{default_data_dir, DeviceType};
use sift::models::JobStatus;
use sift::validation::{
    clap_job_name_validator, clap_job_ref_validator, clap_pattern_validator, clap_target_parser,
    TargetSpec,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Dictionary attack job engine for captured WiFi handshakes", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory holding config.toml, the job store and capture areas
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker: pick up pending jobs until Ctrl+C
    Worker {
        /// Compute device for the cracking tool
        #[arg(short, long, value_enum)]
        device: Option<DeviceType>,

        /// Path to the hashcat binary
        #[arg(long)]
        cracker: Option<PathBuf>,

        /// Fail jobs running longer than this many hours
        #[arg(long)]
        timeout_hours: Option<u64>,

        /// Pick higher-priority jobs first instead of oldest first
        #[arg(long)]
        priority: bool,
    },

    /// Check that the external tools are installed
    Check,

    /// List jobs
    Jobs {
        /// Only show jobs with this status
        #[arg(short, long)]
        status: Option<JobStatus>,
    },

    /// Manage individual jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Manage dictionaries
    Dict {
        #[command(subcommand)]
        command: DictCommands,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Queue a new job for an extracted hash file
    Add {
        /// Hash file in hashcat 22000 format
        hash_file: PathBuf,

        /// Display name (defaults to the hash file name)
        #[arg(short, long, value_parser = clap_job_name_validator)]
        name: Option<String>,

        /// Higher runs first when the worker uses priority ordering
        #[arg(short, long, default_value_t = 0)]
        priority: i32,

        /// Original capture, moved to completed/ or failed/ when the job ends
        #[arg(long)]
        capture: Option<PathBuf>,

        /// Batch target as ESSID or ESSID@BSSID (repeatable)
        #[arg(short, long = "target", value_parser = clap_target_parser)]
        targets: Vec<TargetSpec>,
    },

    /// Show job details, targets, attempts, results and log
    Show {
        #[arg(value_parser = clap_job_ref_validator)]
        id: String,
    },

    /// Stop a job; a running attack is killed
    Stop {
        #[arg(value_parser = clap_job_ref_validator)]
        id: String,
    },

    /// Pause a running job
    Pause {
        #[arg(value_parser = clap_job_ref_validator)]
        id: String,
    },

    /// Put a failed, stopped or paused job back in the queue
    Requeue {
        #[arg(value_parser = clap_job_ref_validator)]
        id: String,
    },
}

#[derive(Subcommand)]
enum DictCommands {
    /// Register dictionary files found in the dictionaries directory
    Sync {
        /// File name pattern to match
        #[arg(short, long, default_value = "*", value_parser = clap_pattern_validator)]
        pattern: String,
    },

    /// List registered dictionaries in attempt order
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sift=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);

    match cli.command {
        Commands::Worker {
            device,
            cracker,
            timeout_hours,
            priority,
        } => worker::execute(
            &data_dir,
            WorkerOverrides {
                device,
                cracker_path: cracker,
                job_timeout_hours: timeout_hours,
                priority_ordering: priority,
            },
        ),
        Commands::Check => check::execute(&data_dir),
        Commands::Jobs { status } => jobs::list(&data_dir, status),
        Commands::Job { command } => match command {
            JobCommands::Add {
                hash_file,
                name,
                priority,
                capture,
                targets,
            } => jobs::add(
                &data_dir,
                NewJob {
                    hash_file,
                    name,
                    priority,
                    capture,
                    targets,
                },
            ),
            JobCommands::Show { id } => jobs::show(&data_dir, &id),
            JobCommands::Stop { id } => jobs::transition(&data_dir, &id, JobAction::Stop),
            JobCommands::Pause { id } => jobs::transition(&data_dir, &id, JobAction::Pause),
            JobCommands::Requeue { id } => jobs::transition(&data_dir, &id, JobAction::Requeue),
        },
        Commands::Dict { command } => match command {
            DictCommands::Sync { pattern } => dict::sync(&data_dir, &pattern),
            DictCommands::List => dict::list(&data_dir),
        },
    }
}
