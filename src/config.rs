//! Worker configuration
//!
//! Loaded from `<data_dir>/config.toml` when present. Every field has a
//! default, and CLI flags override the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the config file inside the data directory
pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_JOB_TIMEOUT_HOURS: u64 = 24;
/// One year
pub const MAX_JOB_TIMEOUT_HOURS: u64 = 24 * 365;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_TIMEOUT_CHECK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_STALE_SESSION_SECS: u64 = 30;
pub const DEFAULT_KILL_GRACE_MILLIS: u64 = 1000;
pub const DEFAULT_STATUS_TIMER_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Compute device handed to the cracking tool.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Cpu,
    Nvidia,
    Amd,
    Intel,
}

impl DeviceType {
    /// hashcat `-D` device-type selector: 1 = CPU, 2 = GPU
    pub fn hashcat_device_types(&self) -> &'static str {
        match self {
            DeviceType::Cpu => "1",
            DeviceType::Nvidia | DeviceType::Amd | DeviceType::Intel => "2",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "cpu"),
            DeviceType::Nvidia => write!(f, "nvidia"),
            DeviceType::Amd => write!(f, "amd"),
            DeviceType::Intel => write!(f, "intel"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub data_dir: PathBuf,
    /// Captures and extracted hash files waiting for a job (pcap storage)
    pub pending_dir: Option<PathBuf>,
    pub dictionaries_dir: Option<PathBuf>,
    pub completed_dir: Option<PathBuf>,
    pub failed_dir: Option<PathBuf>,
    pub sessions_dir: Option<PathBuf>,
    pub cracker_path: PathBuf,
    pub extractor_path: PathBuf,
    pub device: DeviceType,
    pub job_timeout_hours: u64,
    pub poll_interval_secs: u64,
    pub monitor_interval_secs: u64,
    pub timeout_check_interval_secs: u64,
    pub stale_session_secs: u64,
    pub kill_grace_millis: u64,
    pub status_timer_secs: u64,
    /// Pick higher-priority pending jobs first instead of strict FIFO
    pub priority_ordering: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pending_dir: None,
            dictionaries_dir: None,
            completed_dir: None,
            failed_dir: None,
            sessions_dir: None,
            cracker_path: PathBuf::from("hashcat"),
            extractor_path: PathBuf::from("hcxpcapngtool"),
            device: DeviceType::Cpu,
            job_timeout_hours: DEFAULT_JOB_TIMEOUT_HOURS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
            timeout_check_interval_secs: DEFAULT_TIMEOUT_CHECK_INTERVAL_SECS,
            stale_session_secs: DEFAULT_STALE_SESSION_SECS,
            kill_grace_millis: DEFAULT_KILL_GRACE_MILLIS,
            status_timer_secs: DEFAULT_STATUS_TIMER_SECS,
            priority_ordering: false,
        }
    }
}

/// `$XDG_DATA_HOME/sift` (or platform equivalent), falling back to `.sift`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("sift"))
        .unwrap_or_else(|| PathBuf::from(".sift"))
}

impl WorkerConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load `<data_dir>/config.toml`, or defaults if the file is absent.
    ///
    /// The `data_dir` argument always wins over a `data_dir` key in the file.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            toml::from_str::<WorkerConfig>(&content)
                .map_err(|source| ConfigError::Parse { path, source })?
        } else {
            WorkerConfig::default()
        };
        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_timeout_hours == 0 {
            return Err(ConfigError::Invalid(
                "job_timeout_hours must be a positive integer".to_string(),
            ));
        }
        if self.job_timeout_hours > MAX_JOB_TIMEOUT_HOURS {
            return Err(ConfigError::Invalid(format!(
                "job_timeout_hours must be at most {MAX_JOB_TIMEOUT_HOURS}"
            )));
        }
        for (name, value) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("monitor_interval_secs", self.monitor_interval_secs),
            ("timeout_check_interval_secs", self.timeout_check_interval_secs),
            ("stale_session_secs", self.stale_session_secs),
            ("status_timer_secs", self.status_timer_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.area_dir(&self.pending_dir, "pending")
    }

    pub fn dictionaries_dir(&self) -> PathBuf {
        self.area_dir(&self.dictionaries_dir, "dictionaries")
    }

    pub fn completed_dir(&self) -> PathBuf {
        self.area_dir(&self.completed_dir, "completed")
    }

    pub fn failed_dir(&self) -> PathBuf {
        self.area_dir(&self.failed_dir, "failed")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.area_dir(&self.sessions_dir, "sessions")
    }

    fn area_dir(&self, configured: &Option<PathBuf>, name: &str) -> PathBuf {
        configured
            .clone()
            .unwrap_or_else(|| self.data_dir.join(name))
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_hours.saturating_mul(3600))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn timeout_check_interval(&self) -> Duration {
        Duration::from_secs(self.timeout_check_interval_secs)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_session_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_millis)
    }
}
