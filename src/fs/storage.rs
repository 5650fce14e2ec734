//! Storage areas for captures, dictionaries and session artifacts.
//!
//! Captures start in `pending/` and end up in `completed/` or `failed/` once
//! their job (or batch item) is settled. Areas may live on different
//! filesystems, so moves fall back to copy + delete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::WorkerConfig;

/// The fixed areas a capture can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Pending,
    Dictionaries,
    Completed,
    Failed,
    Sessions,
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Area::Pending => write!(f, "pending"),
            Area::Dictionaries => write!(f, "dictionaries"),
            Area::Completed => write!(f, "completed"),
            Area::Failed => write!(f, "failed"),
            Area::Sessions => write!(f, "sessions"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Storage {
    pending: PathBuf,
    dictionaries: PathBuf,
    completed: PathBuf,
    failed: PathBuf,
    sessions: PathBuf,
}

impl Storage {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            pending: config.pending_dir(),
            dictionaries: config.dictionaries_dir(),
            completed: config.completed_dir(),
            failed: config.failed_dir(),
            sessions: config.sessions_dir(),
        }
    }

    /// All areas under a single root, as `<root>/<area>`.
    pub fn under(root: &Path) -> Self {
        Self {
            pending: root.join("pending"),
            dictionaries: root.join("dictionaries"),
            completed: root.join("completed"),
            failed: root.join("failed"),
            sessions: root.join("sessions"),
        }
    }

    pub fn dir(&self, area: Area) -> &Path {
        match area {
            Area::Pending => &self.pending,
            Area::Dictionaries => &self.dictionaries,
            Area::Completed => &self.completed,
            Area::Failed => &self.failed,
            Area::Sessions => &self.sessions,
        }
    }

    /// Create every area directory.
    pub fn ensure(&self) -> io::Result<()> {
        for area in [
            Area::Pending,
            Area::Dictionaries,
            Area::Completed,
            Area::Failed,
            Area::Sessions,
        ] {
            fs::create_dir_all(self.dir(area))?;
        }
        Ok(())
    }

    /// Move `path` into `area`, keeping its file name.
    pub fn relocate(&self, path: &Path, area: Area) -> io::Result<PathBuf> {
        let file_name = path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a file path: {}", path.display()),
            )
        })?;
        let dir = self.dir(area);
        fs::create_dir_all(dir)?;
        let target = dir.join(file_name);
        if target == path {
            return Ok(target);
        }
        move_file(path, &target)?;
        Ok(target)
    }

    pub fn session_transcript(&self, session: &str) -> PathBuf {
        self.sessions.join(format!("{session}.log"))
    }

    pub fn session_potfile(&self, session: &str) -> PathBuf {
        self.sessions.join(format!("{session}.potfile"))
    }
}

/// Rename `from` to `to`, copying then deleting when the rename crosses
/// filesystems.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_e: &io::Error) -> bool {
    false
}
