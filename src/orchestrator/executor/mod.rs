//! Attack executor: one dictionary attempt against one hash file.
//!
//! Spawns the cracking tool through the shared [`ProcessSlot`], merges its
//! stdout and stderr into one line stream, appends every line to the session
//! transcript and forwards recognized events to an [`AttemptObserver`] in the
//! order they were received.

pub mod parser;
mod tools;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use uuid::Uuid;

use crate::config::{DeviceType, WorkerConfig};
use crate::fs::Storage;
use crate::models::Credential;
use crate::process::{ProcessError, ProcessSlot};

pub use parser::{
    parse_transcript, EventStream, LineParser, ProgressUpdate, ToolEvent, ToolStatus,
};
pub use tools::{check_tools, require_tools, ToolCheck};

/// hashcat mode for WPA-PBKDF2-PMKID+EAPOL
pub const HASH_MODE: &str = "22000";

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error(transparent)]
    Spawn(#[from] ProcessError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExecutorError {
    /// Errors that make every further attempt pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutorError::ToolUnavailable { .. })
    }
}

/// Receives parsed tool events while an attempt runs.
pub trait AttemptObserver {
    fn on_progress(&mut self, progress: &ProgressUpdate);
    fn on_cracked(&mut self, credential: &Credential);
    fn on_log(&mut self, message: &str);
}

#[derive(Debug, Clone)]
pub struct AttemptRequest<'a> {
    pub job_id: Uuid,
    pub hash_file: &'a Path,
    pub dictionary: &'a Path,
    pub session: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttemptReport {
    pub success: bool,
    pub error: Option<String>,
    pub cracked: usize,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct AttackExecutor {
    cracker: PathBuf,
    device: DeviceType,
    status_timer_secs: u64,
    storage: Storage,
    slot: ProcessSlot,
}

impl AttackExecutor {
    pub fn new(config: &WorkerConfig, slot: ProcessSlot) -> Self {
        Self {
            cracker: config.cracker_path.clone(),
            device: config.device,
            status_timer_secs: config.status_timer_secs,
            storage: Storage::from_config(config),
            slot,
        }
    }

    pub fn slot(&self) -> &ProcessSlot {
        &self.slot
    }

    pub fn transcript_path(&self, session: &str) -> PathBuf {
        self.storage.session_transcript(session)
    }

    /// The full tool invocation for one attempt.
    pub fn command(&self, request: &AttemptRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.cracker);
        cmd.arg("-m")
            .arg(HASH_MODE)
            .arg("-a")
            .arg("0")
            .arg(request.hash_file)
            .arg(request.dictionary)
            .arg("--session")
            .arg(request.session)
            .arg("--status")
            .arg("--status-timer")
            .arg(self.status_timer_secs.to_string())
            .arg("--potfile-path")
            .arg(self.storage.session_potfile(request.session))
            .arg("-D")
            .arg(self.device.hashcat_device_types());
        cmd
    }

    /// Run one attempt to completion. Blocks until the tool exits.
    pub fn run(
        &self,
        request: &AttemptRequest<'_>,
        observer: &mut dyn AttemptObserver,
    ) -> Result<AttemptReport, ExecutorError> {
        let transcript_path = self.transcript_path(request.session);
        let mut transcript = open_transcript(&transcript_path)?;

        let mut command = self.command(request);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::info!(
            job_id = %request.job_id,
            session = request.session,
            dictionary = %request.dictionary.display(),
            "Starting attempt"
        );

        let mut guard = self
            .slot
            .acquire(&mut command, request.job_id)
            .map_err(|e| self.classify_spawn_error(e))?;

        let (tx, rx) = mpsc::channel::<String>();
        let (stdout, stderr) = guard.take_output();
        let mut readers = Vec::new();
        if let Some(out) = stdout {
            readers.push(forward_lines(out, tx.clone()));
        }
        if let Some(err) = stderr {
            readers.push(forward_lines(err, tx.clone()));
        }
        drop(tx);

        let mut parser = LineParser::new();
        let mut report = AttemptReport::default();
        let mut final_status: Option<ToolStatus> = None;
        let mut transcript_ok = true;

        for line in rx {
            if transcript_ok {
                if let Err(e) = writeln!(transcript, "{line}") {
                    tracing::warn!(
                        session = request.session,
                        "Failed to write transcript {}: {e}",
                        transcript_path.display()
                    );
                    transcript_ok = false;
                }
            }

            match parser.feed(&line) {
                Some(ToolEvent::Progress(progress)) => observer.on_progress(&progress),
                Some(ToolEvent::Cracked(credential)) => {
                    report.cracked += 1;
                    observer.on_cracked(&credential);
                }
                Some(ToolEvent::Status(status)) if status.is_terminal() => {
                    observer.on_log(&format!("Status: {status}"));
                    final_status = Some(status);
                }
                Some(ToolEvent::Status(_)) | None => {}
            }
        }

        for reader in readers {
            let _ = reader.join();
        }

        let exit = guard.wait()?;
        report.exit_code = exit.code();
        report.success = report.cracked > 0 || final_status == Some(ToolStatus::Cracked);
        if !report.success {
            report.error = Some(failure_reason(final_status.as_ref(), report.exit_code));
        }

        tracing::info!(
            job_id = %request.job_id,
            session = request.session,
            success = report.success,
            exit_code = ?report.exit_code,
            "Attempt finished"
        );
        Ok(report)
    }

    fn classify_spawn_error(&self, err: ProcessError) -> ExecutorError {
        match err {
            ProcessError::Spawn { program, source }
                if matches!(
                    source.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) =>
            {
                ExecutorError::ToolUnavailable {
                    tool: program,
                    reason: source.to_string(),
                }
            }
            other => ExecutorError::Spawn(other),
        }
    }
}

fn open_transcript(path: &Path) -> Result<File, ExecutorError> {
    let io_err = |source| ExecutorError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)
}

/// Pump lines from one pipe into the merged channel.
fn forward_lines<R: Read + Send + 'static>(
    pipe: R,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn failure_reason(status: Option<&ToolStatus>, exit_code: Option<i32>) -> String {
    match (status, exit_code) {
        (Some(ToolStatus::Exhausted), _) => "dictionary exhausted".to_string(),
        (Some(ToolStatus::Aborted | ToolStatus::Quit), _) => "attempt aborted".to_string(),
        (Some(ToolStatus::Error), Some(code)) => format!("tool error (exit code {code})"),
        (_, Some(0)) => "no password found".to_string(),
        (_, Some(code)) => format!("exited with code {code}"),
        (_, None) => "terminated by signal".to_string(),
    }
}
