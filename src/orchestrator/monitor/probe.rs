//! Session status queries.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::fs::Storage;
use crate::models::Credential;
use crate::orchestrator::executor::{parse_transcript, ToolEvent, ToolStatus};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Failed to read session transcript {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Point-in-time view of an external cracking session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    /// Status word, see [`super::map_session_status`]
    pub status: String,
    pub progress: Option<f64>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub cracked: Vec<Credential>,
    /// Changes whenever the session produced new output
    pub fingerprint: u64,
}

pub trait SessionProbe: Send + Sync {
    fn query(&self, session: &str) -> Result<SessionSnapshot, ProbeError>;
}

/// Reads the session transcript written by the executor and re-parses it.
#[derive(Debug, Clone)]
pub struct TranscriptProbe {
    storage: Storage,
}

impl TranscriptProbe {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

impl SessionProbe for TranscriptProbe {
    fn query(&self, session: &str) -> Result<SessionSnapshot, ProbeError> {
        let path = self.storage.session_transcript(session);
        let transcript = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(ProbeError::Io { path, source }),
        };
        Ok(snapshot_from_transcript(&transcript))
    }
}

/// Derive a snapshot from a full transcript.
pub fn snapshot_from_transcript(transcript: &str) -> SessionSnapshot {
    let mut snapshot = SessionSnapshot {
        status: "queued".to_string(),
        fingerprint: transcript.len() as u64,
        ..SessionSnapshot::default()
    };

    for event in parse_transcript(transcript) {
        match event {
            ToolEvent::Status(status) => snapshot.status = status_word(&status),
            ToolEvent::Progress(progress) => {
                snapshot.progress = Some(progress.percent);
                snapshot.speed = progress.speed;
                snapshot.eta = progress.eta;
            }
            ToolEvent::Cracked(credential) => {
                if !snapshot.cracked.contains(&credential) {
                    snapshot.cracked.push(credential);
                }
            }
        }
    }
    snapshot
}

/// A session spans several dictionaries, so an exhausted dictionary still
/// counts as processing.
fn status_word(status: &ToolStatus) -> String {
    match status {
        ToolStatus::Initializing
        | ToolStatus::Autotuning
        | ToolStatus::Selftest
        | ToolStatus::Running
        | ToolStatus::Exhausted => "processing".to_string(),
        ToolStatus::Paused => "paused".to_string(),
        ToolStatus::Cracked => "completed".to_string(),
        ToolStatus::Aborted | ToolStatus::Quit => "stopped".to_string(),
        ToolStatus::Error => "failed".to_string(),
        ToolStatus::Other(word) => word.to_ascii_lowercase(),
    }
}
