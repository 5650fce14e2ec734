//! Session monitor
//!
//! Periodically reconciles every processing job with its external session:
//! progress, newly cracked credentials, and terminal statuses reported by the
//! tool. A session whose output stops changing for longer than the stale
//! threshold is treated as hung: the job fails and the process is killed.

mod probe;
mod status;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::{Job, JobStatus};
use crate::orchestrator::batch::BatchCoordinator;
use crate::orchestrator::recovery::has_timed_out;
use crate::process::ProcessSlot;
use crate::store::JobStore;

pub use probe::{snapshot_from_transcript, ProbeError, SessionProbe, SessionSnapshot, TranscriptProbe};
pub use status::map_session_status;

pub const STALE_SESSION_ERROR: &str = "session timed out";

/// What a tick did for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Updated,
    Finished(JobStatus),
    Stale,
}

#[derive(Debug, Clone)]
struct TrackedSession {
    job_id: Uuid,
    fingerprint: Option<u64>,
    last_change: DateTime<Utc>,
}

pub struct SessionMonitor {
    store: Arc<dyn JobStore>,
    probe: Box<dyn SessionProbe>,
    batch: BatchCoordinator,
    slot: ProcessSlot,
    stale_threshold: Duration,
    sessions: HashMap<String, TrackedSession>,
    shutdown: Arc<AtomicBool>,
}

impl SessionMonitor {
    pub fn new(
        store: Arc<dyn JobStore>,
        probe: Box<dyn SessionProbe>,
        batch: BatchCoordinator,
        slot: ProcessSlot,
        stale_threshold: Duration,
    ) -> Self {
        Self {
            store,
            probe,
            batch,
            slot,
            stale_threshold,
            sessions: HashMap::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Once `flag` is set the monitor stops deciding job statuses. A tool
    /// killed during worker shutdown reports an abort, and that job must
    /// stay `processing` for orphan recovery.
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn tracked_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<(Uuid, SessionOutcome)> {
        if self.shutting_down() {
            return Vec::new();
        }
        let jobs = match self.store.jobs_with_status(JobStatus::Processing) {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!("Session monitor could not list jobs: {e}");
                return Vec::new();
            }
        };

        let live: Vec<(Job, String)> = jobs
            .into_iter()
            .filter_map(|job| {
                let session = job.session.clone()?;
                Some((job, session))
            })
            .collect();
        self.sessions
            .retain(|session, tracked| live.iter().any(|(j, s)| s == session && j.id == tracked.job_id));

        let mut outcomes = Vec::new();
        for (job, session) in &live {
            let outcome = self.check_session(job, session, now);
            outcomes.push((job.id, outcome));
        }
        self.kill_abandoned(&live, &outcomes);
        outcomes
    }

    /// Kill a running tool whose job was stopped, paused or finished from
    /// outside the runner.
    fn kill_abandoned(&self, live: &[(Job, String)], outcomes: &[(Uuid, SessionOutcome)]) {
        if self.shutting_down() {
            return;
        }
        let Some(owner) = self.slot.owner() else {
            return;
        };
        let still_processing = live.iter().any(|(job, _)| job.id == owner)
            && outcomes
                .iter()
                .any(|(id, outcome)| *id == owner && *outcome == SessionOutcome::Updated);
        if still_processing {
            return;
        }
        match self.store.get_job(owner) {
            Ok(job) if job.status == JobStatus::Processing => {}
            Ok(job) => {
                tracing::info!(job_id = %owner, status = %job.status, "Stopping tool for job no longer processing");
                self.slot.kill_current_process();
            }
            Err(e) => tracing::warn!(job_id = %owner, "Could not load job owning the tool: {e}"),
        }
    }

    fn check_session(&mut self, job: &Job, session: &str, now: DateTime<Utc>) -> SessionOutcome {
        let tracked = self
            .sessions
            .entry(session.to_string())
            .or_insert_with(|| TrackedSession {
                job_id: job.id,
                fingerprint: None,
                last_change: now,
            });

        let queried = self.probe.query(session);
        if self.shutdown.load(Ordering::SeqCst) {
            return SessionOutcome::Updated;
        }
        let snapshot = match queried {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(job_id = %job.id, session, "Session query failed: {e}");
                self.fail_stale(job.id, session, now);
                return SessionOutcome::Stale;
            }
        };

        if tracked.fingerprint != Some(snapshot.fingerprint) {
            tracked.fingerprint = Some(snapshot.fingerprint);
            tracked.last_change = now;
        } else if has_timed_out(tracked.last_change, now, self.stale_threshold) {
            tracing::warn!(job_id = %job.id, session, "No session output since {}", tracked.last_change);
            self.fail_stale(job.id, session, now);
            return SessionOutcome::Stale;
        }

        for credential in &snapshot.cracked {
            if let Err(e) = self.batch.record_crack(job.id, credential, now) {
                tracing::warn!(job_id = %job.id, "Failed to record cracked credential: {e}");
            }
        }

        let mapped = map_session_status(&snapshot.status);
        if mapped.is_terminal() {
            let shutdown = self.shutdown.clone();
            let applied = self.store.update_job(job.id, &mut |job| {
                if job.status != JobStatus::Processing || shutdown.load(Ordering::SeqCst) {
                    return Ok(());
                }
                apply_progress(job, &snapshot);
                if mapped == JobStatus::Failed {
                    job.try_fail(&format!("session reported {}", snapshot.status), now)?;
                } else {
                    job.try_finish(mapped, now)?;
                    job.append_log(now, &format!("Session {session} reported {mapped}"));
                }
                Ok(())
            });
            return match applied {
                Ok(stored) if stored.status == mapped => {
                    tracing::info!(job_id = %job.id, session, status = %mapped, "Session finished");
                    self.sessions.remove(session);
                    SessionOutcome::Finished(mapped)
                }
                Ok(_) => {
                    self.sessions.remove(session);
                    SessionOutcome::Updated
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, "Failed to apply session status: {e}");
                    SessionOutcome::Updated
                }
            };
        }

        let updated = self.store.update_job(job.id, &mut |job| {
            if job.status == JobStatus::Processing {
                apply_progress(job, &snapshot);
            }
            Ok(())
        });
        if let Err(e) = updated {
            tracing::warn!(job_id = %job.id, "Failed to update progress: {e}");
        }
        SessionOutcome::Updated
    }

    fn fail_stale(&mut self, job_id: Uuid, session: &str, now: DateTime<Utc>) {
        self.sessions.remove(session);
        let result = self.store.update_job(job_id, &mut |job| {
            if job.status == JobStatus::Processing {
                job.try_fail(STALE_SESSION_ERROR, now)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            tracing::warn!(job_id = %job_id, "Failed to mark stale job: {e}");
        }
        if self.slot.owner() == Some(job_id) {
            self.slot.kill_current_process();
        }
    }
}

fn apply_progress(job: &mut Job, snapshot: &SessionSnapshot) {
    if let Some(progress) = snapshot.progress {
        job.progress = progress;
    }
    if snapshot.speed.is_some() {
        job.speed = snapshot.speed.clone();
    }
    if snapshot.eta.is_some() {
        job.eta = snapshot.eta.clone();
    }
}
