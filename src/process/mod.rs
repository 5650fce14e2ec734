//! The single tracked cracking process.
//!
//! A worker runs at most one external process at a time. [`ProcessSlot`] owns
//! it so that the monitor and timeout tickers can stop it without holding a
//! reference to the runner. The process is started in its own process group
//! and signals go to the whole group.

use std::io;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use uuid::Uuid;
use wait_timeout::ChildExt;

/// Delay between SIGTERM and SIGKILL
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(1000);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("A process is already running for job {owner}")]
    Busy { owner: Uuid },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

/// What `kill_current_process` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// Nothing tracked, or it had already exited
    NoProcess,
    /// Exited within the grace delay after SIGTERM
    Terminated,
    /// Needed SIGKILL
    Killed,
}

#[derive(Debug)]
struct Tracked {
    owner: Uuid,
    child: Child,
    exit: Option<ExitStatus>,
}

#[derive(Debug, Clone)]
pub struct ProcessSlot {
    inner: Arc<Mutex<Option<Tracked>>>,
    grace: Duration,
}

impl Default for ProcessSlot {
    fn default() -> Self {
        Self::new(DEFAULT_KILL_GRACE)
    }
}

impl ProcessSlot {
    pub fn new(grace: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            grace,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Tracked>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn `command` on behalf of job `owner` and track it.
    ///
    /// Fails with [`ProcessError::Busy`] while another process is tracked.
    pub fn acquire(&self, command: &mut Command, owner: Uuid) -> Result<ProcessGuard, ProcessError> {
        let mut slot = self.lock();
        if let Some(tracked) = slot.as_ref() {
            return Err(ProcessError::Busy {
                owner: tracked.owner,
            });
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: command.get_program().to_string_lossy().into_owned(),
            source,
        })?;
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        tracing::debug!(pid, job_id = %owner, "Tracking process");
        *slot = Some(Tracked {
            owner,
            child,
            exit: None,
        });

        Ok(ProcessGuard {
            slot: self.clone(),
            pid,
            stdout,
            stderr,
        })
    }

    /// Job that owns the tracked process, if any.
    pub fn owner(&self) -> Option<Uuid> {
        self.lock().as_ref().map(|t| t.owner)
    }

    pub fn pid(&self) -> Option<u32> {
        self.lock().as_ref().map(|t| t.child.id())
    }

    /// SIGTERM the tracked process, wait the grace delay for it to exit, then
    /// SIGKILL. Signal errors are logged and never returned.
    pub fn kill_current_process(&self) -> KillOutcome {
        let mut slot = self.lock();
        let Some(tracked) = slot.as_mut() else {
            return KillOutcome::NoProcess;
        };
        if tracked.exit.is_some() {
            return KillOutcome::NoProcess;
        }
        if let Ok(Some(status)) = tracked.child.try_wait() {
            tracked.exit = Some(status);
            return KillOutcome::NoProcess;
        }

        let pid = tracked.child.id();
        tracing::info!(pid, job_id = %tracked.owner, "Terminating cracking process");
        signal_group(pid, Signal::Term);

        match tracked.child.wait_timeout(self.grace) {
            Ok(Some(status)) => {
                tracked.exit = Some(status);
                return KillOutcome::Terminated;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(pid, "Failed waiting for process after SIGTERM: {e}"),
        }

        tracing::warn!(pid, "Process ignored SIGTERM, sending SIGKILL");
        signal_group(pid, Signal::Kill);
        match tracked.child.wait() {
            Ok(status) => tracked.exit = Some(status),
            Err(e) => tracing::warn!(pid, "Failed to reap killed process: {e}"),
        }
        KillOutcome::Killed
    }
}

/// Handle held by whoever spawned the tracked process. Dropping it kills the
/// process if still running and frees the slot.
#[derive(Debug)]
pub struct ProcessGuard {
    slot: ProcessSlot,
    pid: u32,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ProcessGuard {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Take the piped output handles (if the command piped them).
    pub fn take_output(&mut self) -> (Option<ChildStdout>, Option<ChildStderr>) {
        (self.stdout.take(), self.stderr.take())
    }

    /// Block until the process exits, whether on its own or via
    /// `kill_current_process` from another thread.
    pub fn wait(&self) -> Result<ExitStatus, ProcessError> {
        loop {
            {
                let mut slot = self.slot.lock();
                match slot.as_mut() {
                    Some(tracked) if tracked.child.id() == self.pid => {
                        if let Some(status) = tracked.exit {
                            return Ok(status);
                        }
                        match tracked.child.try_wait() {
                            Ok(Some(status)) => {
                                tracked.exit = Some(status);
                                return Ok(status);
                            }
                            Ok(None) => {}
                            Err(source) => {
                                return Err(ProcessError::Wait {
                                    pid: self.pid,
                                    source,
                                })
                            }
                        }
                    }
                    _ => {
                        return Err(ProcessError::Wait {
                            pid: self.pid,
                            source: io::Error::new(io::ErrorKind::NotFound, "process no longer tracked"),
                        })
                    }
                }
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        let Some(mut tracked) = slot.take() else {
            return;
        };
        if tracked.child.id() != self.pid {
            *slot = Some(tracked);
            return;
        }
        if tracked.exit.is_none() {
            if let Ok(None) = tracked.child.try_wait() {
                signal_group(self.pid, Signal::Kill);
                let _ = tracked.child.wait();
            }
        }
        tracing::debug!(pid = self.pid, "Released process slot");
    }
}

enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal as NixSignal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        tracing::warn!(pid, "PID out of range, not signalling");
        return;
    };
    let sig = match signal {
        Signal::Term => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };
    match killpg(Pid::from_raw(raw), sig) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, "Failed to send {sig:?} to process group: {e}"),
    }
}

#[cfg(not(unix))]
fn signal_group(pid: u32, _signal: Signal) {
    tracing::warn!(pid, "Process signalling is only supported on unix");
}
