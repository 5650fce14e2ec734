use super::types::JobStatus;

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid job status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobStatus {
    /// Check if transitioning from the current status to the new status is valid.
    ///
    /// Valid transitions:
    /// - `Pending` -> `Processing` (scheduler picks the job)
    /// - `Processing` -> `Completed` | `Failed` | `Paused` | `Stopped`
    /// - `Processing` -> `Pending` (orphan reset after a worker crash)
    /// - `Paused` -> `Pending` | `Stopped`
    /// - `Failed` | `Stopped` -> `Pending` (requeue)
    /// - `Completed` is a terminal state
    pub fn can_transition_to(&self, new_status: &JobStatus) -> bool {
        if self == new_status {
            return true;
        }

        match self {
            JobStatus::Pending => matches!(new_status, JobStatus::Processing | JobStatus::Stopped),
            JobStatus::Processing => matches!(
                new_status,
                JobStatus::Completed
                    | JobStatus::Failed
                    | JobStatus::Paused
                    | JobStatus::Stopped
                    | JobStatus::Pending
            ),
            JobStatus::Paused => matches!(new_status, JobStatus::Pending | JobStatus::Stopped),
            JobStatus::Failed | JobStatus::Stopped => matches!(new_status, JobStatus::Pending),
            JobStatus::Completed => false,
        }
    }

    /// Attempt to transition to a new status, returning an error if invalid.
    pub fn try_transition(&self, new_status: JobStatus) -> Result<JobStatus, TransitionError> {
        if self.can_transition_to(&new_status) {
            Ok(new_status)
        } else {
            Err(TransitionError {
                from: *self,
                to: new_status,
            })
        }
    }

    /// Returns true for states the worker will never leave on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped
        )
    }
}
