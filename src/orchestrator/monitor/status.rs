use crate::models::JobStatus;

/// Map a session status word onto the job lifecycle.
///
/// Unknown words are treated as still processing.
pub fn map_session_status(status: &str) -> JobStatus {
    match status.trim().to_ascii_lowercase().as_str() {
        "pending" | "queued" => JobStatus::Pending,
        "processing" | "paused" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" | "stopped" => JobStatus::Failed,
        other => {
            tracing::warn!(status = other, "Unknown session status, assuming processing");
            JobStatus::Processing
        }
    }
}
