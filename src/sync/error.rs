use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Another sync holds the active marker. Requests are rejected, not
    /// queued.
    #[error("A refresh is already in progress (task {active_task_id})")]
    AlreadyRunning { active_task_id: String },

    #[error("Fan id must not be empty")]
    InvalidFanId,
}
