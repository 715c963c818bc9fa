use super::states::ExecutionStatus;
use crate::orchestration::traits::{BackendError, PersistenceError};
use thiserror::Error;

/// Errors raised when applying a job or task command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Cannot {command} {entity} {id}: status {current} is not allowed")]
    InvalidState {
        entity: &'static str,
        id: i64,
        current: ExecutionStatus,
        command: &'static str,
    },

    #[error("Execution of {entity} {id} failed: {source}")]
    ExecutionFailed {
        entity: &'static str,
        id: i64,
        #[source]
        source: ActionError,
    },

    #[error("Persistence operation failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl CommandError {
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

/// Failure of the side effect performed by a command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Job {job_id} has no tasks to start")]
    EmptyJob { job_id: i64 },

    #[error("Group task {task_id} has no sub-tasks")]
    EmptyGroup { task_id: i64 },

    /// A cascaded task command failed
    #[error("Task {task_id}: {reason}")]
    TaskCommand { task_id: i64, reason: String },
}

impl From<CommandError> for ActionError {
    fn from(error: CommandError) -> Self {
        let task_id = match &error {
            CommandError::InvalidState { id, .. } | CommandError::ExecutionFailed { id, .. } => *id,
            CommandError::Persistence(_) => 0,
        };
        Self::TaskCommand {
            task_id,
            reason: error.to_string(),
        }
    }
}

pub type CommandResult<T> = std::result::Result<T, CommandError>;
