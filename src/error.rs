use crate::config::ConfigurationError;
use crate::orchestration::traits::{BackendError, PersistenceError};
use crate::queue::QueueError;
use crate::state_machine::CommandError;
use thiserror::Error;

/// Crate-level error aggregating the subsystem errors
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Job {job_id} not found")]
    JobNotFound { job_id: i64 },

    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: i64 },
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;
