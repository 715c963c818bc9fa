//! # Job Queue
//!
//! Durable, user-fair queue of jobs waiting to run, and the background worker
//! that drains it.
//!
//! - [`file_queue`]: generic file-backed ordered queue
//! - [`job_selector`]: pluggable strategies choosing the next job to dequeue
//! - [`job_queue`]: the job queue with per-user reordering and blocking takes
//! - [`worker`]: the loop that starts dequeued jobs within capacity

pub mod file_queue;
pub mod job_queue;
pub mod job_selector;
pub mod worker;

use crate::orchestration::traits::PersistenceError;
use std::path::PathBuf;
use thiserror::Error;

pub use file_queue::PersistentQueue;
pub use job_queue::JobQueue;
pub use job_selector::{BalancedJobSelector, FifoJobSelector, JobSelectionStrategy, JobSelectorRegistry};
pub use worker::JobQueueWorker;

/// Errors raised by the job queue
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue storage I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Queue serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue wait was interrupted")]
    Interrupted,

    #[error("Job lookup failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl QueueError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
