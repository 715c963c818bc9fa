//! # System Constants
//!
//! Default values and status groupings shared across the orchestration core.

use crate::state_machine::ExecutionStatus;

/// Configuration defaults
pub mod defaults {
    pub const JOB_SELECTOR: &str = "fifo";
    pub const CACHE_DIR_NAME: &str = "tao";
    pub const QUEUE_FILE_NAME: &str = "wait_jobs.json";
    pub const QUEUE_POLL_INTERVAL_MS: u64 = 2_000;
    pub const WORKER_WAIT_INTERVAL_MS: u64 = 10_000;
    pub const JOBS_PER_NODE: usize = 2;
    pub const ACTIVE_NODES: usize = 1;

    pub const CONFIG_FILE: &str = "config/orchestration.toml";
    pub const CONFIG_FILE_ENV: &str = "TAO_CONFIG_FILE";
    pub const ENV_PREFIX: &str = "TAO";
}

/// Status groupings used by the queue and the commands
pub mod status_groups {
    use super::ExecutionStatus;

    /// Jobs found in these statuses at startup were interrupted mid-execution
    pub const RECOVERABLE_JOB_STATES: &[ExecutionStatus] =
        &[ExecutionStatus::QueuedActive, ExecutionStatus::Running];

    pub const TERMINAL_STATES: &[ExecutionStatus] = &[
        ExecutionStatus::Done,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
    ];

    pub const ACTIVE_STATES: &[ExecutionStatus] =
        &[ExecutionStatus::QueuedActive, ExecutionStatus::Running];
}

#[cfg(test)]
mod tests {
    use super::status_groups::*;

    #[test]
    fn test_status_groups_match_predicates() {
        assert!(TERMINAL_STATES.iter().all(|s| s.is_terminal()));
        assert!(ACTIVE_STATES.iter().all(|s| s.is_active()));
        assert!(RECOVERABLE_JOB_STATES.iter().all(|s| !s.is_terminal()));
    }
}
