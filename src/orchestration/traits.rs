//! # Collaborator Contracts
//!
//! Narrow interfaces through which the orchestration core reaches the
//! persistence layer and the execution backend. Implementations live in the
//! surrounding service; [`crate::persistence::InMemoryExecutionStore`] is a
//! complete in-process implementation of the provider traits.

use crate::models::{ExecutionJob, ExecutionTask, WorkflowNode};
use crate::state_machine::ExecutionStatus;
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by persistence collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Storage error: {operation}: {message}")]
    Storage { operation: String, message: String },
}

impl PersistenceError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// Errors reported by the execution backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Task {task_id} rejected by execution backend: {reason}")]
    Rejected { task_id: i64, reason: String },

    #[error("Execution backend unavailable: {message}")]
    Unavailable { message: String },
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Access to persisted jobs
#[async_trait]
pub trait JobProvider: Send + Sync {
    async fn get(&self, job_id: i64) -> PersistenceResult<Option<ExecutionJob>>;

    async fn list_by_status(
        &self,
        statuses: &[ExecutionStatus],
    ) -> PersistenceResult<Vec<ExecutionJob>>;

    async fn update(&self, job: &ExecutionJob) -> PersistenceResult<()>;
}

/// Access to persisted tasks
#[async_trait]
pub trait TaskProvider: Send + Sync {
    async fn get(&self, task_id: i64) -> PersistenceResult<Option<ExecutionTask>>;

    /// Task listed in a job or group for a workflow node and instance
    async fn get_by_container_and_node(
        &self,
        container_id: i64,
        node_id: i64,
        instance_id: i32,
    ) -> PersistenceResult<Option<ExecutionTask>>;

    async fn save(&self, task: &ExecutionTask, container_id: i64) -> PersistenceResult<()>;

    async fn update(&self, task: &ExecutionTask) -> PersistenceResult<()>;
}

/// Read-only access to the workflow graph
#[async_trait]
pub trait WorkflowNodeProvider: Send + Sync {
    async fn get(&self, node_id: i64) -> PersistenceResult<Option<WorkflowNode>>;

    /// All nodes of a workflow
    async fn list_by_workflow(&self, workflow_id: i64) -> PersistenceResult<Vec<WorkflowNode>>;
}

/// Backend that actually runs tasks
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(&self, task: &ExecutionTask) -> BackendResult<()>;

    async fn stop(&self, task: &ExecutionTask) -> BackendResult<()>;

    async fn suspend(&self, task: &ExecutionTask) -> BackendResult<()>;

    async fn resume(&self, task: &ExecutionTask) -> BackendResult<()>;
}
