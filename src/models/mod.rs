//! # Execution Model
//!
//! Jobs, tasks and the read-only workflow graph the orchestrator walks.
//! Persistence of these types belongs to the surrounding service; the core
//! only sees them through the provider traits in
//! [`crate::orchestration::traits`].

pub mod execution_job;
pub mod execution_task;
pub mod queue_entry;
pub mod variable;
pub mod workflow_node;

pub use execution_job::ExecutionJob;
pub use execution_task::{
    ExecutionGroup, ExecutionTask, LoopState, LoopStateHandler, TaskKind,
};
pub use queue_entry::QueueEntry;
pub use variable::Variable;
pub use workflow_node::{find_children, ComponentLink, WorkflowNode};
