//! # Orchestration Engine
//!
//! Drives workflow jobs from start to a terminal status.
//!
//! ## Core Components
//!
//! - **Orchestrator**: job lifecycle entry point and active-job accounting
//! - **TaskSelector**: dependency-driven choice of the next tasks in a job or group
//! - **Status propagation**: folds task status changes into groups and jobs
//! - **Collaborator traits**: persistence providers and the execution backend
//!
//! Task execution itself happens elsewhere; the backend reports status changes
//! back through [`Orchestrator::on_task_status_changed`].

pub mod orchestrator;
pub mod status_handler;
pub mod task_selector;
pub mod traits;

pub use orchestrator::Orchestrator;
pub use status_handler::{propagate_task_status, StatusPropagation};
pub use task_selector::{enter_group, transfer_parent_outputs, DefaultGroupTaskSelector, DefaultJobTaskSelector, TaskSelector};
pub use traits::{
    BackendError, BackendResult, ExecutionBackend, JobProvider, PersistenceError, PersistenceResult, TaskProvider,
    WorkflowNodeProvider,
};
