#![allow(clippy::doc_markdown)] // Allow technical terms in docs without backticks
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # TAO Orchestration Core
//!
//! Execution core of a scientific workflow platform: turns submitted workflow
//! jobs into running tasks and drives them to completion.
//!
//! ## Overview
//!
//! A job is an instance of a workflow graph. Its tasks are started in
//! dependency order, possibly several at a time when the graph fans out, and
//! group tasks nest sub-workflows that may loop over their input. Jobs wait
//! in a durable queue with per-user fairness until the worker has a free
//! slot for them.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Execution statuses and the job/task lifecycle commands
//! - [`orchestration`] - Task selection, status propagation and the orchestrator
//! - [`queue`] - File-backed job queue, selection strategies and the queue worker
//! - [`models`] - Jobs, tasks, groups and the workflow graph
//! - [`persistence`] - In-process provider implementations
//! - [`config`] - Layered configuration (defaults, TOML file, environment)
//! - [`logging`] - Structured logging setup and operation log helpers
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tao_orchestration::config::ConfigManager;
//! use tao_orchestration::orchestration::{ExecutionBackend, Orchestrator};
//! use tao_orchestration::persistence::InMemoryExecutionStore;
//! use tao_orchestration::queue::{JobQueue, JobQueueWorker};
//! use tao_orchestration::state_machine::CommandContext;
//!
//! # async fn example(backend: Arc<dyn ExecutionBackend>) -> Result<(), Box<dyn std::error::Error>> {
//! tao_orchestration::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let store = Arc::new(InMemoryExecutionStore::new());
//! let context = CommandContext::new(backend, store.clone(), store.clone());
//! let orchestrator = Arc::new(Orchestrator::from_config(context, store.clone(), &config.worker));
//!
//! let queue = Arc::new(JobQueue::from_config(config, store.clone())?);
//! queue.initialize().await?;
//! let worker = Arc::new(JobQueueWorker::new(queue.clone(), orchestrator.clone(), &config.worker));
//! let handle = worker.start();
//!
//! // ... put jobs, report task status changes through the orchestrator ...
//!
//! worker.interrupt();
//! handle.await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod queue;
pub mod state_machine;

pub use config::{ConfigManager, OrchestrationConfig};
pub use constants::status_groups;
pub use error::{OrchestrationError, Result};
pub use models::{ExecutionJob, ExecutionTask, QueueEntry, WorkflowNode};
pub use orchestration::Orchestrator;
pub use queue::{JobQueue, JobQueueWorker};
pub use state_machine::{ExecutionStatus, JobCommand, TaskCommand};
