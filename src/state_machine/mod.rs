//! # Execution State Machine
//!
//! Execution statuses and the job and task lifecycle commands that move
//! entities between them.

pub mod context;
pub mod errors;
pub mod job_command;
pub mod states;
pub mod task_command;

pub use context::CommandContext;
pub use errors::{ActionError, CommandError, CommandResult};
pub use job_command::JobCommand;
pub use states::ExecutionStatus;
pub use task_command::TaskCommand;
