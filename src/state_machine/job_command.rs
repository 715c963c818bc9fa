//! # Job Commands
//!
//! Lifecycle commands for a whole execution job. START launches the first task
//! of the job; STOP, SUSPEND and RESUME cascade the matching [`TaskCommand`] to
//! every top-level task whose status passes the command's cascade filter.

use super::context::CommandContext;
use super::errors::{ActionError, CommandError, CommandResult};
use super::states::ExecutionStatus;
use super::task_command::TaskCommand;
use crate::logging::log_job_operation;
use crate::models::ExecutionJob;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{instrument, warn};

/// Lifecycle command for an execution job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobCommand {
    Start,
    Stop,
    Suspend,
    Resume,
}

const START_FROM: &[ExecutionStatus] = &[ExecutionStatus::Undetermined];
const STOP_FROM: &[ExecutionStatus] = &[ExecutionStatus::QueuedActive, ExecutionStatus::Running];
const SUSPEND_FROM: &[ExecutionStatus] = &[ExecutionStatus::Running];
const RESUME_FROM: &[ExecutionStatus] = &[ExecutionStatus::Suspended];

const STOP_CASCADE: &[ExecutionStatus] = &[
    ExecutionStatus::Running,
    ExecutionStatus::QueuedActive,
    ExecutionStatus::Undetermined,
];
const SUSPEND_CASCADE: &[ExecutionStatus] = &[ExecutionStatus::Running, ExecutionStatus::QueuedActive];
const RESUME_CASCADE: &[ExecutionStatus] = &[ExecutionStatus::Suspended];

impl JobCommand {
    pub const ALL: [JobCommand; 4] = [Self::Start, Self::Stop, Self::Suspend, Self::Resume];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
        }
    }

    /// Status assigned when the command succeeds
    pub fn requested_status(&self) -> ExecutionStatus {
        match self {
            Self::Start | Self::Resume => ExecutionStatus::QueuedActive,
            Self::Stop => ExecutionStatus::Cancelled,
            Self::Suspend => ExecutionStatus::Suspended,
        }
    }

    /// Statuses from which the command may be applied
    pub fn allowed_states(&self) -> &'static [ExecutionStatus] {
        match self {
            Self::Start => START_FROM,
            Self::Stop => STOP_FROM,
            Self::Suspend => SUSPEND_FROM,
            Self::Resume => RESUME_FROM,
        }
    }

    pub fn is_allowed_from(&self, status: ExecutionStatus) -> bool {
        self.allowed_states().contains(&status)
    }

    /// Task statuses the command is cascaded to; empty for START
    pub fn cascade_filter(&self) -> &'static [ExecutionStatus] {
        match self {
            Self::Start => &[],
            Self::Stop => STOP_CASCADE,
            Self::Suspend => SUSPEND_CASCADE,
            Self::Resume => RESUME_CASCADE,
        }
    }

    /// Task command cascaded to the job's tasks
    pub fn task_command(&self) -> TaskCommand {
        match self {
            Self::Start => TaskCommand::Start,
            Self::Stop => TaskCommand::Stop,
            Self::Suspend => TaskCommand::Suspend,
            Self::Resume => TaskCommand::Resume,
        }
    }

    /// Apply this command to a job.
    ///
    /// Rejects the job without touching it when its status is not allowed.
    /// When the action fails the job is forced to FAILED, persisted, and the
    /// failure is returned as [`CommandError::ExecutionFailed`].
    #[instrument(skip(self, job, ctx), fields(command = self.name(), job_id = job.id))]
    pub async fn apply_to(self, job: &mut ExecutionJob, ctx: &CommandContext) -> CommandResult<()> {
        if !self.is_allowed_from(job.status) {
            return Err(CommandError::InvalidState {
                entity: "job",
                id: job.id,
                current: job.status,
                command: self.name(),
            });
        }

        match self.perform(job, ctx).await {
            Ok(()) => {
                job.status = self.requested_status();
                match self {
                    Self::Start => job.start_time = Some(Utc::now()),
                    Self::Stop => job.end_time = Some(Utc::now()),
                    _ => {}
                }
                ctx.job_provider.update(job).await?;
                log_job_operation(
                    self.name(),
                    job.id,
                    Some(&job.user_id),
                    &job.status.to_string(),
                    None,
                );
                Ok(())
            }
            Err(source) => {
                job.status = ExecutionStatus::Failed;
                job.end_time = Some(Utc::now());
                if let Err(persist_error) = ctx.job_provider.update(job).await {
                    warn!(
                        job_id = job.id,
                        error = %persist_error,
                        "Could not persist FAILED status after {} failure",
                        self.name()
                    );
                }
                log_job_operation(
                    self.name(),
                    job.id,
                    Some(&job.user_id),
                    &job.status.to_string(),
                    Some(&source.to_string()),
                );
                Err(CommandError::ExecutionFailed {
                    entity: "job",
                    id: job.id,
                    source,
                })
            }
        }
    }

    async fn perform(&self, job: &mut ExecutionJob, ctx: &CommandContext) -> Result<(), ActionError> {
        match self {
            Self::Start => {
                let job_id = job.id;
                let first = job.first_task_mut().ok_or(ActionError::EmptyJob { job_id })?;
                TaskCommand::Start.apply_to(first, ctx).await?;
            }
            _ => {
                let filter = self.cascade_filter();
                let command = self.task_command();
                for task in job.tasks.iter_mut() {
                    if filter.contains(&task.status) {
                        command.apply_to(task, ctx).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name().to_uppercase())
    }
}
