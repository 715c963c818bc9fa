//! # Task Commands
//!
//! The four lifecycle commands for a single execution task. Each command knows
//! the status it requests and the statuses it may be applied from; the side
//! effect is delegated to the [`ExecutionBackend`](crate::orchestration::traits::ExecutionBackend).
//!
//! Commands applied to a group task act on its sub-tasks: START launches the
//! first leaf of the group, the other commands cascade to every matching
//! descendant.

use super::context::CommandContext;
use super::errors::{ActionError, CommandError, CommandResult};
use super::states::ExecutionStatus;
use crate::logging::log_task_operation;
use crate::models::ExecutionTask;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Lifecycle command for an execution task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCommand {
    Start,
    Stop,
    Suspend,
    Resume,
}

const START_FROM: &[ExecutionStatus] = &[ExecutionStatus::Undetermined];
const STOP_FROM: &[ExecutionStatus] = &[
    ExecutionStatus::Undetermined,
    ExecutionStatus::QueuedActive,
    ExecutionStatus::Running,
];
const SUSPEND_FROM: &[ExecutionStatus] = &[ExecutionStatus::QueuedActive, ExecutionStatus::Running];
const RESUME_FROM: &[ExecutionStatus] = &[ExecutionStatus::Suspended];

impl TaskCommand {
    pub const ALL: [TaskCommand; 4] = [Self::Start, Self::Stop, Self::Suspend, Self::Resume];

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

    /// Apply this command to a task.
    ///
    /// Rejects the task without touching it when its status is not allowed.
    /// When the backend action fails the task is forced to FAILED, persisted,
    /// and the failure is returned as [`CommandError::ExecutionFailed`].
    pub async fn apply_to(self, task: &mut ExecutionTask, ctx: &CommandContext) -> CommandResult<()> {
        if !self.is_allowed_from(task.status) {
            return Err(CommandError::InvalidState {
                entity: "task",
                id: task.id,
                current: task.status,
                command: self.name(),
            });
        }

        match self.perform(task, ctx).await {
            Ok(()) => {
                task.status = self.requested_status();
                match self {
                    Self::Start if task.start_time.is_none() => task.start_time = Some(Utc::now()),
                    Self::Stop => task.end_time = Some(Utc::now()),
                    _ => {}
                }
                ctx.task_provider.update(task).await?;
                log_task_operation(
                    self.name(),
                    task.id,
                    Some(task.job_id),
                    &task.status.to_string(),
                    None,
                );
                Ok(())
            }
            Err(source) => {
                task.status = ExecutionStatus::Failed;
                task.end_time = Some(Utc::now());
                if let Err(persist_error) = ctx.task_provider.update(task).await {
                    warn!(
                        task_id = task.id,
                        error = %persist_error,
                        "Could not persist FAILED status after {} failure",
                        self.name()
                    );
                }
                log_task_operation(
                    self.name(),
                    task.id,
                    Some(task.job_id),
                    &task.status.to_string(),
                    Some(&source.to_string()),
                );
                Err(CommandError::ExecutionFailed {
                    entity: "task",
                    id: task.id,
                    source,
                })
            }
        }
    }

    async fn perform(&self, task: &mut ExecutionTask, ctx: &CommandContext) -> Result<(), ActionError> {
        if task.is_group() {
            return match self {
                Self::Start => start_group(task, ctx).await,
                _ => self.cascade_to_descendants(task, ctx).await,
            };
        }
        match self {
            Self::Start => ctx.backend.execute(task).await?,
            Self::Stop => ctx.backend.stop(task).await?,
            Self::Suspend => ctx.backend.suspend(task).await?,
            Self::Resume => ctx.backend.resume(task).await?,
        }
        Ok(())
    }

    /// Apply the backend side of this command to every descendant of a group
    /// whose status allows it, marking each with the requested status.
    async fn cascade_to_descendants(
        &self,
        group_task: &mut ExecutionTask,
        ctx: &CommandContext,
    ) -> Result<(), ActionError> {
        let mut targets = Vec::new();
        collect_descendants(group_task, &mut |t| {
            if self.is_allowed_from(t.status) {
                targets.push(t.id);
            }
        });

        for task_id in targets {
            let Some(sub_task) = group_task.find_mut(task_id) else {
                continue;
            };
            if !sub_task.is_group() {
                match self {
                    Self::Stop => ctx.backend.stop(sub_task).await?,
                    Self::Suspend => ctx.backend.suspend(sub_task).await?,
                    Self::Resume => ctx.backend.resume(sub_task).await?,
                    Self::Start => ctx.backend.execute(sub_task).await?,
                }
            }
            sub_task.status = self.requested_status();
            if *self == Self::Stop {
                sub_task.end_time = Some(Utc::now());
            }
            ctx.task_provider.update(sub_task).await?;
            debug!(
                task_id = task_id,
                group_id = group_task.id,
                status = %self.requested_status(),
                "Cascaded {} to group sub-task",
                self.name()
            );
        }
        Ok(())
    }
}

impl fmt::Display for TaskCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name().to_uppercase())
    }
}

/// Launch the first leaf task of a group, marking the groups on the way down
/// as queued.
async fn start_group(group_task: &mut ExecutionTask, ctx: &CommandContext) -> Result<(), ActionError> {
    let mut path = Vec::new();
    let mut cursor: &ExecutionTask = group_task;
    while let Some(group) = cursor.as_group() {
        let first = group
            .first_task()
            .ok_or(ActionError::EmptyGroup { task_id: cursor.id })?;
        path.push(first.id);
        cursor = first;
    }
    ctx.backend.execute(cursor).await?;

    let now = Utc::now();
    for task_id in path {
        if let Some(sub_task) = group_task.find_mut(task_id) {
            sub_task.status = ExecutionStatus::QueuedActive;
            sub_task.start_time.get_or_insert(now);
            ctx.task_provider.update(sub_task).await?;
        }
    }
    Ok(())
}

fn collect_descendants(task: &ExecutionTask, visit: &mut impl FnMut(&ExecutionTask)) {
    if let Some(group) = task.as_group() {
        for sub_task in &group.tasks {
            visit(sub_task);
            collect_descendants(sub_task, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_state_table() {
        use ExecutionStatus::*;
        assert_eq!(TaskCommand::Start.allowed_states(), &[Undetermined]);
        assert_eq!(
            TaskCommand::Stop.allowed_states(),
            &[Undetermined, QueuedActive, Running]
        );
        assert_eq!(TaskCommand::Suspend.allowed_states(), &[QueuedActive, Running]);
        assert_eq!(TaskCommand::Resume.allowed_states(), &[Suspended]);
    }

    #[test]
    fn test_requested_status() {
        assert_eq!(TaskCommand::Start.requested_status(), ExecutionStatus::QueuedActive);
        assert_eq!(TaskCommand::Stop.requested_status(), ExecutionStatus::Cancelled);
        assert_eq!(TaskCommand::Suspend.requested_status(), ExecutionStatus::Suspended);
        assert_eq!(TaskCommand::Resume.requested_status(), ExecutionStatus::QueuedActive);
    }

    #[test]
    fn test_no_command_leaves_a_terminal_state() {
        for command in TaskCommand::ALL {
            for status in ExecutionStatus::ALL.iter().filter(|s| s.is_terminal()) {
                assert!(!command.is_allowed_from(*status), "{command} from {status}");
            }
        }
    }
}
