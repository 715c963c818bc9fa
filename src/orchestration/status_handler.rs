//! # Task Status Propagation
//!
//! Folds a status change reported for one task into the state of its
//! enclosing groups and job. Operates on an in-memory job; the orchestrator
//! loads the job, applies the change here and persists the result.
//!
//! Rules, applied at each container level starting from the task's group:
//!
//! - SUSPENDED, CANCELLED and FAILED spread to every later non-terminal task
//!   of the container and to the container itself.
//! - DONE of a group's last sub-task either starts the next loop pass (all
//!   sub-tasks and the group go back to UNDETERMINED) or completes the group.
//! - RUNNING, or DONE of any other task, moves a queued or undetermined
//!   container to RUNNING.
//! - A job becomes DONE once every task is DONE.
//!
//! A group whose status changed is reported to its own container as a task
//! status change of the group. Terminal containers are never modified.

use crate::models::{ExecutionJob, ExecutionTask};
use crate::state_machine::ExecutionStatus;
use chrono::Utc;
use tracing::{debug, warn};

/// Outcome of propagating one task status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPropagation {
    pub task_id: i64,
    pub task_status: ExecutionStatus,
    /// Innermost group of the task and its status after propagation
    pub group: Option<(i64, ExecutionStatus)>,
    pub previous_job_status: ExecutionStatus,
    pub job_status: ExecutionStatus,
}

impl StatusPropagation {
    /// Whether this change moved the job into a terminal status
    pub fn job_became_terminal(&self) -> bool {
        !self.previous_job_status.is_terminal() && self.job_status.is_terminal()
    }

    /// Whether the innermost group started a new loop pass
    pub fn group_restarted(&self) -> bool {
        self.task_status == ExecutionStatus::Done
            && matches!(self.group, Some((_, ExecutionStatus::Undetermined)))
    }

    /// Whether the innermost group completed
    pub fn group_completed(&self) -> bool {
        matches!(self.group, Some((_, ExecutionStatus::Done)))
    }
}

/// Set the status of `task_id` and propagate it through groups to the job.
///
/// Returns `None` when the task is not part of the job.
pub fn propagate_task_status(
    job: &mut ExecutionJob,
    task_id: i64,
    status: ExecutionStatus,
) -> Option<StatusPropagation> {
    let previous_job_status = job.status;
    let task = job.find_task_mut(task_id)?;
    set_status(task, status);
    let mut container = task.group_id;

    let mut changed_id = task_id;
    let mut changed_status = status;
    let mut innermost_group = None;

    while let Some(group_id) = container {
        let Some(group_task) = job.find_task_mut(group_id) else {
            warn!(task_id = changed_id, group_id = group_id, "Group task not found in job");
            break;
        };
        let before = group_task.status;
        apply_to_group(group_task, changed_id, changed_status);
        let after = group_task.status;
        if innermost_group.is_none() {
            innermost_group = Some((group_id, after));
        }
        if before == after {
            return Some(StatusPropagation {
                task_id,
                task_status: status,
                group: innermost_group,
                previous_job_status,
                job_status: job.status,
            });
        }
        debug!(group_id = group_id, from = %before, to = %after, "Group status changed");
        changed_id = group_id;
        changed_status = after;
        container = group_task.group_id;
    }

    apply_to_job(job, changed_id, changed_status);
    Some(StatusPropagation {
        task_id,
        task_status: status,
        group: innermost_group,
        previous_job_status,
        job_status: job.status,
    })
}

fn set_status(task: &mut ExecutionTask, status: ExecutionStatus) {
    task.status = status;
    let now = Utc::now();
    match status {
        ExecutionStatus::Running => {
            task.start_time.get_or_insert(now);
        }
        s if s.is_terminal() => task.end_time = Some(now),
        _ => {}
    }
}

fn apply_to_group(group_task: &mut ExecutionTask, task_id: i64, status: ExecutionStatus) {
    let group_id = group_task.id;
    let current = group_task.status;
    if current.is_terminal() {
        return;
    }
    let Some(group) = group_task.as_group_mut() else {
        return;
    };
    let new_status = match status {
        ExecutionStatus::Suspended | ExecutionStatus::Cancelled | ExecutionStatus::Failed => {
            for task in later_tasks(&mut group.tasks, task_id) {
                set_status(task, status);
            }
            status
        }
        ExecutionStatus::Done if group.is_last(task_id) => {
            match group.state_handler.as_mut().and_then(|h| h.next_state()) {
                Some(state) => {
                    debug!(group_id = group_id, pass = state.current, limit = state.limit, "Starting next loop pass");
                    for task in &mut group.tasks {
                        task.status = ExecutionStatus::Undetermined;
                        task.start_time = None;
                        task.end_time = None;
                    }
                    ExecutionStatus::Undetermined
                }
                None => ExecutionStatus::Done,
            }
        }
        ExecutionStatus::Running | ExecutionStatus::Done
            if matches!(current, ExecutionStatus::QueuedActive | ExecutionStatus::Undetermined) =>
        {
            ExecutionStatus::Running
        }
        _ => current,
    };
    if new_status != current {
        set_status(group_task, new_status);
    }
}

fn apply_to_job(job: &mut ExecutionJob, task_id: i64, status: ExecutionStatus) {
    if job.status.is_terminal() {
        return;
    }
    match status {
        ExecutionStatus::Suspended | ExecutionStatus::Cancelled | ExecutionStatus::Failed => {
            for task in later_tasks(&mut job.tasks, task_id) {
                set_status(task, status);
            }
            job.status = status;
            if status.is_terminal() {
                job.end_time = Some(Utc::now());
            }
        }
        ExecutionStatus::Running => {
            if matches!(job.status, ExecutionStatus::QueuedActive | ExecutionStatus::Undetermined) {
                job.status = ExecutionStatus::Running;
            }
        }
        ExecutionStatus::Done => {
            if job.all_tasks_done() {
                job.status = ExecutionStatus::Done;
                job.end_time = Some(Utc::now());
            } else if !job.has_failed_tasks()
                && matches!(job.status, ExecutionStatus::QueuedActive | ExecutionStatus::Undetermined)
            {
                job.status = ExecutionStatus::Running;
            }
        }
        _ => {}
    }
}

/// Non-terminal tasks ordered after `task_id`
fn later_tasks(tasks: &mut [ExecutionTask], task_id: i64) -> impl Iterator<Item = &mut ExecutionTask> {
    tasks
        .iter_mut()
        .filter(move |t| t.id > task_id && !t.status.is_terminal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionGroup, LoopState, LoopStateHandler, TaskKind};

    fn job_with(tasks: Vec<ExecutionTask>) -> ExecutionJob {
        let mut job = ExecutionJob::new(1, "alice", 1);
        job.status = ExecutionStatus::QueuedActive;
        for task in tasks {
            job.add_task(task);
        }
        job
    }

    fn task(id: i64) -> ExecutionTask {
        ExecutionTask::new(id, 1, id * 10, TaskKind::Script)
    }

    fn sub_task(id: i64, group_id: i64) -> ExecutionTask {
        let mut t = task(id);
        t.group_id = Some(group_id);
        t
    }

    #[test]
    fn test_running_task_starts_job() {
        let mut job = job_with(vec![task(1), task(2)]);
        let result = propagate_task_status(&mut job, 1, ExecutionStatus::Running).unwrap();
        assert_eq!(result.job_status, ExecutionStatus::Running);
        assert!(!result.job_became_terminal());
        assert!(job.find_task(1).unwrap().start_time.is_some());
    }

    #[test]
    fn test_failure_spreads_to_later_tasks() {
        let mut job = job_with(vec![task(1), task(2), task(3)]);
        job.status = ExecutionStatus::Running;
        job.find_task_mut(1).unwrap().status = ExecutionStatus::Done;

        let result = propagate_task_status(&mut job, 2, ExecutionStatus::Failed).unwrap();

        assert!(result.job_became_terminal());
        assert_eq!(job.status, ExecutionStatus::Failed);
        assert_eq!(job.find_task(1).unwrap().status, ExecutionStatus::Done);
        assert_eq!(job.find_task(3).unwrap().status, ExecutionStatus::Failed);
        assert!(job.end_time.is_some());
    }

    #[test]
    fn test_last_done_task_completes_job() {
        let mut job = job_with(vec![task(1), task(2)]);
        job.status = ExecutionStatus::Running;
        propagate_task_status(&mut job, 1, ExecutionStatus::Done).unwrap();
        assert_eq!(job.status, ExecutionStatus::Running);

        let result = propagate_task_status(&mut job, 2, ExecutionStatus::Done).unwrap();
        assert_eq!(result.job_status, ExecutionStatus::Done);
        assert!(result.job_became_terminal());
    }

    #[test]
    fn test_loop_group_restarts_until_limit() {
        let mut group = ExecutionGroup::new(vec![sub_task(11, 10), sub_task(12, 10)]);
        group.state_handler = Some(LoopStateHandler::new(LoopState::new(2, 1)));
        let mut group_task = ExecutionTask::new(10, 1, 100, TaskKind::Group(group));
        group_task.status = ExecutionStatus::Running;
        let mut job = job_with(vec![group_task]);
        job.status = ExecutionStatus::Running;

        propagate_task_status(&mut job, 11, ExecutionStatus::Done).unwrap();
        let first_pass = propagate_task_status(&mut job, 12, ExecutionStatus::Done).unwrap();
        assert!(first_pass.group_restarted());
        assert_eq!(job.find_task(11).unwrap().status, ExecutionStatus::Undetermined);
        assert_eq!(job.status, ExecutionStatus::Running);

        job.find_task_mut(10).unwrap().status = ExecutionStatus::Running;
        propagate_task_status(&mut job, 11, ExecutionStatus::Done).unwrap();
        let second_pass = propagate_task_status(&mut job, 12, ExecutionStatus::Done).unwrap();
        assert!(second_pass.group_completed());
        assert_eq!(job.status, ExecutionStatus::Done);
    }

    #[test]
    fn test_cancelled_sub_task_cancels_group_and_job() {
        let group = ExecutionGroup::new(vec![sub_task(11, 10), sub_task(12, 10)]);
        let mut group_task = ExecutionTask::new(10, 1, 100, TaskKind::Group(group));
        group_task.status = ExecutionStatus::Running;
        let mut job = job_with(vec![group_task, task(20)]);
        job.status = ExecutionStatus::Running;

        let result = propagate_task_status(&mut job, 11, ExecutionStatus::Cancelled).unwrap();

        assert_eq!(result.group, Some((10, ExecutionStatus::Cancelled)));
        assert_eq!(job.find_task(12).unwrap().status, ExecutionStatus::Cancelled);
        assert_eq!(job.find_task(20).unwrap().status, ExecutionStatus::Cancelled);
        assert_eq!(job.status, ExecutionStatus::Cancelled);
    }

    #[test]
    fn test_unknown_task_is_ignored() {
        let mut job = job_with(vec![task(1)]);
        assert!(propagate_task_status(&mut job, 99, ExecutionStatus::Done).is_none());
    }
}
