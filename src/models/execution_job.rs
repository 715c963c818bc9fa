use super::execution_task::ExecutionTask;
use crate::state_machine::ExecutionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One workflow execution instance, owning an ordered set of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub id: i64,
    pub name: String,
    pub user_id: String,
    pub workflow_id: i64,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub tasks: Vec<ExecutionTask>,
    /// Task id -> ids of the tasks it depends on
    pub task_dependencies: HashMap<i64, Vec<i64>>,
}

impl ExecutionJob {
    pub fn new(id: i64, user_id: impl Into<String>, workflow_id: i64) -> Self {
        Self {
            id,
            name: format!("job-{id}"),
            user_id: user_id.into(),
            workflow_id,
            status: ExecutionStatus::Undetermined,
            start_time: None,
            end_time: None,
            tasks: Vec::new(),
            task_dependencies: HashMap::new(),
        }
    }

    /// Add a task unless one with the same id is already present
    pub fn add_task(&mut self, task: ExecutionTask) {
        if !self.tasks.iter().any(|t| t.id == task.id) {
            self.tasks.push(task);
        }
    }

    /// Tasks in execution order (ascending id)
    pub fn ordered_tasks(&self) -> Vec<&ExecutionTask> {
        let mut tasks: Vec<&ExecutionTask> = self.tasks.iter().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Tasks at the root of the workflow graph
    pub fn root_tasks(&self) -> Vec<&ExecutionTask> {
        self.ordered_tasks()
            .into_iter()
            .filter(|t| t.level == 1)
            .collect()
    }

    /// First task in execution order
    pub fn first_task(&self) -> Option<&ExecutionTask> {
        self.tasks.iter().min_by_key(|t| t.id)
    }

    pub fn first_task_mut(&mut self) -> Option<&mut ExecutionTask> {
        self.tasks.iter_mut().min_by_key(|t| t.id)
    }

    /// Last task in execution order
    pub fn last_task(&self) -> Option<&ExecutionTask> {
        self.tasks.iter().max_by_key(|t| t.id)
    }

    /// Ids of the top-level tasks in execution order
    pub fn ordered_task_ids(&self) -> Vec<i64> {
        self.ordered_tasks().iter().map(|t| t.id).collect()
    }

    pub fn add_task_dependency(&mut self, task_id: i64, parent_task_id: i64) {
        let parents = self.task_dependencies.entry(task_id).or_default();
        if !parents.contains(&parent_task_id) {
            parents.push(parent_task_id);
        }
    }

    pub fn parents_of(&self, task_id: i64) -> &[i64] {
        self.task_dependencies
            .get(&task_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Tasks currently in `status`
    pub fn find(&self, status: ExecutionStatus) -> Vec<&ExecutionTask> {
        self.ordered_tasks()
            .into_iter()
            .filter(|t| t.status == status)
            .collect()
    }

    /// Find a task by id anywhere in the job, including group sub-tasks
    pub fn find_task(&self, task_id: i64) -> Option<&ExecutionTask> {
        self.tasks.iter().find_map(|t| t.find(task_id))
    }

    pub fn find_task_mut(&mut self, task_id: i64) -> Option<&mut ExecutionTask> {
        self.tasks.iter_mut().find_map(|t| t.find_mut(task_id))
    }

    /// Whether every top-level task is DONE
    pub fn all_tasks_done(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status == ExecutionStatus::Done)
    }

    pub fn has_failed_tasks(&self) -> bool {
        self.tasks.iter().any(|t| t.status == ExecutionStatus::Failed)
    }

    /// Reset the job so it can be queued again
    pub fn reset(&mut self) {
        self.status = ExecutionStatus::Undetermined;
        self.start_time = None;
        self.end_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskKind;

    fn job_with_tasks(ids: &[i64]) -> ExecutionJob {
        let mut job = ExecutionJob::new(1, "alice", 10);
        for id in ids {
            job.add_task(ExecutionTask::new(*id, 1, id * 10, TaskKind::Script));
        }
        job
    }

    #[test]
    fn ordered_tasks_sorts_by_id() {
        let job = job_with_tasks(&[3, 1, 2]);
        assert_eq!(job.ordered_task_ids(), vec![1, 2, 3]);
        assert_eq!(job.first_task().map(|t| t.id), Some(1));
        assert_eq!(job.last_task().map(|t| t.id), Some(3));
    }

    #[test]
    fn add_task_ignores_duplicates() {
        let mut job = job_with_tasks(&[1]);
        job.add_task(ExecutionTask::new(1, 1, 10, TaskKind::Script));
        assert_eq!(job.tasks.len(), 1);
    }

    #[test]
    fn task_dependencies_are_deduplicated() {
        let mut job = job_with_tasks(&[1, 2, 3]);
        job.add_task_dependency(3, 1);
        job.add_task_dependency(3, 2);
        job.add_task_dependency(3, 1);
        assert_eq!(job.parents_of(3), &[1, 2]);
        assert!(job.parents_of(1).is_empty());
    }

    #[test]
    fn reset_clears_times() {
        let mut job = job_with_tasks(&[1]);
        job.status = ExecutionStatus::Running;
        job.start_time = Some(Utc::now());
        job.reset();
        assert_eq!(job.status, ExecutionStatus::Undetermined);
        assert!(job.start_time.is_none());
        assert!(job.end_time.is_none());
    }
}
