//! DashMap-backed store implementing every provider trait.
//!
//! Jobs are stored whole, with their task trees; a task index maps each task
//! id to the job holding it. Task updates replace the stored copy of the task
//! (including the subtree of a group task) inside its job.

use crate::models::{ExecutionJob, ExecutionTask, WorkflowNode};
use crate::orchestration::traits::{
    JobProvider, PersistenceError, PersistenceResult, TaskProvider, WorkflowNodeProvider,
};
use crate::state_machine::ExecutionStatus;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// Shared in-process store of jobs, tasks and workflow nodes
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    jobs: DashMap<i64, ExecutionJob>,
    nodes: DashMap<i64, WorkflowNode>,
    /// Task id -> job id
    task_index: DashMap<i64, i64>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a job and index its tasks
    pub fn insert_job(&self, job: ExecutionJob) {
        self.index_tasks(&job);
        self.jobs.insert(job.id, job);
    }

    pub fn insert_node(&self, node: WorkflowNode) {
        self.nodes.insert(node.id, node);
    }

    /// Snapshot of a stored job
    pub fn job(&self, job_id: i64) -> Option<ExecutionJob> {
        self.jobs.get(&job_id).map(|job| job.clone())
    }

    /// Snapshot of a stored task
    pub fn task(&self, task_id: i64) -> Option<ExecutionTask> {
        let job_id = self.job_id_of(task_id)?;
        self.jobs.get(&job_id)?.find_task(task_id).cloned()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    fn index_tasks(&self, job: &ExecutionJob) {
        fn visit(task: &ExecutionTask, job_id: i64, index: &DashMap<i64, i64>) {
            index.insert(task.id, job_id);
            if let Some(group) = task.as_group() {
                for sub_task in &group.tasks {
                    visit(sub_task, job_id, index);
                }
            }
        }
        for task in &job.tasks {
            visit(task, job.id, &self.task_index);
        }
    }

    fn job_id_of(&self, task_id: i64) -> Option<i64> {
        self.task_index.get(&task_id).map(|entry| *entry.value())
    }
}

#[async_trait]
impl JobProvider for InMemoryExecutionStore {
    async fn get(&self, job_id: i64) -> PersistenceResult<Option<ExecutionJob>> {
        Ok(self.job(job_id))
    }

    async fn list_by_status(&self, statuses: &[ExecutionStatus]) -> PersistenceResult<Vec<ExecutionJob>> {
        let mut jobs: Vec<ExecutionJob> = self
            .jobs
            .iter()
            .filter(|entry| statuses.contains(&entry.status))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn update(&self, job: &ExecutionJob) -> PersistenceResult<()> {
        if !self.jobs.contains_key(&job.id) {
            return Err(PersistenceError::not_found("job", job.id));
        }
        self.insert_job(job.clone());
        Ok(())
    }
}

#[async_trait]
impl TaskProvider for InMemoryExecutionStore {
    async fn get(&self, task_id: i64) -> PersistenceResult<Option<ExecutionTask>> {
        Ok(self.task(task_id))
    }

    async fn get_by_container_and_node(
        &self,
        container_id: i64,
        node_id: i64,
        instance_id: i32,
    ) -> PersistenceResult<Option<ExecutionTask>> {
        let matches = |t: &&ExecutionTask| t.workflow_node_id == node_id && t.instance_id == instance_id;

        if let Some(job) = self.jobs.get(&container_id) {
            if let Some(task) = job.tasks.iter().find(matches) {
                return Ok(Some(task.clone()));
            }
        }
        let found = self
            .task(container_id)
            .and_then(|group_task| group_task.as_group()?.tasks.iter().find(matches).cloned());
        Ok(found)
    }

    async fn save(&self, task: &ExecutionTask, container_id: i64) -> PersistenceResult<()> {
        if let Some(mut job) = self.jobs.get_mut(&container_id) {
            job.add_task(task.clone());
            self.task_index.insert(task.id, container_id);
            debug!(task_id = task.id, job_id = container_id, "Task saved in job");
            return Ok(());
        }
        let job_id = self
            .job_id_of(container_id)
            .ok_or_else(|| PersistenceError::not_found("task container", container_id))?;
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| PersistenceError::not_found("job", job_id))?;
        let group = job
            .find_task_mut(container_id)
            .and_then(ExecutionTask::as_group_mut)
            .ok_or_else(|| PersistenceError::storage("save_task", format!("task {container_id} is not a group")))?;
        group.add_task(task.clone());
        self.task_index.insert(task.id, job_id);
        debug!(task_id = task.id, group_id = container_id, job_id = job_id, "Task saved in group");
        Ok(())
    }

    async fn update(&self, task: &ExecutionTask) -> PersistenceResult<()> {
        let job_id = self.job_id_of(task.id).unwrap_or(task.job_id);
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| PersistenceError::not_found("job", job_id))?;
        let stored = job
            .find_task_mut(task.id)
            .ok_or_else(|| PersistenceError::not_found("task", task.id))?;
        *stored = task.clone();
        drop(job);
        if let Some(group) = task.as_group() {
            for sub_task in &group.tasks {
                self.task_index.insert(sub_task.id, job_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowNodeProvider for InMemoryExecutionStore {
    async fn get(&self, node_id: i64) -> PersistenceResult<Option<WorkflowNode>> {
        Ok(self.nodes.get(&node_id).map(|node| node.clone()))
    }

    async fn list_by_workflow(&self, workflow_id: i64) -> PersistenceResult<Vec<WorkflowNode>> {
        let mut nodes: Vec<WorkflowNode> = self
            .nodes
            .iter()
            .filter(|entry| entry.workflow_id == workflow_id)
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by_key(|node| (node.level, node.id));
        Ok(nodes)
    }
}
