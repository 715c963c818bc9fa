//! Test data builders for jobs, tasks and workflow graphs

use tao_orchestration::models::{
    ComponentLink, ExecutionGroup, ExecutionJob, ExecutionTask, TaskKind, WorkflowNode,
};
use tao_orchestration::persistence::InMemoryExecutionStore;
use tao_orchestration::state_machine::ExecutionStatus;

pub const WORKFLOW_ID: i64 = 7;

/// Builder pattern for creating test jobs
pub struct JobBuilder {
    job: ExecutionJob,
}

impl JobBuilder {
    pub fn new(id: i64, user_id: &str) -> Self {
        Self {
            job: ExecutionJob::new(id, user_id, WORKFLOW_ID),
        }
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_task(mut self, task: ExecutionTask) -> Self {
        self.job.add_task(task);
        self
    }

    pub fn with_dependency(mut self, task_id: i64, parent_task_id: i64) -> Self {
        self.job.add_task_dependency(task_id, parent_task_id);
        self
    }

    pub fn build(self) -> ExecutionJob {
        self.job
    }

    /// Build and insert into the store
    pub fn insert(self, store: &InMemoryExecutionStore) -> ExecutionJob {
        let job = self.build();
        store.insert_job(job.clone());
        job
    }
}

pub fn script_task(id: i64, job_id: i64, node_id: i64) -> ExecutionTask {
    ExecutionTask::new(id, job_id, node_id, TaskKind::Script)
}

pub fn sub_task(id: i64, job_id: i64, node_id: i64, group_id: i64) -> ExecutionTask {
    let mut task = script_task(id, job_id, node_id);
    task.group_id = Some(group_id);
    task
}

pub fn group_task(id: i64, job_id: i64, node_id: i64, tasks: Vec<ExecutionTask>) -> ExecutionTask {
    ExecutionTask::new(id, job_id, node_id, TaskKind::Group(ExecutionGroup::new(tasks)))
}

/// Node linked from each parent's `out` output into its own `in_<parent>` input
pub fn node(id: i64, parents: &[i64]) -> WorkflowNode {
    parents.iter().fold(WorkflowNode::new(id, WORKFLOW_ID, format!("component-{id}")), |node, parent| {
        node.with_link(ComponentLink::new(*parent, "out", format!("in_{parent}")))
    })
}

/// Diamond workflow: A -> B, A -> C, (B, C) -> D.
///
/// Nodes are 1..=4, tasks of job `job_id` are `job_id * 10 + node`.
pub struct Diamond {
    pub job: ExecutionJob,
}

impl Diamond {
    pub const A: i64 = 1;
    pub const B: i64 = 2;
    pub const C: i64 = 3;
    pub const D: i64 = 4;

    pub fn task_id(job_id: i64, node_id: i64) -> i64 {
        job_id * 10 + node_id
    }

    pub fn insert(store: &InMemoryExecutionStore, job_id: i64, user_id: &str) -> Self {
        store.insert_node(node(Self::A, &[]));
        store.insert_node(node(Self::B, &[Self::A]));
        store.insert_node(node(Self::C, &[Self::A]));
        store.insert_node(node(Self::D, &[Self::B, Self::C]));

        let mut builder = JobBuilder::new(job_id, user_id);
        for node_id in [Self::A, Self::B, Self::C, Self::D] {
            builder = builder.with_task(script_task(Self::task_id(job_id, node_id), job_id, node_id));
        }
        Self {
            job: builder.insert(store),
        }
    }
}
