//! # Task Selection
//!
//! Dependency-driven choice of the next task(s) to run inside a container,
//! either a whole [`ExecutionJob`] or a group task.
//!
//! After a task completes, the selector walks the workflow graph from the
//! node of that task to its children. A child is ready when its task is not
//! already active and every parent it declares (through incoming links, and
//! for jobs through explicit task dependencies) is DONE. Several ready
//! children are all returned, which gives parallel fan-out; a join node only
//! becomes ready once its last parent completes.
//!
//! Lookup failures are logged and produce an empty selection rather than an
//! error, so the caller can retry or stall gracefully.

use super::traits::{PersistenceResult, TaskProvider, WorkflowNodeProvider};
use crate::models::{find_children, ExecutionJob, ExecutionTask, LoopState, LoopStateHandler, WorkflowNode};
use crate::state_machine::ExecutionStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Chooses the next tasks to run in a container of type `C`
#[async_trait]
pub trait TaskSelector<C: Send + Sync>: Send + Sync {
    /// Tasks ready to start after `current_task` changed status.
    ///
    /// The selector may update the container (loop state, input values) and
    /// the returned tasks (transferred inputs); persisting those changes is
    /// up to the caller.
    async fn choose_next(&self, container: &mut C, current_task: Option<&ExecutionTask>) -> Vec<ExecutionTask>;
}

/// Task selector for whole jobs
pub struct DefaultJobTaskSelector {
    workflow_provider: Arc<dyn WorkflowNodeProvider>,
    task_provider: Arc<dyn TaskProvider>,
}

impl DefaultJobTaskSelector {
    pub fn new(workflow_provider: Arc<dyn WorkflowNodeProvider>, task_provider: Arc<dyn TaskProvider>) -> Self {
        Self {
            workflow_provider,
            task_provider,
        }
    }

    async fn candidates(&self, job: &ExecutionJob, current: &ExecutionTask) -> Vec<ExecutionTask> {
        if current.status != ExecutionStatus::Done {
            return Vec::new();
        }
        let node = match self.workflow_provider.get(current.workflow_node_id).await {
            Ok(Some(node)) => node,
            Ok(None) => {
                error!(
                    job_id = job.id,
                    node_id = current.workflow_node_id,
                    "No workflow node with id {} was found",
                    current.workflow_node_id
                );
                return Vec::new();
            }
            Err(e) => {
                error!(job_id = job.id, node_id = current.workflow_node_id, error = %e, "Workflow node lookup failed");
                return Vec::new();
            }
        };
        let nodes = match self.workflow_provider.list_by_workflow(node.workflow_id).await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(job_id = job.id, workflow_id = node.workflow_id, error = %e, "Workflow nodes lookup failed");
                return Vec::new();
            }
        };
        let children = find_children(&nodes, &node);
        if children.is_empty() {
            return Vec::new();
        }

        let resolver = ReadinessResolver {
            task_provider: self.task_provider.as_ref(),
            container_id: job.id,
            dependencies: &job.task_dependencies,
        };
        match resolver.ready_children(current, &children).await {
            Ok(ready) => ready,
            Err(e) => {
                error!(job_id = job.id, task_id = current.id, error = %e, "Task lookup failed during selection");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl TaskSelector<ExecutionJob> for DefaultJobTaskSelector {
    async fn choose_next(&self, job: &mut ExecutionJob, current_task: Option<&ExecutionTask>) -> Vec<ExecutionTask> {
        if job.tasks.is_empty() {
            return Vec::new();
        }
        match job.status {
            ExecutionStatus::Undetermined => job.first_task().cloned().into_iter().collect(),
            // a task is already in flight
            ExecutionStatus::QueuedActive => Vec::new(),
            ExecutionStatus::Suspended => job
                .find(ExecutionStatus::Suspended)
                .first()
                .map(|t| (*t).clone())
                .into_iter()
                .collect(),
            ExecutionStatus::Running => match current_task {
                Some(current) => self.candidates(job, current).await,
                None => Vec::new(),
            },
            ExecutionStatus::Done | ExecutionStatus::Failed | ExecutionStatus::Cancelled => Vec::new(),
        }
    }
}

/// Task selector for group tasks. The container is the group task itself.
pub struct DefaultGroupTaskSelector {
    workflow_provider: Arc<dyn WorkflowNodeProvider>,
    task_provider: Arc<dyn TaskProvider>,
}

impl DefaultGroupTaskSelector {
    pub fn new(workflow_provider: Arc<dyn WorkflowNodeProvider>, task_provider: Arc<dyn TaskProvider>) -> Self {
        Self {
            workflow_provider,
            task_provider,
        }
    }

    /// First sub-task of a group that has not started yet.
    ///
    /// When `current` is the last sub-task of the group (the end of a loop
    /// pass) the group inputs are remapped; otherwise the group is entered
    /// from `current` as in [`enter_group`].
    fn first_of_pass(group_task: &mut ExecutionTask, current: Option<&ExecutionTask>) -> Vec<ExecutionTask> {
        let closes_pass = match (group_task.as_group(), current) {
            (Some(group), Some(current)) => group.is_last(current.id),
            _ => false,
        };
        if closes_pass {
            group_task.remap_group_inputs();
        }
        prepare_first_sub_task(group_task, current, !closes_pass);
        group_task
            .as_group()
            .and_then(|group| group.first_task())
            .cloned()
            .into_iter()
            .collect()
    }

    async fn candidates(&self, group_task: &ExecutionTask, current: &ExecutionTask) -> Vec<ExecutionTask> {
        if current.status != ExecutionStatus::Done {
            return Vec::new();
        }
        let node = match self.workflow_provider.get(current.workflow_node_id).await {
            Ok(Some(node)) => node,
            Ok(None) | Err(_) => {
                error!(
                    group_id = group_task.id,
                    node_id = current.workflow_node_id,
                    "No workflow node with id {} was found",
                    current.workflow_node_id
                );
                return Vec::new();
            }
        };
        let node_group = match self.workflow_provider.get(group_task.workflow_node_id).await {
            Ok(Some(node_group)) if node_group.is_group() => node_group,
            _ => {
                error!(
                    group_id = group_task.id,
                    node_id = group_task.workflow_node_id,
                    "No workflow node group with id {} was found",
                    group_task.workflow_node_id
                );
                return Vec::new();
            }
        };
        let members = match self.group_members(&node_group).await {
            Ok(members) => members,
            Err(e) => {
                error!(group_id = group_task.id, error = %e, "Node group members lookup failed");
                return Vec::new();
            }
        };
        let children = find_children(&members, &node);
        if children.is_empty() {
            return Vec::new();
        }

        let no_dependencies = HashMap::new();
        let resolver = ReadinessResolver {
            task_provider: self.task_provider.as_ref(),
            container_id: group_task.id,
            dependencies: &no_dependencies,
        };
        match resolver.ready_children(current, &children).await {
            Ok(ready) => ready,
            Err(e) => {
                error!(group_id = group_task.id, task_id = current.id, error = %e, "Task lookup failed during selection");
                Vec::new()
            }
        }
    }

    async fn group_members(&self, node_group: &WorkflowNode) -> PersistenceResult<Vec<WorkflowNode>> {
        let mut members = Vec::new();
        for member_id in node_group.group_node_ids.iter().flatten() {
            match self.workflow_provider.get(*member_id).await? {
                Some(member) => members.push(member),
                None => warn!(node_id = member_id, group_node_id = node_group.id, "Missing node group member"),
            }
        }
        Ok(members)
    }
}

#[async_trait]
impl TaskSelector<ExecutionTask> for DefaultGroupTaskSelector {
    async fn choose_next(
        &self,
        group_task: &mut ExecutionTask,
        current_task: Option<&ExecutionTask>,
    ) -> Vec<ExecutionTask> {
        let has_tasks = group_task.as_group().is_some_and(|g| !g.tasks.is_empty());
        if !has_tasks {
            return Vec::new();
        }
        match group_task.status {
            ExecutionStatus::Undetermined => Self::first_of_pass(group_task, current_task),
            ExecutionStatus::QueuedActive => Vec::new(),
            ExecutionStatus::Suspended => group_task
                .as_group()
                .and_then(|g| g.tasks.iter().find(|t| t.status == ExecutionStatus::Suspended))
                .cloned()
                .into_iter()
                .collect(),
            ExecutionStatus::Running => match current_task {
                Some(current) => self.candidates(group_task, current).await,
                None => Vec::new(),
            },
            ExecutionStatus::Done | ExecutionStatus::Failed | ExecutionStatus::Cancelled => Vec::new(),
        }
    }
}

/// Readiness checks and output transfer for the children of a completed task
struct ReadinessResolver<'a> {
    task_provider: &'a dyn TaskProvider,
    container_id: i64,
    /// Explicit task dependencies: task id -> parent task ids
    dependencies: &'a HashMap<i64, Vec<i64>>,
}

impl ReadinessResolver<'_> {
    async fn ready_children(
        &self,
        current: &ExecutionTask,
        children: &[&WorkflowNode],
    ) -> PersistenceResult<Vec<ExecutionTask>> {
        let mut ready = Vec::new();
        for node in children {
            let Some(mut child) = self
                .task_provider
                .get_by_container_and_node(self.container_id, node.id, current.instance_id)
                .await?
            else {
                warn!(
                    container_id = self.container_id,
                    node_id = node.id,
                    instance_id = current.instance_id,
                    "No task found for child node"
                );
                continue;
            };
            if child.status.is_active() {
                continue;
            }

            let Some(parents) = self.completed_parents(current, node, &child).await? else {
                debug!(task_id = child.id, "Not all the ancestors of the task have completed");
                continue;
            };
            transfer_parent_outputs(&mut child, node, &parents);
            if child.is_group() {
                enter_group(&mut child, current);
            }
            ready.push(child);
        }
        Ok(ready)
    }

    /// Parent tasks of `child` keyed by node id, or `None` when any of them
    /// (graph or explicit dependency) is not DONE.
    async fn completed_parents(
        &self,
        current: &ExecutionTask,
        node: &WorkflowNode,
        child: &ExecutionTask,
    ) -> PersistenceResult<Option<HashMap<i64, ExecutionTask>>> {
        let mut parents = HashMap::new();
        for parent_node_id in node.parent_ids() {
            let parent = if parent_node_id == current.workflow_node_id {
                Some(current.clone())
            } else {
                self.task_provider
                    .get_by_container_and_node(self.container_id, parent_node_id, child.instance_id)
                    .await?
            };
            match parent {
                Some(parent) if parent.status.satisfies_dependencies() => {
                    parents.insert(parent_node_id, parent);
                }
                _ => return Ok(None),
            }
        }

        if let Some(dependency_ids) = self.dependencies.get(&child.id) {
            for parent_id in dependency_ids {
                let done = if *parent_id == current.id {
                    current.status.satisfies_dependencies()
                } else {
                    self.task_provider
                        .get(*parent_id)
                        .await?
                        .is_some_and(|p| p.status.satisfies_dependencies())
                };
                if !done {
                    return Ok(None);
                }
            }
        }
        Ok(Some(parents))
    }
}

/// Prepare a group that is about to start after `source` completed.
///
/// The outputs of `source` become inputs of the first sub-task. A nested
/// group in first position gets a loop handler with one pass per output of
/// `source` (its target cardinality) and its inputs sliced to the first pass.
pub fn enter_group(group_task: &mut ExecutionTask, source: &ExecutionTask) {
    prepare_first_sub_task(group_task, Some(source), true);
}

fn prepare_first_sub_task(group_task: &mut ExecutionTask, source: Option<&ExecutionTask>, transfer_outputs: bool) {
    let group_id = group_task.id;
    let Some(first) = group_task.as_group_mut().and_then(|group| group.tasks.first_mut()) else {
        return;
    };
    if transfer_outputs {
        if let Some(source) = source {
            for output in &source.output_parameter_values {
                first.set_input_parameter_value(&output.key, output.value.clone());
            }
        }
    }
    if !first.is_group() {
        return;
    }
    let cardinality = match source.and_then(ExecutionTask::target_cardinality) {
        Some(cardinality) => cardinality,
        None => {
            warn!(group_id = group_id, "No target cardinality for loop group, assuming a single pass");
            1
        }
    };
    if let Some(nested) = first.as_group_mut() {
        nested.state_handler = Some(LoopStateHandler::new(LoopState::new(cardinality, 1)));
    }
    first.remap_group_inputs();
}

/// Copy each linked parent output into the matching input of `child`.
///
/// Data-source outputs are not pushed into groups; groups receive their
/// inputs through the loop mapping instead.
pub fn transfer_parent_outputs(
    child: &mut ExecutionTask,
    node: &WorkflowNode,
    parents: &HashMap<i64, ExecutionTask>,
) {
    for link in &node.incoming_links {
        let Some(parent) = parents.get(&link.source_node_id) else {
            continue;
        };
        if parent.is_data_source() && child.is_group() {
            continue;
        }
        match parent.output_value(&link.source_output) {
            Some(value) => {
                child.set_input_parameter_value(&link.target_input, Some(value.to_string()));
            }
            None => warn!(
                task_id = parent.id,
                output = %link.source_output,
                "No output was set for parent task"
            ),
        }
    }
}
