//! # Execution Tasks
//!
//! A task is the unit of work bound to one workflow node and one execution
//! instance. Tasks are a closed set of variants sharing a common header;
//! [`TaskKind::Group`] carries a nested, ordered list of sub-tasks together with
//! the loop state used for repeated execution of the sub-graph.

use super::variable::{lookup, upsert, Variable};
use crate::state_machine::ExecutionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variant-specific part of an execution task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Runs a processing component
    Processing {
        /// Declared output cardinality of the component
        target_cardinality: i32,
    },
    /// Queries or fetches from a data source
    DataSource,
    /// Invokes a remote web processing service
    WebService,
    /// Runs a user script
    Script,
    /// Contains a sub-list of tasks (sub-workflow or loop body)
    Group(ExecutionGroup),
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Processing { .. } => "processing",
            Self::DataSource => "data_source",
            Self::WebService => "web_service",
            Self::Script => "script",
            Self::Group(_) => "group",
        }
    }
}

/// Loop position of a group that executes its body repeatedly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopState {
    /// Number of passes to perform
    pub limit: i32,
    /// Current pass, 1-based
    pub current: i32,
}

impl LoopState {
    pub fn new(limit: i32, current: i32) -> Self {
        Self { limit, current }
    }
}

/// Drives the loop state of an execution group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStateHandler {
    state: LoopState,
}

impl LoopStateHandler {
    pub fn new(state: LoopState) -> Self {
        Self { state }
    }

    pub fn current_state(&self) -> LoopState {
        self.state
    }

    /// Advance to the next pass, if the limit allows another one
    pub fn next_state(&mut self) -> Option<LoopState> {
        if self.state.current + 1 <= self.state.limit {
            self.state.current += 1;
            Some(self.state)
        } else {
            None
        }
    }

    /// Map group inputs onto the current pass.
    ///
    /// Values holding a JSON array are sliced to the element of the current
    /// pass; scalar values are passed through unchanged.
    pub fn map_inputs(&self, inputs: &[Variable]) -> Vec<Variable> {
        inputs
            .iter()
            .map(|input| Variable {
                key: input.key.clone(),
                value: input
                    .value
                    .as_deref()
                    .and_then(|value| list_value(value, self.state.current)),
            })
            .collect()
    }
}

fn list_value(value: &str, index: i32) -> Option<String> {
    match serde_json::from_str::<Vec<serde_json::Value>>(value) {
        Ok(items) => usize::try_from(index - 1)
            .ok()
            .and_then(|position| items.get(position))
            .map(|item| match item {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        Err(_) => Some(value.to_string()),
    }
}

/// Task that owns an ordered list of sub-tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionGroup {
    pub tasks: Vec<ExecutionTask>,
    pub state_handler: Option<LoopStateHandler>,
}

impl ExecutionGroup {
    pub fn new(tasks: Vec<ExecutionTask>) -> Self {
        Self {
            tasks,
            state_handler: None,
        }
    }

    pub fn first_task(&self) -> Option<&ExecutionTask> {
        self.tasks.first()
    }

    pub fn last_task(&self) -> Option<&ExecutionTask> {
        self.tasks.last()
    }

    /// Add a sub-task unless one with the same id is already present
    pub fn add_task(&mut self, task: ExecutionTask) {
        if !self.tasks.iter().any(|t| t.id == task.id) {
            self.tasks.push(task);
        }
    }

    pub fn get_by_workflow_node(&self, workflow_node_id: i64) -> Option<&ExecutionTask> {
        self.tasks
            .iter()
            .find(|t| t.workflow_node_id == workflow_node_id)
    }

    pub fn is_last(&self, task_id: i64) -> bool {
        self.last_task().is_some_and(|t| t.id == task_id)
    }
}

/// Unit of work bound to one workflow node and one execution instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTask {
    pub id: i64,
    /// Owning job
    pub job_id: i64,
    /// Owning group, for sub-tasks
    pub group_id: Option<i64>,
    pub workflow_node_id: i64,
    /// Replica number for parallel or looped execution
    pub instance_id: i32,
    /// Depth of the node in the workflow graph (root nodes are level 1)
    pub level: i32,
    pub status: ExecutionStatus,
    pub input_parameter_values: Vec<Variable>,
    pub output_parameter_values: Vec<Variable>,
    pub resource_id: Option<String>,
    pub execution_node_host_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub kind: TaskKind,
}

impl ExecutionTask {
    pub fn new(id: i64, job_id: i64, workflow_node_id: i64, kind: TaskKind) -> Self {
        Self {
            id,
            job_id,
            group_id: None,
            workflow_node_id,
            instance_id: 0,
            level: 1,
            status: ExecutionStatus::Undetermined,
            input_parameter_values: Vec::new(),
            output_parameter_values: Vec::new(),
            resource_id: None,
            execution_node_host_name: None,
            start_time: None,
            end_time: None,
            kind,
        }
    }

    /// Id of the container (job or group) this task is listed in
    pub fn container_id(&self) -> i64 {
        self.group_id.unwrap_or(self.job_id)
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, TaskKind::Group(_))
    }

    pub fn is_data_source(&self) -> bool {
        matches!(self.kind, TaskKind::DataSource)
    }

    pub fn as_group(&self) -> Option<&ExecutionGroup> {
        match &self.kind {
            TaskKind::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut ExecutionGroup> {
        match &mut self.kind {
            TaskKind::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Declared output cardinality, for processing tasks
    pub fn target_cardinality(&self) -> Option<i32> {
        match self.kind {
            TaskKind::Processing { target_cardinality } => Some(target_cardinality),
            _ => None,
        }
    }

    pub fn input_value(&self, key: &str) -> Option<&str> {
        lookup(&self.input_parameter_values, key)
    }

    pub fn output_value(&self, key: &str) -> Option<&str> {
        lookup(&self.output_parameter_values, key)
    }

    pub fn set_input_parameter_value(&mut self, key: &str, value: Option<String>) {
        upsert(&mut self.input_parameter_values, key, value);
    }

    pub fn set_output_parameter_value(&mut self, key: &str, value: Option<String>) {
        upsert(&mut self.output_parameter_values, key, value);
    }

    /// Push this group's inputs down to its first-level sub-tasks.
    ///
    /// With a loop handler installed the inputs are sliced to the current
    /// pass. Does nothing for non-group tasks.
    pub fn remap_group_inputs(&mut self) {
        let level = self.level;
        let inputs = self.input_parameter_values.clone();
        let Some(group) = self.as_group_mut() else {
            return;
        };
        let mapped = match &group.state_handler {
            Some(handler) => handler.map_inputs(&inputs),
            None => inputs,
        };
        let has_level_markers = group.tasks.iter().any(|t| t.level == level + 1);
        for (index, task) in group.tasks.iter_mut().enumerate() {
            let first_level = if has_level_markers {
                task.level == level + 1
            } else {
                index == 0
            };
            if first_level {
                task.input_parameter_values = mapped.clone();
            }
        }
    }

    /// Find a task by id in this task or, for groups, anywhere below it
    pub fn find(&self, task_id: i64) -> Option<&ExecutionTask> {
        if self.id == task_id {
            return Some(self);
        }
        self.as_group()
            .and_then(|group| group.tasks.iter().find_map(|t| t.find(task_id)))
    }

    pub fn find_mut(&mut self, task_id: i64) -> Option<&mut ExecutionTask> {
        if self.id == task_id {
            return Some(self);
        }
        match &mut self.kind {
            TaskKind::Group(group) => group.tasks.iter_mut().find_map(|t| t.find_mut(task_id)),
            _ => None,
        }
    }
}
