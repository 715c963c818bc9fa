//! # Orchestrator
//!
//! Entry point for job lifecycle operations. Owns the active-job counter that
//! bounds how many jobs the queue worker may have in flight, applies job
//! commands by id, and reacts to task status changes reported by the
//! execution backend by propagating them and starting the next ready tasks.
//!
//! Every load-modify-persist cycle on a job runs under a per-job async lock,
//! so concurrent reports for tasks of the same job are applied one at a time.

use super::status_handler::propagate_task_status;
use super::task_selector::{DefaultGroupTaskSelector, DefaultJobTaskSelector, TaskSelector};
use super::traits::WorkflowNodeProvider;
use crate::config::WorkerConfig;
use crate::error::{OrchestrationError, Result};
use crate::logging::{log_error, log_job_operation};
use crate::models::{ExecutionJob, ExecutionTask};
use crate::state_machine::{CommandContext, CommandError, ExecutionStatus, JobCommand, TaskCommand};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

/// Outcome of starting each selected task
type StartResults = Vec<(i64, std::result::Result<(), CommandError>)>;

/// Job lifecycle coordinator
pub struct Orchestrator {
    context: CommandContext,
    job_selector: Box<dyn TaskSelector<ExecutionJob>>,
    group_selector: Box<dyn TaskSelector<ExecutionTask>>,
    active_jobs: AtomicUsize,
    maximum_allowed_jobs: usize,
    job_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Orchestrator {
    pub fn new(
        context: CommandContext,
        workflow_provider: Arc<dyn WorkflowNodeProvider>,
        maximum_allowed_jobs: usize,
    ) -> Self {
        let job_selector = DefaultJobTaskSelector::new(workflow_provider.clone(), context.task_provider.clone());
        let group_selector = DefaultGroupTaskSelector::new(workflow_provider, context.task_provider.clone());
        Self::with_selectors(
            context,
            Box::new(job_selector),
            Box::new(group_selector),
            maximum_allowed_jobs,
        )
    }

    pub fn with_selectors(
        context: CommandContext,
        job_selector: Box<dyn TaskSelector<ExecutionJob>>,
        group_selector: Box<dyn TaskSelector<ExecutionTask>>,
        maximum_allowed_jobs: usize,
    ) -> Self {
        Self {
            context,
            job_selector,
            group_selector,
            active_jobs: AtomicUsize::new(0),
            maximum_allowed_jobs,
            job_locks: DashMap::new(),
        }
    }

    pub fn from_config(
        context: CommandContext,
        workflow_provider: Arc<dyn WorkflowNodeProvider>,
        config: &WorkerConfig,
    ) -> Self {
        Self::new(context, workflow_provider, config.max_jobs())
    }

    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::Acquire)
    }

    pub fn maximum_allowed_jobs(&self) -> usize {
        self.maximum_allowed_jobs
    }

    pub fn has_capacity(&self) -> bool {
        self.active_jobs() < self.maximum_allowed_jobs
    }

    /// Count one more active job; returns the new count
    pub fn increment_active_jobs(&self) -> usize {
        self.active_jobs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count one less active job, never going below zero; returns the new count
    pub fn decrement_active_jobs(&self) -> usize {
        let previous = self
            .active_jobs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| Some(count.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// Start a job, claiming an active slot for it.
    ///
    /// When START fails the job is cancelled and the slot released before the
    /// error is returned.
    #[instrument(skip(self, job), fields(job_id = job.id, user_id = %job.user_id))]
    pub async fn launch(&self, job: &mut ExecutionJob) -> Result<()> {
        let active = self.increment_active_jobs();
        debug!(active_jobs = active, "Launching job");
        let _guard = self.lock_job(job.id).await;
        match JobCommand::Start.apply_to(job, &self.context).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(job_id = job.id, user_id = %job.user_id, error = %e, "Job could not be started");
                if let Err(cancel_error) = self.cancel_job(job).await {
                    log_error("orchestrator", "cancel_job", &cancel_error.to_string(), Some(&job.name));
                }
                self.decrement_active_jobs();
                self.release_job_lock(job.id);
                Err(e.into())
            }
        }
    }

    /// Load and start a job
    pub async fn start_job(&self, job_id: i64) -> Result<()> {
        let mut job = self.load_job(job_id).await?;
        self.launch(&mut job).await
    }

    pub async fn stop_job(&self, job_id: i64) -> Result<()> {
        self.apply_job_command(job_id, JobCommand::Stop).await
    }

    pub async fn suspend_job(&self, job_id: i64) -> Result<()> {
        self.apply_job_command(job_id, JobCommand::Suspend).await
    }

    pub async fn resume_job(&self, job_id: i64) -> Result<()> {
        self.apply_job_command(job_id, JobCommand::Resume).await
    }

    /// Mark a job CANCELLED and persist it
    pub async fn cancel_job(&self, job: &mut ExecutionJob) -> Result<()> {
        job.status = ExecutionStatus::Cancelled;
        job.end_time = Some(Utc::now());
        self.context.job_provider.update(job).await?;
        log_job_operation("cancel", job.id, Some(&job.user_id), &job.status.to_string(), None);
        Ok(())
    }

    /// Handle a status change reported for a task.
    ///
    /// The change is propagated through the task's groups to its job and
    /// persisted. When the task completed, the next ready tasks are started;
    /// a task that fails to start is handled as a FAILED status change.
    /// Returns the ids of the tasks that were started.
    #[instrument(skip(self))]
    pub async fn on_task_status_changed(&self, task_id: i64, status: ExecutionStatus) -> Result<Vec<i64>> {
        let mut started = Vec::new();
        let mut pending = VecDeque::from([(task_id, status)]);
        while let Some((task_id, status)) = pending.pop_front() {
            for (next_id, result) in self.process_status_change(task_id, status).await? {
                match result {
                    Ok(()) => started.push(next_id),
                    Err(e) => {
                        log_error("orchestrator", "start_task", &e.to_string(), None);
                        pending.push_back((next_id, ExecutionStatus::Failed));
                    }
                }
            }
        }
        Ok(started)
    }

    async fn process_status_change(
        &self,
        task_id: i64,
        status: ExecutionStatus,
    ) -> Result<StartResults> {
        let task = self
            .context
            .task_provider
            .get(task_id)
            .await?
            .ok_or(OrchestrationError::TaskNotFound { task_id })?;
        let _guard = self.lock_job(task.job_id).await;
        let mut job = self.load_job(task.job_id).await?;

        let propagation =
            propagate_task_status(&mut job, task_id, status).ok_or(OrchestrationError::TaskNotFound { task_id })?;
        self.context.job_provider.update(&job).await?;
        debug!(
            task_id = task_id,
            status = %status,
            job_id = job.id,
            job_status = %job.status,
            "Task status change propagated"
        );

        if propagation.job_became_terminal() {
            let active = self.decrement_active_jobs();
            self.release_job_lock(job.id);
            info!(job_id = job.id, status = %job.status, active_jobs = active, "Job finished");
        }
        if status != ExecutionStatus::Done {
            return Ok(Vec::new());
        }

        let next_tasks = self.choose_next(&mut job, task_id, task.group_id).await?;
        if next_tasks.is_empty() {
            debug!(task_id = task_id, "No more child tasks to execute after the current task");
        }
        let mut results = Vec::with_capacity(next_tasks.len());
        for mut next in next_tasks {
            let result = TaskCommand::Start.apply_to(&mut next, &self.context).await;
            results.push((next.id, result));
        }
        Ok(results)
    }

    /// Next tasks after `task_id` completed, from its group or its job.
    ///
    /// A group that completed with this task hands over to its own container,
    /// up to the job level.
    async fn choose_next(
        &self,
        job: &mut ExecutionJob,
        task_id: i64,
        group_id: Option<i64>,
    ) -> Result<Vec<ExecutionTask>> {
        let mut current = job
            .find_task(task_id)
            .cloned()
            .ok_or(OrchestrationError::TaskNotFound { task_id })?;
        let mut container = group_id;

        while let Some(group_id) = container {
            let mut group_task = job
                .find_task(group_id)
                .cloned()
                .ok_or(OrchestrationError::TaskNotFound { task_id: group_id })?;

            let next = self.group_selector.choose_next(&mut group_task, Some(&current)).await;
            if !next.is_empty() {
                // loop state or remapped inputs may have changed
                self.context.task_provider.update(&group_task).await?;
                return Ok(next);
            }
            if group_task.status != ExecutionStatus::Done {
                return Ok(Vec::new());
            }
            container = group_task.group_id;
            current = group_task;
        }
        Ok(self.job_selector.choose_next(job, Some(&current)).await)
    }

    async fn apply_job_command(&self, job_id: i64, command: JobCommand) -> Result<()> {
        let _guard = self.lock_job(job_id).await;
        let mut job = self.load_job(job_id).await?;
        let was_terminal = job.status.is_terminal();
        let result = command.apply_to(&mut job, &self.context).await;
        if !was_terminal && job.status.is_terminal() {
            self.decrement_active_jobs();
            self.release_job_lock(job_id);
        }
        result.map_err(Into::into)
    }

    async fn lock_job(&self, job_id: i64) -> OwnedMutexGuard<()> {
        // clone the lock out so no map shard stays borrowed across the await
        let lock = self.job_locks.entry(job_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Forget the lock of a finished job. A holder keeps its own handle.
    fn release_job_lock(&self, job_id: i64) {
        self.job_locks.remove(&job_id);
    }

    async fn load_job(&self, job_id: i64) -> Result<ExecutionJob> {
        self.context
            .job_provider
            .get(job_id)
            .await?
            .ok_or(OrchestrationError::JobNotFound { job_id })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("active_jobs", &self.active_jobs())
            .field("maximum_allowed_jobs", &self.maximum_allowed_jobs)
            .field("locked_jobs", &self.job_locks.len())
            .finish_non_exhaustive()
    }
}
