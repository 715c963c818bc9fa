//! Shared fixtures for the integration tests

#![allow(dead_code)]

pub mod builders;
pub mod strategies;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tao_orchestration::models::{ExecutionJob, ExecutionTask};
use tao_orchestration::orchestration::{BackendError, BackendResult, ExecutionBackend, JobProvider, PersistenceResult};
use tao_orchestration::state_machine::ExecutionStatus;
use tao_orchestration::persistence::InMemoryExecutionStore;
use tao_orchestration::state_machine::CommandContext;

pub use builders::*;

/// Execution backend that records every call and rejects configured tasks
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<(&'static str, i64)>>,
    failing: Mutex<HashSet<i64>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call for `task_id` fail
    pub fn fail_on(&self, task_id: i64) {
        self.failing.lock().insert(task_id);
    }

    pub fn calls(&self) -> Vec<(&'static str, i64)> {
        self.calls.lock().clone()
    }

    /// Ids of the tasks passed to `execute`, in call order
    pub fn executed(&self) -> Vec<i64> {
        self.calls
            .lock()
            .iter()
            .filter(|(op, _)| *op == "execute")
            .map(|(_, id)| *id)
            .collect()
    }

    fn record(&self, op: &'static str, task: &ExecutionTask) -> BackendResult<()> {
        self.calls.lock().push((op, task.id));
        if self.failing.lock().contains(&task.id) {
            return Err(BackendError::Rejected {
                task_id: task.id,
                reason: format!("{op} refused"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for RecordingBackend {
    async fn execute(&self, task: &ExecutionTask) -> BackendResult<()> {
        self.record("execute", task)
    }

    async fn stop(&self, task: &ExecutionTask) -> BackendResult<()> {
        self.record("stop", task)
    }

    async fn suspend(&self, task: &ExecutionTask) -> BackendResult<()> {
        self.record("suspend", task)
    }

    async fn resume(&self, task: &ExecutionTask) -> BackendResult<()> {
        self.record("resume", task)
    }
}

/// Store, backend and a command context wired to both
pub struct TestHarness {
    pub store: Arc<InMemoryExecutionStore>,
    pub backend: Arc<RecordingBackend>,
    pub context: CommandContext,
}

impl TestHarness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryExecutionStore::new());
        let backend = Arc::new(RecordingBackend::new());
        let context = CommandContext::new(backend.clone(), store.clone(), store.clone());
        Self {
            store,
            backend,
            context,
        }
    }
}

/// Job provider whose reads take a while, widening the window between
/// loading a job and writing it back
#[derive(Debug)]
pub struct SlowJobProvider {
    inner: Arc<InMemoryExecutionStore>,
    delay: Duration,
}

impl SlowJobProvider {
    pub fn new(inner: Arc<InMemoryExecutionStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl JobProvider for SlowJobProvider {
    async fn get(&self, job_id: i64) -> PersistenceResult<Option<ExecutionJob>> {
        let job = JobProvider::get(self.inner.as_ref(), job_id).await;
        tokio::time::sleep(self.delay).await;
        job
    }

    async fn list_by_status(&self, statuses: &[ExecutionStatus]) -> PersistenceResult<Vec<ExecutionJob>> {
        self.inner.list_by_status(statuses).await
    }

    async fn update(&self, job: &ExecutionJob) -> PersistenceResult<()> {
        JobProvider::update(self.inner.as_ref(), job).await
    }
}
