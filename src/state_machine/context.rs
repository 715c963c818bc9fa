use crate::orchestration::traits::{ExecutionBackend, JobProvider, TaskProvider};
use std::sync::Arc;

/// Collaborators a command needs to perform its action and persist the result
#[derive(Clone)]
pub struct CommandContext {
    pub backend: Arc<dyn ExecutionBackend>,
    pub job_provider: Arc<dyn JobProvider>,
    pub task_provider: Arc<dyn TaskProvider>,
}

impl CommandContext {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        job_provider: Arc<dyn JobProvider>,
        task_provider: Arc<dyn TaskProvider>,
    ) -> Self {
        Self {
            backend,
            job_provider,
            task_provider,
        }
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext").finish_non_exhaustive()
    }
}
