//! # Job Queue Worker
//!
//! Background loop that drains the [`JobQueue`] and hands each dequeued job
//! to the [`Orchestrator`], as long as the number of active jobs stays below
//! the orchestrator's limit.
//!
//! After a job is launched the worker can be told which user owned it; the
//! next dequeue then prefers a job of any other user, so a single user with
//! a long backlog cannot monopolize the free slots.

use super::{JobQueue, QueueError};
use crate::config::WorkerConfig;
use crate::orchestration::Orchestrator;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Long-running consumer of the job queue
pub struct JobQueueWorker {
    id: Uuid,
    queue: Arc<JobQueue>,
    orchestrator: Arc<Orchestrator>,
    wait_interval: Duration,
    paused: AtomicBool,
    stopped: AtomicBool,
    monitor: Notify,
    last_user_id: Mutex<Option<String>>,
}

impl JobQueueWorker {
    pub fn new(queue: Arc<JobQueue>, orchestrator: Arc<Orchestrator>, config: &WorkerConfig) -> Self {
        Self::with_wait_interval(queue, orchestrator, config.wait_interval())
    }

    pub fn with_wait_interval(queue: Arc<JobQueue>, orchestrator: Arc<Orchestrator>, wait_interval: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue,
            orchestrator,
            wait_interval,
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            monitor: Notify::new(),
            last_user_id: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Spawn the worker loop on the current runtime
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.run().await })
    }

    /// Run until interrupted
    #[instrument(skip(self), fields(worker_id = %self.id))]
    pub async fn run(&self) {
        info!(
            max_jobs = self.orchestrator.maximum_allowed_jobs(),
            selector = self.queue.selector_name(),
            "Job queue worker started"
        );
        while !self.is_stopped() {
            if self.is_paused() {
                self.wait().await;
                continue;
            }
            if !self.orchestrator.has_capacity() {
                debug!(
                    active_jobs = self.orchestrator.active_jobs(),
                    max_jobs = self.orchestrator.maximum_allowed_jobs(),
                    "Maximum active jobs reached, waiting"
                );
                self.wait().await;
                continue;
            }

            let last_user = self.last_user_id.lock().take();
            match self.queue.take_except(last_user.as_deref()).await {
                Ok(Some(mut job)) => {
                    debug!(job_id = job.id, user_id = %job.user_id, "Dequeued job");
                    if let Err(e) = self.orchestrator.launch(&mut job).await {
                        warn!(job_id = job.id, error = %e, "Dequeued job could not be launched");
                    }
                }
                Ok(None) => {}
                Err(QueueError::Interrupted) => break,
                Err(e) => {
                    warn!(error = %e, "Job queue read failed");
                    self.wait().await;
                }
            }
        }
        info!("Job queue worker stopped");
    }

    pub fn pause_work(&self) {
        self.paused.store(true, Ordering::Release);
        info!(worker_id = %self.id, "Job queue worker paused");
    }

    pub fn resume_work(&self) {
        self.paused.store(false, Ordering::Release);
        self.monitor.notify_waiters();
        info!(worker_id = %self.id, "Job queue worker resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop the loop, waking it from any wait or blocking take
    pub fn interrupt(&self) {
        self.stopped.store(true, Ordering::Release);
        self.monitor.notify_waiters();
        self.queue.interrupt();
    }

    /// Prefer a job of another user on the next dequeue
    pub fn set_last_user_id(&self, user_id: impl Into<String>) {
        *self.last_user_id.lock() = Some(user_id.into());
    }

    /// Wake the loop early, e.g. after a job finished and freed a slot
    pub fn notify(&self) {
        self.monitor.notify_waiters();
    }

    async fn wait(&self) {
        let woken = self.monitor.notified();
        tokio::pin!(woken);
        woken.as_mut().enable();
        if self.is_stopped() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.wait_interval) => {}
            _ = &mut woken => {}
        }
    }
}

impl std::fmt::Debug for JobQueueWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueueWorker")
            .field("id", &self.id)
            .field("wait_interval", &self.wait_interval)
            .field("paused", &self.is_paused())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
