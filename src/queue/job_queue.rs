//! # Job Queue
//!
//! Durable queue of `(job id, user id)` entries with per-user fairness
//! operations and blocking dequeues.
//!
//! All mutations run under one lock and are written through to the queue
//! file. Blocking takes never hold the lock while waiting: they poll with a
//! fixed backoff, wake early when an entry is added, and return
//! [`QueueError::Interrupted`] once [`JobQueue::interrupt`] is called. Job
//! records are fetched from the [`JobProvider`] only after the lock has been
//! released.

use super::file_queue::PersistentQueue;
use super::job_selector::{JobSelectionStrategy, JobSelectorRegistry};
use super::{QueueError, QueueResult};
use crate::config::OrchestrationConfig;
use crate::constants::status_groups;
use crate::logging::log_queue_operation;
use crate::models::{ExecutionJob, QueueEntry};
use crate::orchestration::traits::JobProvider;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

/// Durable, user-fair job queue
pub struct JobQueue {
    entries: Mutex<PersistentQueue<QueueEntry>>,
    job_provider: Arc<dyn JobProvider>,
    selector: Box<dyn JobSelectionStrategy>,
    poll_interval: Duration,
    interrupted: AtomicBool,
    changed: Notify,
}

impl JobQueue {
    pub fn new(
        path: impl Into<PathBuf>,
        job_provider: Arc<dyn JobProvider>,
        selector: Box<dyn JobSelectionStrategy>,
        poll_interval: Duration,
    ) -> QueueResult<Self> {
        let entries = PersistentQueue::open_job_queue(path)?;
        info!(
            path = %entries.path().display(),
            queued = entries.len(),
            selector = selector.name(),
            "Job queue opened"
        );
        Ok(Self {
            entries: Mutex::new(entries),
            job_provider,
            selector,
            poll_interval,
            interrupted: AtomicBool::new(false),
            changed: Notify::new(),
        })
    }

    /// Queue at the configured location, with the configured selector
    pub fn from_config(config: &OrchestrationConfig, job_provider: Arc<dyn JobProvider>) -> QueueResult<Self> {
        let selector = JobSelectorRegistry::new().resolve(&config.job.selector);
        Self::new(
            config.queue.queue_file(),
            job_provider,
            selector,
            config.queue.poll_interval(),
        )
    }

    pub fn selector_name(&self) -> &'static str {
        self.selector.name()
    }

    /// Re-queue jobs left QUEUED_ACTIVE or RUNNING by a previous process.
    ///
    /// Each job is reset to UNDETERMINED without start or end time, persisted
    /// and put back in the queue. Returns the number of re-queued jobs.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> QueueResult<usize> {
        let jobs = self
            .job_provider
            .list_by_status(status_groups::RECOVERABLE_JOB_STATES)
            .await?;
        let mut requeued = 0;
        for mut job in jobs {
            job.reset();
            match self.job_provider.update(&job).await {
                Ok(()) => debug!(job_id = job.id, "Job was reset to UNDETERMINED"),
                Err(e) => warn!(job_id = job.id, error = %e, "Error resetting job"),
            }
            self.put(&job)?;
            requeued += 1;
        }
        info!(requeued = requeued, "Job queue initialized");
        Ok(requeued)
    }

    /// Append a job; a job already queued is not added twice.
    ///
    /// Returns the queue size. Because repeated puts are ignored, the size is
    /// the number of puts that added an entry minus the successful removes,
    /// not the raw number of puts.
    pub fn put(&self, job: &ExecutionJob) -> QueueResult<usize> {
        let size = {
            let mut entries = self.entries.lock();
            if entries.position(|e| e.job_id == job.id).is_none() {
                entries.push_back(QueueEntry::new(job.id, job.user_id.clone()))?;
            }
            entries.len()
        };
        log_queue_operation("put", Some(job.id), Some(&job.user_id), size, Some(&job.status.to_string()));
        self.changed.notify_waiters();
        Ok(size)
    }

    /// Remove every entry of a job
    pub fn remove_job(&self, job_id: i64) -> QueueResult<bool> {
        let mut entries = self.entries.lock();
        let removed = entries.remove_where(|e| e.job_id == job_id)?;
        Ok(!removed.is_empty())
    }

    /// Remove a job only when it belongs to `user_id`
    pub fn remove_job_for_user(&self, user_id: &str, job_id: i64) -> QueueResult<bool> {
        let mut entries = self.entries.lock();
        let removed = entries.remove_where(|e| e.job_id == job_id && e.belongs_to(user_id))?;
        Ok(!removed.is_empty())
    }

    /// Remove and return the jobs of a user, or every job when `user_id` is `None`
    pub fn remove_user_jobs(&self, user_id: Option<&str>) -> QueueResult<Vec<i64>> {
        let mut entries = self.entries.lock();
        let removed = entries.remove_where(|e| user_id.map_or(true, |user| e.belongs_to(user)))?;
        Ok(removed.into_iter().map(|e| e.job_id).collect())
    }

    /// Swap a job with the entry right before it.
    ///
    /// Returns whether the queue changed.
    pub fn move_job_to_head(&self, job_id: i64) -> QueueResult<bool> {
        let mut entries = self.entries.lock();
        match entries.position(|e| e.job_id == job_id) {
            Some(index) if index > 0 => {
                entries.swap(index, index - 1)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Swap a job with the nearest earlier entry of the same user.
    ///
    /// Entries of other users keep their positions.
    pub fn move_user_job_to_head(&self, user_id: &str, job_id: i64) -> QueueResult<bool> {
        let mut entries = self.entries.lock();
        let Some(index) = entries.position(|e| e.job_id == job_id && e.belongs_to(user_id)) else {
            return Ok(false);
        };
        let previous = entries
            .items()
            .range(..index)
            .rposition(|e| e.belongs_to(user_id));
        match previous {
            Some(previous) => {
                entries.swap(index, previous)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Swap a job with the entry right after it
    pub fn move_job_to_tail(&self, job_id: i64) -> QueueResult<bool> {
        let mut entries = self.entries.lock();
        match entries.position(|e| e.job_id == job_id) {
            Some(index) if index + 1 < entries.len() => {
                entries.swap(index, index + 1)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Swap a job with the nearest later entry of the same user
    pub fn move_user_job_to_tail(&self, user_id: &str, job_id: i64) -> QueueResult<bool> {
        let mut entries = self.entries.lock();
        let Some(index) = entries.position(|e| e.job_id == job_id && e.belongs_to(user_id)) else {
            return Ok(false);
        };
        let next = entries
            .items()
            .range(index + 1..)
            .position(|e| e.belongs_to(user_id))
            .map(|offset| index + 1 + offset);
        match next {
            Some(next) => {
                entries.swap(index, next)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Queued job ids of a user, in queue order
    pub fn get_user_jobs(&self, user_id: &str) -> Vec<i64> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.belongs_to(user_id))
            .map(|e| e.job_id)
            .collect()
    }

    /// Queued job ids grouped by user, each list in queue order
    pub fn get_user_queues(&self) -> BTreeMap<String, Vec<i64>> {
        let mut queues: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for entry in self.entries.lock().iter() {
            queues.entry(entry.user_id.clone()).or_default().push(entry.job_id);
        }
        queues
    }

    /// Snapshot of the queue
    pub fn get_all_jobs(&self) -> Vec<QueueEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn has_more_jobs(&self, user_id: &str) -> bool {
        self.entries.lock().iter().any(|e| e.belongs_to(user_id))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Dequeue the entry chosen by the selection strategy, waiting while the
    /// queue is empty.
    pub async fn take(&self) -> QueueResult<Option<ExecutionJob>> {
        let entry = self
            .wait_and_remove(|entries| self.selector.choose_next(entries.items()))
            .await?;
        self.resolve(entry).await
    }

    /// Dequeue the earliest entry of `user_id`, or defer to [`take`](Self::take)
    /// when no user is given.
    ///
    /// Returns `None` when the queue holds no entry for that user.
    pub async fn take_for_user(&self, user_id: Option<&str>) -> QueueResult<Option<ExecutionJob>> {
        let Some(user_id) = user_id else {
            return self.take().await;
        };
        let entry = self
            .wait_and_remove(|entries| entries.position(|e| e.belongs_to(user_id)))
            .await?;
        self.resolve(entry).await
    }

    /// Dequeue the earliest entry not owned by `user_id`, falling back to
    /// [`take`](Self::take) when only that user has queued jobs.
    pub async fn take_except(&self, user_id: Option<&str>) -> QueueResult<Option<ExecutionJob>> {
        let Some(user_id) = user_id else {
            return self.take().await;
        };
        let entry = self
            .wait_and_remove(|entries| entries.position(|e| !e.belongs_to(user_id)))
            .await?;
        match entry {
            Some(entry) => self.resolve(Some(entry)).await,
            None => self.take().await,
        }
    }

    /// Wake blocked takers and make every current and future take return
    /// [`QueueError::Interrupted`]
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.changed.notify_waiters();
        warn!("Job queue interrupted");
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    async fn wait_and_remove(
        &self,
        pick: impl Fn(&PersistentQueue<QueueEntry>) -> Option<usize>,
    ) -> QueueResult<Option<QueueEntry>> {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if self.is_interrupted() {
                return Err(QueueError::Interrupted);
            }
            let taken = {
                let mut entries = self.entries.lock();
                if entries.is_empty() {
                    None
                } else {
                    let entry = match pick(&entries) {
                        Some(index) => entries.remove(index)?,
                        None => None,
                    };
                    Some((entry, entries.len()))
                }
            };
            if let Some((entry, size)) = taken {
                if let Some(entry) = &entry {
                    log_queue_operation("take", Some(entry.job_id), Some(&entry.user_id), size, None);
                }
                return Ok(entry);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = &mut changed => {}
            }
        }
    }

    async fn resolve(&self, entry: Option<QueueEntry>) -> QueueResult<Option<ExecutionJob>> {
        let Some(entry) = entry else {
            return Ok(None);
        };
        let job = self.job_provider.get(entry.job_id).await?;
        if job.is_none() {
            warn!(job_id = entry.job_id, user_id = %entry.user_id, "Dequeued job no longer exists");
        }
        Ok(job)
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("selector", &self.selector.name())
            .field("poll_interval", &self.poll_interval)
            .field("interrupted", &self.is_interrupted())
            .finish_non_exhaustive()
    }
}
