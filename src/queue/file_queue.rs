//! File-backed ordered queue.
//!
//! The whole queue is rewritten on every mutation (write to a temporary file,
//! then rename) so the file always holds a complete snapshot. A mutation whose
//! write fails is undone in memory before the error is returned. Reading and
//! writing go through plain functions, which lets a queue accept legacy file
//! layouts without subclassing.

use super::{QueueError, QueueResult};
use crate::models::QueueEntry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decodes the stored file contents
pub type ReadItems<T> = fn(&[u8]) -> serde_json::Result<Vec<T>>;
/// Encodes the queue for storage
pub type WriteItems<T> = fn(&VecDeque<T>) -> serde_json::Result<Vec<u8>>;

/// Ordered double-ended queue persisted to a single file
#[derive(Debug)]
pub struct PersistentQueue<T> {
    items: VecDeque<T>,
    path: PathBuf,
    writer: WriteItems<T>,
}

impl<T: Serialize + DeserializeOwned> PersistentQueue<T> {
    /// Open a queue stored as a JSON array
    pub fn open(path: impl Into<PathBuf>) -> QueueResult<Self> {
        Self::open_with(path, json_reader::<T>, json_writer::<T>)
    }
}

impl<T> PersistentQueue<T> {
    /// Open a queue with explicit codec functions, loading existing contents
    pub fn open_with(path: impl Into<PathBuf>, reader: ReadItems<T>, writer: WriteItems<T>) -> QueueResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| QueueError::io(parent, e))?;
        }
        let items = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => VecDeque::new(),
            Ok(bytes) => reader(&bytes)?.into(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VecDeque::new(),
            Err(e) => return Err(QueueError::io(&path, e)),
        };
        debug!(path = %path.display(), items = items.len(), "Opened persistent queue");
        Ok(Self { items, path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &VecDeque<T> {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn position(&self, predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.items.iter().position(predicate)
    }

    pub fn push_back(&mut self, item: T) -> QueueResult<()> {
        self.items.push_back(item);
        if let Err(e) = self.persist() {
            self.items.pop_back();
            return Err(e);
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> QueueResult<Option<T>> {
        let Some(removed) = self.items.remove(index) else {
            return Ok(None);
        };
        if let Err(e) = self.persist() {
            self.items.insert(index, removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    /// Remove every item matching `predicate`, returning the removed items
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> QueueResult<Vec<T>> {
        let mut kept = VecDeque::with_capacity(self.items.len());
        let mut removed = Vec::new();
        for (index, item) in self.items.drain(..).enumerate() {
            if predicate(&item) {
                removed.push((index, item));
            } else {
                kept.push_back(item);
            }
        }
        self.items = kept;
        if removed.is_empty() {
            return Ok(Vec::new());
        }
        if let Err(e) = self.persist() {
            // ascending original positions restore the previous order
            for (index, item) in removed {
                self.items.insert(index, item);
            }
            return Err(e);
        }
        Ok(removed.into_iter().map(|(_, item)| item).collect())
    }

    pub fn swap(&mut self, i: usize, j: usize) -> QueueResult<()> {
        self.items.swap(i, j);
        if let Err(e) = self.persist() {
            self.items.swap(i, j);
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self) -> QueueResult<()> {
        let bytes = (self.writer)(&self.items)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(|e| QueueError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| QueueError::io(&self.path, e))
    }
}

fn json_reader<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<Vec<T>> {
    serde_json::from_slice(bytes)
}

fn json_writer<T: Serialize>(items: &VecDeque<T>) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(items)
}

/// Stored form of a queue entry.
///
/// Older queue files hold `[jobId, "userId"]` pairs or `{"keyOne", "keyTwo"}`
/// objects, with the job id in any JSON numeric form.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Object {
        #[serde(rename = "jobId", alias = "keyOne")]
        job_id: serde_json::Number,
        #[serde(rename = "userId", alias = "keyTwo")]
        user_id: String,
    },
    Pair(serde_json::Number, String),
}

fn widen(number: &serde_json::Number) -> Option<i64> {
    number.as_i64().or_else(|| {
        number
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Read queue entries in any of the stored layouts
pub fn read_queue_entries(bytes: &[u8]) -> serde_json::Result<Vec<QueueEntry>> {
    let stored: Vec<StoredEntry> = serde_json::from_slice(bytes)?;
    stored
        .into_iter()
        .map(|entry| {
            let (number, user_id) = match entry {
                StoredEntry::Object { job_id, user_id } => (job_id, user_id),
                StoredEntry::Pair(job_id, user_id) => (job_id, user_id),
            };
            widen(&number)
                .map(|job_id| QueueEntry::new(job_id, user_id))
                .ok_or_else(|| <serde_json::Error as serde::de::Error>::custom(format!("invalid job id {number}")))
        })
        .collect()
}

/// Write queue entries as `{"jobId", "userId"}` objects
pub fn write_queue_entries(entries: &VecDeque<QueueEntry>) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec_pretty(entries)
}

impl PersistentQueue<QueueEntry> {
    /// Open a job queue file, accepting legacy layouts
    pub fn open_job_queue(path: impl Into<PathBuf>) -> QueueResult<Self> {
        Self::open_with(path, read_queue_entries, write_queue_entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutations_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        {
            let mut queue = PersistentQueue::open_job_queue(&path).unwrap();
            queue.push_back(QueueEntry::new(1, "alice")).unwrap();
            queue.push_back(QueueEntry::new(2, "bob")).unwrap();
            queue.push_back(QueueEntry::new(3, "alice")).unwrap();
            queue.swap(0, 2).unwrap();
            queue.remove(1).unwrap();
        }
        let reopened = PersistentQueue::open_job_queue(&path).unwrap();
        let ids: Vec<i64> = reopened.iter().map(|e| e.job_id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_failed_write_keeps_items_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let mut queue = PersistentQueue::open_job_queue(&path).unwrap();
        queue.push_back(QueueEntry::new(1, "alice")).unwrap();
        queue.push_back(QueueEntry::new(2, "bob")).unwrap();
        queue.push_back(QueueEntry::new(3, "alice")).unwrap();
        // a directory in place of the temporary file makes every write fail
        fs::create_dir(path.with_extension("tmp")).unwrap();
        let ids = |queue: &PersistentQueue<QueueEntry>| queue.iter().map(|e| e.job_id).collect::<Vec<_>>();

        assert!(queue.remove(1).is_err());
        assert_eq!(ids(&queue), vec![1, 2, 3]);
        assert!(queue.remove_where(|e| e.belongs_to("alice")).is_err());
        assert_eq!(ids(&queue), vec![1, 2, 3]);
        assert!(queue.swap(0, 2).is_err());
        assert_eq!(ids(&queue), vec![1, 2, 3]);
        assert!(queue.push_back(QueueEntry::new(4, "bob")).is_err());
        assert_eq!(ids(&queue), vec![1, 2, 3]);

        fs::remove_dir(path.with_extension("tmp")).unwrap();
        assert_eq!(queue.remove(1).unwrap(), Some(QueueEntry::new(2, "bob")));
        let reopened = PersistentQueue::open_job_queue(&path).unwrap();
        assert_eq!(ids(&reopened), vec![1, 3]);
    }

    #[test]
    fn test_reads_legacy_layouts() {
        let entries = read_queue_entries(
            br#"[[1, "alice"], {"jobId": 2, "userId": "bob"}, {"keyOne": 3.0, "keyTwo": "carol"}]"#,
        )
        .unwrap();
        assert_eq!(
            entries,
            vec![
                QueueEntry::new(1, "alice"),
                QueueEntry::new(2, "bob"),
                QueueEntry::new(3, "carol"),
            ]
        );
        assert!(read_queue_entries(br#"[[1.5, "alice"]]"#).is_err());
    }

    #[test]
    fn test_writes_object_layout() {
        let entries = VecDeque::from(vec![QueueEntry::new(7, "alice")]);
        let json: serde_json::Value = serde_json::from_slice(&write_queue_entries(&entries).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!([{"jobId": 7, "userId": "alice"}]));
    }

    #[test]
    fn test_empty_file_opens_empty_queue() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let queue = PersistentQueue::<QueueEntry>::open(file.path()).unwrap();
        assert!(queue.is_empty());
    }
}
