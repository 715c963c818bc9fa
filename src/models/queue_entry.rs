use serde::{Deserialize, Serialize};

/// A queued job, identified by job id and owning user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub job_id: i64,
    pub user_id: String,
}

impl QueueEntry {
    pub fn new(job_id: i64, user_id: impl Into<String>) -> Self {
        Self {
            job_id,
            user_id: user_id.into(),
        }
    }

    pub fn belongs_to(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}
