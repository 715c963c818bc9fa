//! Proptest strategies for queue contents and status sequences

use proptest::prelude::*;
use tao_orchestration::state_machine::ExecutionStatus;

pub const USERS: [&str; 3] = ["alice", "bob", "carol"];

pub fn user_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(USERS.to_vec()).prop_map(str::to_string)
}

/// Queue contents as `(job id, user id)` pairs with distinct job ids
pub fn queue_entries_strategy() -> impl Strategy<Value = Vec<(i64, String)>> {
    prop::collection::vec(user_strategy(), 0..24).prop_map(|users| {
        users
            .into_iter()
            .enumerate()
            .map(|(index, user)| (index as i64 + 1, user))
            .collect()
    })
}

pub fn status_strategy() -> impl Strategy<Value = ExecutionStatus> {
    prop::sample::select(ExecutionStatus::ALL.to_vec())
}

/// Status changes reported for tasks `1..=task_count`
pub fn status_changes_strategy(task_count: i64) -> impl Strategy<Value = Vec<(i64, ExecutionStatus)>> {
    prop::collection::vec((1..=task_count, status_strategy()), 1..32)
}

/// A queue mutation on a small id range, so puts and removes collide
#[derive(Debug, Clone)]
pub enum QueueOp {
    Put(i64, String),
    Remove(i64),
}

pub fn queue_ops_strategy() -> impl Strategy<Value = Vec<QueueOp>> {
    let op = prop_oneof![
        3 => (1..8i64, user_strategy()).prop_map(|(id, user)| QueueOp::Put(id, user)),
        2 => (1..8i64).prop_map(QueueOp::Remove),
    ];
    prop::collection::vec(op, 0..40)
}
