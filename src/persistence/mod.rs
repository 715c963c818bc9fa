//! # Persistence
//!
//! In-process implementations of the provider traits. Service deployments
//! plug their own database-backed providers into the same traits.

pub mod in_memory;

pub use in_memory::InMemoryExecutionStore;
