//! # Job Selection Strategies
//!
//! A strategy looks at the current queue contents and picks the entry that
//! [`JobQueue::take`](super::JobQueue::take) dequeues. Strategies are resolved
//! by name through [`JobSelectorRegistry`]; unknown names fall back to FIFO.

use crate::models::QueueEntry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::{debug, warn};

/// Chooses which queued entry to dequeue next
pub trait JobSelectionStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Index of the entry to dequeue, `None` for an empty queue
    fn choose_next(&self, entries: &VecDeque<QueueEntry>) -> Option<usize>;
}

/// Head of the queue
#[derive(Debug, Default, Clone, Copy)]
pub struct FifoJobSelector;

impl JobSelectionStrategy for FifoJobSelector {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn choose_next(&self, entries: &VecDeque<QueueEntry>) -> Option<usize> {
        (!entries.is_empty()).then_some(0)
    }
}

/// First entry of the user with the most queued entries.
///
/// Ties go to the user whose first entry sits earliest in the queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct BalancedJobSelector;

impl JobSelectionStrategy for BalancedJobSelector {
    fn name(&self) -> &'static str {
        "balanced"
    }

    fn choose_next(&self, entries: &VecDeque<QueueEntry>) -> Option<usize> {
        // user -> (count, index of first entry)
        let mut users: HashMap<&str, (usize, usize)> = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            users.entry(entry.user_id.as_str()).or_insert((0, index)).0 += 1;
        }
        users
            .into_values()
            .max_by(|(count_a, first_a), (count_b, first_b)| {
                count_a.cmp(count_b).then_with(|| first_b.cmp(first_a))
            })
            .map(|(_, first)| first)
    }
}

type SelectorConstructor = fn() -> Box<dyn JobSelectionStrategy>;

fn fifo() -> Box<dyn JobSelectionStrategy> {
    Box::new(FifoJobSelector)
}

fn balanced() -> Box<dyn JobSelectionStrategy> {
    Box::new(BalancedJobSelector)
}

/// Maps configured strategy names to constructors
pub struct JobSelectorRegistry {
    constructors: HashMap<String, SelectorConstructor>,
}

impl JobSelectorRegistry {
    /// Registry with the built-in strategies and their legacy type names
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register("fifo", fifo);
        registry.register("default", fifo);
        registry.register("ro.cs.tao.orchestration.queue.DefaultJobSelector", fifo);
        registry.register("balanced", balanced);
        registry.register("ro.cs.tao.orchestration.queue.BalancedJobSelector", balanced);
        registry
    }

    /// Register a constructor; names are matched case-insensitively
    pub fn register(&mut self, name: &str, constructor: SelectorConstructor) {
        self.constructors.insert(name.trim().to_lowercase(), constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.trim().to_lowercase())
    }

    /// Build the strategy registered under `name`, or FIFO when unknown
    pub fn resolve(&self, name: &str) -> Box<dyn JobSelectionStrategy> {
        let key = name.trim().to_lowercase();
        match self.constructors.get(&key) {
            Some(constructor) => {
                let selector = constructor();
                debug!(configured = %name, selector = selector.name(), "Resolved job selector");
                selector
            }
            None => {
                if !key.is_empty() {
                    warn!(configured = %name, "Unknown job selector, using FIFO");
                }
                Box::new(FifoJobSelector)
            }
        }
    }
}

impl Default for JobSelectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JobSelectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("JobSelectorRegistry").field("names", &names).finish()
    }
}
