use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status shared by jobs, tasks and task groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Created but not yet started
    Undetermined,
    /// Submitted for execution, nothing running yet
    QueuedActive,
    /// At least one unit of work is executing
    Running,
    /// Execution was suspended and may be resumed
    Suspended,
    /// Finished normally
    Done,
    /// Finished abnormally
    Failed,
    /// Cancelled by a user or by the orchestrator
    Cancelled,
}

impl ExecutionStatus {
    /// All statuses, in numeric order
    pub const ALL: [ExecutionStatus; 7] = [
        Self::Undetermined,
        Self::QueuedActive,
        Self::Running,
        Self::Suspended,
        Self::Done,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Check if this is an active state (work is queued or executing)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::QueuedActive | Self::Running)
    }

    /// Check if this status satisfies a dependency of a child task
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Numeric code used by the persisted representation
    pub fn value(&self) -> i32 {
        match self {
            Self::Undetermined => 0,
            Self::QueuedActive => 1,
            Self::Running => 2,
            Self::Suspended => 3,
            Self::Done => 4,
            Self::Failed => 5,
            Self::Cancelled => 6,
        }
    }

    /// Resolve a status from its numeric code
    pub fn from_value(value: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.value() == value)
    }

    /// Human readable name
    pub fn friendly_name(&self) -> &'static str {
        match self {
            Self::Undetermined => "Undetermined",
            Self::QueuedActive => "Queued",
            Self::Running => "Running",
            Self::Suspended => "Suspended",
            Self::Done => "Done",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undetermined => write!(f, "UNDETERMINED"),
            Self::QueuedActive => write!(f, "QUEUED_ACTIVE"),
            Self::Running => write!(f, "RUNNING"),
            Self::Suspended => write!(f, "SUSPENDED"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UNDETERMINED" => Ok(Self::Undetermined),
            "QUEUED_ACTIVE" => Ok(Self::QueuedActive),
            "RUNNING" => Ok(Self::Running),
            "SUSPENDED" => Ok(Self::Suspended),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid execution status: {s}")),
        }
    }
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Undetermined
    }
}
