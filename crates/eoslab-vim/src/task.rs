//! Task handles and change-notification types.
//!
//! Every mutating VM operation on the host returns a [`TaskHandle`]; the
//! watcher in `eoslab-core` subscribes to property changes on a set of
//! handles and consumes [`UpdateBatch`]es until each task is terminal.

use std::fmt;

/// A handle to one in-flight asynchronous operation on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(String);

impl TaskHandle {
    /// Wrap a host-issued task identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The host-side task identifier.
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task state as reported by the host.
///
/// Only `Success` and `Error` are terminal; the others may be reported any
/// number of times before that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Accepted but not yet started.
    Queued,
    /// In progress.
    Running,
    /// Completed successfully (terminal).
    Success,
    /// Failed (terminal); detail travels in the owning [`TaskChange`].
    Error,
}

impl TaskState {
    /// Parse the host's state string, case-sensitively as the API emits it.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One reported state change for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskChange {
    /// The task the change applies to.
    pub task: TaskHandle,
    /// The state the task moved to.
    pub state: TaskState,
    /// Host-supplied failure detail, present when `state` is `Error`.
    pub detail: Option<String>,
}

/// One batch of change notifications, with the cursor to resume from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateBatch {
    /// Notification version; pass back to the host to receive only newer
    /// changes.
    pub version: String,
    /// Changes observed since the previous version.
    pub changes: Vec<TaskChange>,
}

/// A registered change-notification subscription.
///
/// Must be released via `Hypervisor::destroy_filter`; it must not outlive
/// the wait call that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterHandle(String);

impl FilterHandle {
    /// Wrap a host-issued filter identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The host-side filter identifier.
    pub fn id(&self) -> &str {
        &self.0
    }
}
