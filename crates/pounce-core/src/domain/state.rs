//! Claim task state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one claim task.
///
/// State transitions:
/// - Pending -> Running -> Succeeded
/// - Pending -> Running -> FailedPermanent (classifier said stop)
/// - Pending -> Running -> FailedExhausted (attempt budget used up)
/// - Pending -> Running -> Stopped (cancelled between attempts)
/// - Pending -> Stopped (cancelled before activation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Created, waiting for activation.
    Pending,

    /// Attempting.
    Running,

    /// The claim went through.
    Succeeded,

    /// A permanent failure was classified (quota, too early, already claimed).
    FailedPermanent,

    /// The attempt budget ran out.
    FailedExhausted,

    /// Cancelled.
    Stopped,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded
                | TaskState::FailedPermanent
                | TaskState::FailedExhausted
                | TaskState::Stopped
        )
    }

    /// Can the machine move from `self` to `to`?
    pub fn can_transition_to(self, to: TaskState) -> bool {
        match (self, to) {
            (TaskState::Pending, TaskState::Running) => true,
            (TaskState::Pending, TaskState::Stopped) => true,
            (TaskState::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::FailedPermanent => "failed_permanent",
            TaskState::FailedExhausted => "failed_exhausted",
            TaskState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
