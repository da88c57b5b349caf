use serde::{Deserialize, Serialize};

use crate::domain::TaskState;

/// Per-state tally of a run's tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalCounts {
    pub succeeded: usize,
    pub failed_permanent: usize,
    pub failed_exhausted: usize,
    pub stopped: usize,
    /// Non-terminal tasks; always zero in a finished report.
    pub unfinished: usize,
}

impl TerminalCounts {
    pub fn tally(states: impl IntoIterator<Item = TaskState>) -> Self {
        let mut counts = Self::default();
        for state in states {
            match state {
                TaskState::Succeeded => counts.succeeded += 1,
                TaskState::FailedPermanent => counts.failed_permanent += 1,
                TaskState::FailedExhausted => counts.failed_exhausted += 1,
                TaskState::Stopped => counts.stopped += 1,
                TaskState::Pending | TaskState::Running => counts.unfinished += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed_permanent + self.failed_exhausted + self.stopped + self.unfinished
    }
}
