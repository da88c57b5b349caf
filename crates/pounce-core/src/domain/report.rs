//! Final report of a scheduler run.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::duration_ms;
use super::ids::{RunId, TaskId};
use super::state::TaskState;
use crate::observability::TerminalCounts;

/// How one task ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub final_state: TaskState,
    /// Human-readable reason, meant to be shown verbatim.
    pub message: String,
    pub attempts: u64,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Every task of a run, keyed by task id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    /// Wall-clock instant the tasks were released (`None` if cancelled first).
    pub activated_at: Option<DateTime<Utc>>,
    /// Whether activation used a synchronized clock.
    pub clock_synced: bool,
    pub tasks: BTreeMap<TaskId, TaskReport>,
}

impl RunReport {
    pub fn get(&self, task_id: &TaskId) -> Option<&TaskReport> {
        self.tasks.get(task_id)
    }

    pub fn counts(&self) -> TerminalCounts {
        TerminalCounts::tally(self.tasks.values().map(|t| t.final_state))
    }

    /// True when every task succeeded.
    pub fn all_succeeded(&self) -> bool {
        !self.tasks.is_empty()
            && self
                .tasks
                .values()
                .all(|t| t.final_state == TaskState::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn entry(state: TaskState) -> TaskReport {
        TaskReport {
            final_state: state,
            message: state.to_string(),
            attempts: 1,
            elapsed: Duration::from_millis(10),
            payload: None,
        }
    }

    #[test]
    fn counts_and_all_succeeded() {
        let mut tasks = BTreeMap::new();
        tasks.insert(TaskId::new("box-1"), entry(TaskState::Succeeded));
        tasks.insert(TaskId::new("box-2"), entry(TaskState::Stopped));
        let report = RunReport {
            run_id: RunId::from_ulid(Ulid::new()),
            activated_at: None,
            clock_synced: false,
            tasks,
        };

        let counts = report.counts();
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.stopped, 1);
        assert!(!report.all_succeeded());
        assert_eq!(
            report.get(&TaskId::new("box-2")).map(|t| t.final_state),
            Some(TaskState::Stopped)
        );
    }
}
