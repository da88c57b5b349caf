//! Observer events.
//!
//! Delivered through an `EventSink` as they happen. For a given task id the
//! order is the order of occurrence (attempt N before attempt N+1 before the
//! terminal event); across task ids nothing is guaranteed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{RunId, TaskId};
use super::outcome::OutcomeKind;
use super::state::TaskState;
use crate::observability::TerminalCounts;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClaimEvent {
    /// A time server answered; deadlines use this offset.
    ClockSynced {
        server: String,
        offset_ms: i64,
        timestamp: DateTime<Utc>,
    },

    /// Clock sync failed; deadlines fall back to the local clock.
    SyncDegraded {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The run's tasks were released.
    Activated {
        run_id: RunId,
        task_count: usize,
        #[serde(with = "duration_ms")]
        waited: Duration,
        timestamp: DateTime<Utc>,
    },

    /// One attempt finished and was classified.
    Attempt(AttemptEvent),

    /// A task reached its terminal state.
    Finished(TerminalEvent),

    /// Every task of the run is terminal.
    RunCompleted {
        run_id: RunId,
        counts: TerminalCounts,
        timestamp: DateTime<Utc>,
    },
}

impl ClaimEvent {
    /// The task this event belongs to, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            ClaimEvent::Attempt(e) => Some(&e.task_id),
            ClaimEvent::Finished(e) => Some(&e.task_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptEvent {
    pub task_id: TaskId,
    pub attempt_number: u64,
    pub outcome: OutcomeKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalEvent {
    pub task_id: TaskId,
    pub final_state: TaskState,
    pub summary: String,
    pub attempts: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

/// `Duration` <-> integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn attempt_event_is_tagged_and_uses_millis() {
        let ev = ClaimEvent::Attempt(AttemptEvent {
            task_id: TaskId::new("box-1"),
            attempt_number: 3,
            outcome: OutcomeKind::TransientOverload,
            message: "429".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 16, 13, 0, 0).unwrap(),
            elapsed: Duration::from_millis(1500),
        });
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "attempt");
        assert_eq!(v["task_id"], "box-1");
        assert_eq!(v["outcome"], "TRANSIENT_OVERLOAD");
        assert_eq!(v["elapsed"], 1500);
        assert_eq!(ev.task_id().map(TaskId::as_str), Some("box-1"));
    }

    #[test]
    fn run_level_events_have_no_task() {
        let ev = ClaimEvent::SyncDegraded {
            reason: "all servers failed".into(),
            timestamp: Utc::now(),
        };
        assert!(ev.task_id().is_none());
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "sync_degraded");
    }
}
