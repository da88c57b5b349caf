//! Input specs: what to claim, with which budget, starting when.

use std::time::Duration;

use chrono::{DateTime, Days, FixedOffset, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ConfigError;
use super::ids::TaskId;
use super::operation::{Credentials, Operation};

/// One claim task to run: identity + operation + account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSpec {
    pub task_id: TaskId,
    pub operation: Operation,
    pub credentials: Credentials,
}

impl ClaimSpec {
    pub fn new(task_id: impl Into<TaskId>, operation: Operation, credentials: Credentials) -> Self {
        Self {
            task_id: task_id.into(),
            operation,
            credentials,
        }
    }
}

/// Per-task stop conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Maximum attempts per task (including the first). `None` = unbounded.
    pub max_attempts: Option<u64>,

    /// Upper bound on a single in-flight attempt.
    pub attempt_timeout: Duration,
}

impl Budget {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == Some(0) {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("attempt"));
        }
        Ok(())
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_attempts: Some(50),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// When a run's tasks start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Start right away, no clock sync.
    Immediate,

    /// Start at this reference (synchronized) instant.
    At(DateTime<Utc>),
}

impl Activation {
    /// Next occurrence of `time_of_day` in the fixed offset `zone`, strictly
    /// after `reference_now`. A time already passed today rolls to tomorrow.
    pub fn next_daily(
        time_of_day: NaiveTime,
        zone: FixedOffset,
        reference_now: DateTime<Utc>,
    ) -> Activation {
        let local_now = reference_now.with_timezone(&zone);
        let today = local_now.date_naive().and_time(time_of_day);
        // local naive -> UTC naive
        let mut target = zone.from_utc_datetime(&(today - zone));
        if target <= local_now {
            target = target.checked_add_days(Days::new(1)).unwrap_or(target);
        }
        Activation::At(target.with_timezone(&Utc))
    }

    pub fn target(&self) -> Option<DateTime<Utc>> {
        match self {
            Activation::Immediate => None,
            Activation::At(t) => Some(*t),
        }
    }
}

/// Parse `HH:MM:SS`, `HH:MM:SS.mmm` or `HH:MM`.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ConfigError> {
    let s = s.trim();
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| ConfigError::InvalidTimeOfDay(s.to_string()))
}

/// `+08:00` style zone from whole hours.
pub fn utc_offset_hours(hours: i32) -> Result<FixedOffset, ConfigError> {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or(ConfigError::InvalidUtcOffset(hours))
}
