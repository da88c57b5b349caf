//! Offset between the local clock and the reference clock.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// `reference_time - local_time` at the last successful sync.
///
/// Zero means "unsynchronized": deadline math then falls back to the local
/// clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClockOffset(TimeDelta);

impl ClockOffset {
    pub const ZERO: ClockOffset = ClockOffset(TimeDelta::zero());

    pub fn new(delta: TimeDelta) -> Self {
        Self(delta)
    }

    /// Offset observed when the reference clock read `reference` while the
    /// local clock read `local`.
    pub fn between(reference: DateTime<Utc>, local: DateTime<Utc>) -> Self {
        Self(reference - local)
    }

    pub fn as_delta(&self) -> TimeDelta {
        self.0
    }

    pub fn as_millis(&self) -> i64 {
        self.0.num_milliseconds()
    }

    /// Local instant -> reference instant.
    pub fn to_reference(&self, local: DateTime<Utc>) -> DateTime<Utc> {
        local + self.0
    }

    /// Reference instant -> local instant.
    pub fn to_local(&self, reference: DateTime<Utc>) -> DateTime<Utc> {
        reference - self.0
    }
}

/// A successful sync: which server answered and the offset it implied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedOffset {
    pub server: String,
    pub offset: ClockOffset,
}
