//! Decision model: what a task does after an attempt.
//!
//! `RetryPolicy::next` is a pure function of (outcome, attempt count,
//! budget). Executing the decision (sleeping, finishing) is the task loop's
//! job.

use std::fmt;
use std::time::Duration;

use super::errors::ConfigError;
use super::outcome::{Outcome, OutcomeKind};

/// Why a task stopped without success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The classifier reported a permanent condition.
    Permanent(String),
    /// The attempt budget ran out on retryable outcomes.
    Exhausted { attempts: u64 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Permanent(msg) => f.write_str(msg),
            FailureReason::Exhausted { attempts } => {
                write!(f, "exhausted after {attempts} attempts")
            }
        }
    }
}

/// The next action for a task. Produced per attempt, consumed immediately.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    StopSuccess,
    StopFailure(FailureReason),
    Continue(Duration),
}

/// Fixed-interval retry policy.
///
/// The endpoint tolerates steady polling but rejects bursts, so every retry
/// (overload included) waits the same configured interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
}

impl RetryPolicy {
    pub fn new(interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(Self { interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide what to do after attempt number `attempt_count` (1-based).
    ///
    /// `max_attempts = None` means unbounded: keep going until success or a
    /// permanent failure (or cancellation).
    pub fn next(
        &self,
        outcome: &Outcome,
        attempt_count: u64,
        max_attempts: Option<u64>,
    ) -> RetryDecision {
        match outcome.kind {
            OutcomeKind::Success => RetryDecision::StopSuccess,
            OutcomeKind::PermanentFailure => {
                RetryDecision::StopFailure(FailureReason::Permanent(outcome.message.clone()))
            }
            OutcomeKind::RetryableFailure | OutcomeKind::TransientOverload => match max_attempts {
                Some(max) if attempt_count >= max => {
                    RetryDecision::StopFailure(FailureReason::Exhausted {
                        attempts: attempt_count,
                    })
                }
                _ => RetryDecision::Continue(self.interval),
            },
        }
    }
}
