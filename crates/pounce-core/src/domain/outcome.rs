//! Outcome model: the classified result of one attempt.
//!
//! Outcomes are produced by the classifier only and are never mutated
//! afterwards; the retry policy and the observer both read the same value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed classification of an attempt result.
///
/// Serialized as SCREAMING_SNAKE_CASE: SUCCESS / RETRYABLE_FAILURE /
/// PERMANENT_FAILURE / TRANSIENT_OVERLOAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    /// The claim went through.
    Success,
    /// Transient rejection or transport failure; trying again may work.
    RetryableFailure,
    /// No further attempt by this task can succeed.
    PermanentFailure,
    /// The endpoint asked us to slow down (HTTP 429 and friends).
    TransientOverload,
}

impl OutcomeKind {
    /// Whether another attempt is worth making (budget permitting).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            OutcomeKind::RetryableFailure | OutcomeKind::TransientOverload
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "SUCCESS",
            OutcomeKind::RetryableFailure => "RETRYABLE_FAILURE",
            OutcomeKind::PermanentFailure => "PERMANENT_FAILURE",
            OutcomeKind::TransientOverload => "TRANSIENT_OVERLOAD",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one attempt: tag, human-readable message, optional payload
/// (reward contents, updated balance, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Success, message)
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::RetryableFailure, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::PermanentFailure, message)
    }

    pub fn overload(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::TransientOverload, message)
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    fn new(kind: OutcomeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_kind_serializes_as_required_names() {
        for kind in [
            OutcomeKind::Success,
            OutcomeKind::RetryableFailure,
            OutcomeKind::PermanentFailure,
            OutcomeKind::TransientOverload,
        ] {
            let s = serde_json::to_string(&kind).unwrap();
            assert_eq!(s, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn only_failures_and_overload_are_retryable() {
        assert!(OutcomeKind::RetryableFailure.is_retryable());
        assert!(OutcomeKind::TransientOverload.is_retryable());
        assert!(!OutcomeKind::Success.is_retryable());
        assert!(!OutcomeKind::PermanentFailure.is_retryable());
    }

    #[test]
    fn payload_is_omitted_when_absent() {
        let v = serde_json::to_value(Outcome::retryable("busy")).unwrap();
        assert_eq!(v["kind"], "RETRYABLE_FAILURE");
        assert!(v.get("payload").is_none());

        let o = Outcome::success("ok").with_payload(serde_json::json!({"gcoin": 10}));
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["payload"]["gcoin"], 10);
    }
}
