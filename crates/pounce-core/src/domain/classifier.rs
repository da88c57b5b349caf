//! Response classification.
//!
//! Every operation kind funnels through the same rule table; the only
//! per-operation knob is which message substrings count as "insufficient",
//! "not open yet", "already claimed" and "rate limited".
//!
//! Precedence (first match wins):
//! 1. 2xx status with success code   -> Success (+ payload), whatever the message
//! 2. already-claimed message        -> PermanentFailure (any HTTP status)
//! 3. HTTP 429 or rate-limit message -> TransientOverload
//! 4. non-2xx status                 -> RetryableFailure
//! 5. unstructured body / no code    -> RetryableFailure
//! 6. session-expired code           -> PermanentFailure
//! 7. insufficient message           -> PermanentFailure
//! 8. not-open message               -> PermanentFailure
//! 9. anything else                  -> RetryableFailure

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::NetworkError;
use super::operation::OperationKind;
use super::outcome::Outcome;

/// Body of an endpoint response: parsed JSON, or the raw text when parsing
/// failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBody {
    Json(Value),
    Text(String),
}

/// What the endpoint returned for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub status: u16,
    pub body: RawBody,
}

impl RawResult {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: RawBody::Json(body),
        }
    }

    /// Parse `text` as JSON, keeping it as text if that fails.
    pub fn from_text(status: u16, text: impl Into<String>) -> Self {
        let text = text.into();
        let body = match serde_json::from_str::<Value>(&text) {
            Ok(v) => RawBody::Json(v),
            Err(_) => RawBody::Text(text),
        };
        Self { status, body }
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Domain message: `res.smsg`, `res.tmsg`, `message`, `msg` (first
    /// non-empty), or the whole text for an unstructured body.
    pub fn message(&self) -> Option<String> {
        match &self.body {
            RawBody::Json(v) => [
                v.pointer("/res/smsg"),
                v.pointer("/res/tmsg"),
                v.get("message"),
                v.get("msg"),
            ]
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string),
            RawBody::Text(t) => {
                let t = t.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
        }
    }

    /// Result code (`code`, string or number).
    pub fn code(&self) -> Option<String> {
        let RawBody::Json(v) = &self.body else {
            return None;
        };
        match v.get("code")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Success payload: `res.data`, else `res.item`, else `res`.
    pub fn payload(&self) -> Option<Value> {
        let RawBody::Json(v) = &self.body else {
            return None;
        };
        [v.pointer("/res/data"), v.pointer("/res/item"), v.get("res")]
            .into_iter()
            .flatten()
            .find(|p| !p.is_null())
            .cloned()
    }
}

/// Message substrings for one operation kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageRules {
    pub insufficient: Vec<String>,
    pub not_open: Vec<String>,
    pub already_claimed: Vec<String>,
    pub rate_limited: Vec<String>,
}

impl MessageRules {
    /// Defaults observed on the reward endpoint.
    pub fn defaults_for(kind: OperationKind) -> Self {
        let rate_limited = strings(&["429", "频繁"]);
        match kind {
            OperationKind::ClaimBox => Self {
                insufficient: strings(&["积分不足"]),
                not_open: strings(&["开启时间"]),
                already_claimed: strings(&["已领取"]),
                rate_limited,
            },
            OperationKind::Exchange => Self {
                insufficient: strings(&["积分不足"]),
                not_open: Vec::new(),
                already_claimed: strings(&["已兑换"]),
                rate_limited,
            },
            OperationKind::SignIn => Self {
                insufficient: Vec::new(),
                not_open: Vec::new(),
                already_claimed: strings(&["已领取", "已签到"]),
                rate_limited,
            },
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn matches_any(message: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| !p.is_empty() && message.contains(p.as_str()))
}

/// Centralized rule table.
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    success_codes: Vec<String>,
    session_expired_codes: Vec<String>,
    rules: HashMap<OperationKind, MessageRules>,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self {
            success_codes: strings(&["00"]),
            session_expired_codes: strings(&["03"]),
            rules: OperationKind::ALL
                .into_iter()
                .map(|k| (k, MessageRules::defaults_for(k)))
                .collect(),
        }
    }
}

impl ResponseClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(mut self, kind: OperationKind, rules: MessageRules) -> Self {
        self.rules.insert(kind, rules);
        self
    }

    pub fn with_success_codes(mut self, codes: Vec<String>) -> Self {
        self.success_codes = codes;
        self
    }

    pub fn with_session_expired_codes(mut self, codes: Vec<String>) -> Self {
        self.session_expired_codes = codes;
        self
    }

    pub fn rules(&self, kind: OperationKind) -> Option<&MessageRules> {
        self.rules.get(&kind)
    }

    pub fn classify(&self, kind: OperationKind, raw: &RawResult) -> Outcome {
        let empty = MessageRules::default();
        let rules = self.rules.get(&kind).unwrap_or(&empty);
        let message = raw.message();
        let msg = message.as_deref().unwrap_or("");

        let code = raw.code();

        // message patterns only describe failures
        if raw.is_success_status()
            && code.as_ref().is_some_and(|c| self.success_codes.contains(c))
        {
            let outcome = Outcome::success(message.unwrap_or_else(|| "claimed".to_string()));
            return match raw.payload() {
                Some(p) => outcome.with_payload(p),
                None => outcome,
            };
        }
        if matches_any(msg, &rules.already_claimed) {
            return Outcome::permanent(format!("already claimed: {msg}"));
        }
        if raw.status == 429 || matches_any(msg, &rules.rate_limited) {
            return Outcome::overload(describe("rate limited", raw.status, message.as_deref()));
        }
        if !raw.is_success_status() {
            return Outcome::retryable(describe("http error", raw.status, message.as_deref()));
        }
        let Some(code) = code else {
            return Outcome::retryable(describe(
                "unrecognized response",
                raw.status,
                message.as_deref(),
            ));
        };

        if self.session_expired_codes.contains(&code) {
            let msg = message.unwrap_or_else(|| "login expired".to_string());
            return Outcome::permanent(format!("session expired: {msg} (code {code})"));
        }
        if matches_any(msg, &rules.insufficient) {
            return Outcome::permanent(format!("insufficient points: {msg}"));
        }
        if matches_any(msg, &rules.not_open) {
            return Outcome::permanent(format!("not open yet: {msg}"));
        }

        let msg = message.unwrap_or_else(|| "unknown error".to_string());
        Outcome::retryable(format!("{msg} (code {code})"))
    }

    /// Transport failures are always worth another try.
    pub fn classify_network_error(&self, err: &NetworkError) -> Outcome {
        Outcome::retryable(err.to_string())
    }
}

fn describe(what: &str, status: u16, message: Option<&str>) -> String {
    match message {
        Some(m) => format!("{what} (HTTP {status}): {m}"),
        None => format!("{what} (HTTP {status})"),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::domain::errors::NetworkErrorKind;
    use crate::domain::outcome::OutcomeKind;

    fn body(code: &str, smsg: &str) -> Value {
        json!({ "code": code, "res": { "smsg": smsg } })
    }

    #[rstest]
    #[case::success(200, body("00", "领取成功"), OutcomeKind::Success)]
    #[case::insufficient(200, body("01", "积分不足"), OutcomeKind::PermanentFailure)]
    #[case::not_open(200, body("02", "未到开启时间"), OutcomeKind::PermanentFailure)]
    #[case::already_claimed(200, body("04", "您已领取过该宝箱"), OutcomeKind::PermanentFailure)]
    #[case::session_expired(200, json!({"code": "03"}), OutcomeKind::PermanentFailure)]
    #[case::rate_limit_message(200, body("05", "请求过于频繁"), OutcomeKind::TransientOverload)]
    #[case::unknown_code(200, body("99", "系统繁忙"), OutcomeKind::RetryableFailure)]
    #[case::missing_code(200, json!({"res": {}}), OutcomeKind::RetryableFailure)]
    #[case::server_error(502, body("00", "bad gateway"), OutcomeKind::RetryableFailure)]
    #[case::too_many_requests(429, json!({}), OutcomeKind::TransientOverload)]
    #[case::success_mentioning_429(200, body("00", "领取成功，剩余积分1429"), OutcomeKind::Success)]
    #[case::success_mentioning_claimed(200, body("00", "已领取10积分"), OutcomeKind::Success)]
    fn claim_box_rules(
        #[case] status: u16,
        #[case] response: Value,
        #[case] expected: OutcomeKind,
    ) {
        let c = ResponseClassifier::default();
        let outcome = c.classify(OperationKind::ClaimBox, &RawResult::json(status, response));
        assert_eq!(outcome.kind, expected, "{outcome:?}");
    }

    #[rstest]
    #[case(200)]
    #[case(400)]
    #[case(429)]
    #[case(500)]
    fn already_claimed_is_permanent_regardless_of_status(#[case] status: u16) {
        let c = ResponseClassifier::default();
        let raw = RawResult::json(status, body("04", "宝箱已领取"));
        assert_eq!(
            c.classify(OperationKind::ClaimBox, &raw).kind,
            OutcomeKind::PermanentFailure
        );
    }

    #[rstest]
    #[case(OperationKind::ClaimBox)]
    #[case(OperationKind::Exchange)]
    #[case(OperationKind::SignIn)]
    fn http_429_is_overload_for_every_operation(#[case] kind: OperationKind) {
        let c = ResponseClassifier::default();
        let raw = RawResult::from_text(429, "Too Many Requests");
        assert_eq!(c.classify(kind, &raw).kind, OutcomeKind::TransientOverload);
    }

    #[rstest]
    #[case::exchange(OperationKind::Exchange, "兑换成功，剩余积分1429")]
    #[case::sign_in(OperationKind::SignIn, "签到成功，已领取10积分")]
    #[case::frequent(OperationKind::ClaimBox, "领取成功，请勿频繁操作")]
    fn success_code_wins_over_message_patterns(#[case] kind: OperationKind, #[case] smsg: &str) {
        let c = ResponseClassifier::default();
        let outcome = c.classify(kind, &RawResult::json(200, body("00", smsg)));
        assert_eq!(outcome.kind, OutcomeKind::Success, "{outcome:?}");
        assert_eq!(outcome.message, smsg);
    }

    #[test]
    fn rules_are_per_operation() {
        let c = ResponseClassifier::default();
        // "开启时间" only stops box claims
        let raw = RawResult::json(200, body("02", "未到开启时间"));
        assert_eq!(
            c.classify(OperationKind::Exchange, &raw).kind,
            OutcomeKind::RetryableFailure
        );
        // "已签到" only stops sign-in
        let raw = RawResult::json(200, body("02", "今日已签到"));
        assert_eq!(
            c.classify(OperationKind::SignIn, &raw).kind,
            OutcomeKind::PermanentFailure
        );
        assert_eq!(
            c.classify(OperationKind::ClaimBox, &raw).kind,
            OutcomeKind::RetryableFailure
        );
    }

    #[test]
    fn custom_rules_replace_defaults() {
        let c = ResponseClassifier::default().with_rules(
            OperationKind::Exchange,
            MessageRules {
                not_open: vec!["sold out".into()],
                ..MessageRules::default()
            },
        );
        let raw = RawResult::json(200, json!({"code": 7, "message": "sold out"}));
        let outcome = c.classify(OperationKind::Exchange, &raw);
        assert_eq!(outcome.kind, OutcomeKind::PermanentFailure);
        assert!(outcome.message.contains("sold out"));
    }

    #[test]
    fn success_carries_payload() {
        let c = ResponseClassifier::default();
        let raw = RawResult::json(
            200,
            json!({"code": "00", "res": {"smsg": "ok", "data": {"gcoin": 500}}}),
        );
        let outcome = c.classify(OperationKind::ClaimBox, &raw);
        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert_eq!(outcome.payload, Some(json!({"gcoin": 500})));
    }

    #[test]
    fn message_falls_back_through_fields() {
        let raw = RawResult::json(200, json!({"code": "01", "res": {"smsg": "", "tmsg": "t"}}));
        assert_eq!(raw.message().as_deref(), Some("t"));
        let raw = RawResult::json(200, json!({"code": "01", "msg": "m"}));
        assert_eq!(raw.message().as_deref(), Some("m"));
        let raw = RawResult::from_text(200, "<html>oops</html>");
        assert_eq!(raw.body, RawBody::Text("<html>oops</html>".into()));
        assert_eq!(raw.code(), None);
    }

    #[test]
    fn unstructured_ok_body_is_retryable() {
        let c = ResponseClassifier::default();
        let raw = RawResult::from_text(200, "<html>maintenance</html>");
        assert_eq!(
            c.classify(OperationKind::ClaimBox, &raw).kind,
            OutcomeKind::RetryableFailure
        );
    }

    #[test]
    fn network_errors_are_retryable() {
        let c = ResponseClassifier::default();
        let err = NetworkError::new(NetworkErrorKind::Connect, "connection reset");
        let outcome = c.classify_network_error(&err);
        assert_eq!(outcome.kind, OutcomeKind::RetryableFailure);
        assert_eq!(outcome.message, "connect: connection reset");
    }
}
