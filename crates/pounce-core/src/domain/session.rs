//! Session probes.
//!
//! Two side requests live next to the claim operations: `myinfo` tells
//! whether a uid/token pair still works (and the current points balance),
//! `init` turns the parameters of a share url into a fresh uid/ticket pair.
//! Both answer with the same `{code, res}` envelope as the claim routes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::classifier::{RawBody, RawResult};
use super::errors::SessionError;
use super::operation::Credentials;

const OK_CODE: &str = "00";
const EXPIRED_CODE: &str = "03";

/// What the server reports about a logged-in account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub nickname: Option<String>,
    pub scores: Option<i64>,
}

impl SessionInfo {
    /// Read from a `res` object. `myinfo` puts the fields at the top level,
    /// `init` nests them under `user`.
    pub fn from_res(res: &Value) -> Self {
        let field = |name: &str| {
            res.get(name)
                .or_else(|| res.get("user").and_then(|u| u.get(name)))
                .filter(|v| !v.is_null())
        };
        Self {
            nickname: field("nickname").and_then(Value::as_str).map(str::to_string),
            scores: field("scores").and_then(as_i64),
        }
    }
}

/// Result of exchanging a share url for credentials.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub credentials: Credentials,
    pub session: SessionInfo,
}

/// Unwrap the `res` object of a session response.
///
/// `"00"` with a `res` object is success, `"03"` means the login expired,
/// anything else is a rejection.
pub fn read_session_response(raw: &RawResult) -> Result<Value, SessionError> {
    let message = raw.message().unwrap_or_default();
    if !raw.is_success_status() {
        return Err(SessionError::Rejected {
            code: format!("HTTP {}", raw.status),
            message,
        });
    }
    let Some(code) = raw.code() else {
        return Err(SessionError::Malformed("response has no result code".into()));
    };
    match code.as_str() {
        OK_CODE => match &raw.body {
            RawBody::Json(v) => v
                .get("res")
                .filter(|r| r.is_object())
                .cloned()
                .ok_or_else(|| SessionError::Malformed("success without `res`".into())),
            RawBody::Text(_) => Err(SessionError::Malformed("body is not json".into())),
        },
        EXPIRED_CODE if message.is_empty() => Err(SessionError::Expired("login expired".into())),
        EXPIRED_CODE => Err(SessionError::Expired(message)),
        _ => Err(SessionError::Rejected { code, message }),
    }
}

/// Numbers arrive either as json numbers or as digit strings.
fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn myinfo_fields_are_top_level() {
        let info = SessionInfo::from_res(&json!({"nickname": "n", "scores": "320"}));
        assert_eq!(info.nickname.as_deref(), Some("n"));
        assert_eq!(info.scores, Some(320));
    }

    #[test]
    fn init_fields_are_under_user() {
        let info = SessionInfo::from_res(&json!({"uid": "u", "user": {"nickname": "m", "scores": 15}}));
        assert_eq!(info.nickname.as_deref(), Some("m"));
        assert_eq!(info.scores, Some(15));
    }

    #[test]
    fn ok_code_yields_res() {
        let raw = RawResult::json(200, json!({"code": "00", "res": {"scores": 1}}));
        assert_eq!(read_session_response(&raw).unwrap(), json!({"scores": 1}));
    }

    #[test]
    fn expired_code_uses_server_message() {
        let raw = RawResult::json(200, json!({"code": "03", "res": {"tmsg": "请重新登录"}}));
        assert!(matches!(
            read_session_response(&raw),
            Err(SessionError::Expired(m)) if m == "请重新登录"
        ));
        let raw = RawResult::json(200, json!({"code": "03"}));
        assert!(matches!(
            read_session_response(&raw),
            Err(SessionError::Expired(m)) if m == "login expired"
        ));
    }

    #[test]
    fn other_failures_are_rejections() {
        let raw = RawResult::json(200, json!({"code": "01", "msg": "参数错误"}));
        assert!(matches!(
            read_session_response(&raw),
            Err(SessionError::Rejected { code, .. }) if code == "01"
        ));
        let raw = RawResult::from_text(502, "bad gateway");
        assert!(matches!(
            read_session_response(&raw),
            Err(SessionError::Rejected { code, .. }) if code == "HTTP 502"
        ));
        let raw = RawResult::json(200, json!({"code": "00"}));
        assert!(matches!(
            read_session_response(&raw),
            Err(SessionError::Malformed(_))
        ));
    }
}
