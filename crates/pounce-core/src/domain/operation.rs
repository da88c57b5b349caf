//! What a claim task does against the endpoint, and on whose behalf.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::errors::ConfigError;

/// The kind of claim operation.
///
/// Each kind maps to its own endpoint route and its own subset of the
/// classifier's message rules; the retry loop itself is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Daily sign-in.
    SignIn,
    /// Open a reward box once it becomes claimable.
    ClaimBox,
    /// Redeem points for an item.
    Exchange,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::SignIn,
        OperationKind::ClaimBox,
        OperationKind::Exchange,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::SignIn => "sign-in",
            OperationKind::ClaimBox => "claim-box",
            OperationKind::Exchange => "exchange",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownOperation(s.to_string()))
    }
}

/// Operation descriptor: kind + the resource it targets + extra form params.
///
/// `resource` is the endpoint's `type` parameter (box number, item id, or
/// the sign-in activity code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub resource: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl Operation {
    pub fn new(kind: OperationKind, resource: impl Into<String>) -> Self {
        Self {
            kind,
            resource: resource.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn claim_box(resource: impl Into<String>) -> Self {
        Self::new(OperationKind::ClaimBox, resource)
    }

    pub fn exchange(item: impl Into<String>) -> Self {
        Self::new(OperationKind::Exchange, item)
    }

    /// Sign-in uses a fixed activity code as its resource.
    pub fn sign_in() -> Self {
        Self::new(OperationKind::SignIn, "303")
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// One account's credential pair.
///
/// The session token is deliberately left out of `Debug` so it never ends
/// up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub account_id: String,
    pub session_token: String,
}

impl Credentials {
    pub fn new(account_id: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            session_token: session_token.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.account_id.trim().is_empty() && !self.session_token.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("session_token", &"<redacted>")
            .finish()
    }
}
