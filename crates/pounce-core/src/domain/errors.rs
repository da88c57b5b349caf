//! Errors and their classification.
//!
//! Only `ConfigError` and `SchedulerError` ever reach the caller
//! synchronously. `NetworkError` is folded into the retry pipeline and
//! `SyncError` degrades the scheduler to the local clock.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::ids::TaskId;
use super::state::TaskState;

/// Invalid configuration, rejected before any task starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("retry interval must be greater than zero")]
    ZeroInterval,

    #[error("max_attempts must be at least 1 (omit it for an unbounded budget)")]
    ZeroMaxAttempts,

    #[error("{0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("credentials are incomplete: account id and session token are both required")]
    EmptyCredentials,

    #[error("no time servers configured")]
    NoTimeServers,

    #[error("unknown operation `{0}` (expected sign-in, claim-box or exchange)")]
    UnknownOperation(String),

    #[error("task `{0}` needs a resource (box number or item id)")]
    MissingResource(String),

    #[error("invalid base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("utc offset of {0} hours is out of range")]
    InvalidUtcOffset(i32),

    #[error("invalid time of day `{0}` (expected HH:MM:SS[.mmm])")]
    InvalidTimeOfDay(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Scheduler-level failures returned synchronously from `spawn` / `run`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no tasks supplied")]
    NoTasks,

    #[error("duplicate task id `{0}`")]
    DuplicateTaskId(TaskId),
}

/// Transport-level failure of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    Body,
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::Connect => "connect",
            NetworkErrorKind::Body => "body",
            NetworkErrorKind::Other => "network",
        };
        f.write_str(s)
    }
}

impl NetworkError {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            NetworkErrorKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }
}

/// Failure of a single time-server query.
#[derive(Debug, Error)]
pub enum TimeQueryError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("server refused with kiss code `{0}`")]
    KissOfDeath(String),
}

/// Clock synchronization exhausted every server.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no time servers to query")]
    NoServers,

    #[error("all {} time servers failed", failures.len())]
    AllServersFailed { failures: Vec<(String, String)> },
}

/// Session probe (`myinfo`) or credential bootstrap (`init`) failed.
///
/// Never carries the share url or a token: both are secrets.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session expired: {0}")]
    Expired(String),

    #[error("session request rejected (code {code}): {message}")]
    Rejected { code: String, message: String },

    #[error("unexpected session response: {0}")]
    Malformed(String),

    #[error("invalid share url: {0}")]
    InvalidShareUrl(String),

    #[error("share url has no `{0}` parameter")]
    MissingShareParam(&'static str),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Illegal `TaskRecord` transition. Indicates a bug in the task loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct StateError {
    pub from: TaskState,
    pub to: TaskState,
}
