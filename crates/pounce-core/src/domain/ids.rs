//! Identifiers.
//!
//! - `TaskId`: caller-supplied, opaque label of one claim (e.g. `box-1`).
//! - `RunId`: ULID of one scheduler run.
//!
//! RunId は Phantom type パターン（`Id<T>`）で実装しています。
//! ULID は時刻でソート可能なので、ログ上で run の順序がそのまま分かります。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Opaque identity of a claim task, chosen by the caller.
///
/// Usually the resource index ("box-1", "box-2", "sign-in"). Uniqueness
/// within one run is enforced by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Marker trait for ULID-backed ids. Supplies the `Display` prefix.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID id. `T` only exists at compile time.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Milliseconds since the Unix epoch encoded in the ULID.
    pub fn timestamp_ms(&self) -> u64 {
        self.ulid.timestamp_ms()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Run のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Identifier of one scheduler run (activation + all of its tasks).
pub type RunId = Id<Run>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_display_has_prefix() {
        let ulid = Ulid::new();
        let id = RunId::from_ulid(ulid);
        assert_eq!(id.as_ulid(), ulid);
        assert!(id.to_string().starts_with("run-"));
    }

    #[test]
    fn run_ids_are_sortable_by_time() {
        let a = RunId::from_ulid(Ulid::from_parts(1_000, 42));
        let b = RunId::from_ulid(Ulid::from_parts(2_000, 1));
        assert!(a < b);
        assert_eq!(a.timestamp_ms(), 1_000);
    }

    #[test]
    fn run_id_serializes_as_bare_ulid() {
        let ulid = Ulid::new();
        let id = RunId::from_ulid(ulid);
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, format!("\"{ulid}\""));
        let back: RunId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn run_id_is_the_size_of_a_ulid() {
        assert_eq!(std::mem::size_of::<RunId>(), std::mem::size_of::<Ulid>());
    }

    #[test]
    fn task_id_serializes_as_plain_string() {
        let id = TaskId::new("box-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"box-1\"");
        assert_eq!(id.to_string(), "box-1");
    }
}
