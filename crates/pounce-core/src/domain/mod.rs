//! Domain model (ids, operations, outcomes, records, decisions, events).
//!
//! Pure data and pure functions only; nothing in here performs I/O or
//! sleeps. The task loop and scheduler in `app` drive these types.

pub mod classifier;
pub mod clock_offset;
pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod operation;
pub mod outcome;
pub mod record;
pub mod report;
pub mod session;
pub mod spec;
pub mod state;

pub use self::classifier::{MessageRules, RawBody, RawResult, ResponseClassifier};
pub use self::clock_offset::{ClockOffset, SyncedOffset};
pub use self::decision::{FailureReason, RetryDecision, RetryPolicy};
pub use self::errors::{
    ConfigError, NetworkError, NetworkErrorKind, SchedulerError, SessionError, StateError,
    SyncError, TimeQueryError,
};
pub use self::events::{AttemptEvent, ClaimEvent, TerminalEvent};
pub use self::ids::{Id, IdMarker, Run, RunId, TaskId};
pub use self::operation::{Credentials, Operation, OperationKind};
pub use self::outcome::{Outcome, OutcomeKind};
pub use self::record::TaskRecord;
pub use self::report::{RunReport, TaskReport};
pub use self::session::{Bootstrap, SessionInfo, read_session_response};
pub use self::spec::{Activation, Budget, ClaimSpec, parse_time_of_day, utc_offset_hours};
pub use self::state::TaskState;
