//! pounce-core
//!
//! Time-synchronized claim scheduler: wait for a wall-clock instant on a
//! clock corrected against NTP, then fire one retry loop per claim task,
//! classifying every response into success / retry / stop.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, operation, outcome, classifier, decision, state, record, events, report）
//! - **ports**: 抽象化レイヤー（EndpointClient, TimeSource, Clock, EventSink, IdGenerator）
//! - **app**: アプリケーションロジック（SchedulerBuilder, Scheduler, ClaimTask, ClockSync）
//! - **impls**: 実装（HttpEndpoint, SntpTimeSource, sinks）
//! - **config**: TOML 設定
//! - **observability**: 集計ビュー（TerminalCounts）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{RunHandle, Scheduler, SchedulerBuilder};
pub use config::Config;
pub use domain::{
    Activation, Budget, ClaimEvent, ClaimSpec, ConfigError, Credentials, Operation,
    OperationKind, OutcomeKind, RunReport, SchedulerError, TaskId, TaskReport, TaskState,
};
pub use observability::TerminalCounts;
