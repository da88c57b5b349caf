//! App - アプリケーション層
//!
//! ports を組み合わせて claim の実行ロジックを実装します。
//!
//! # 主要コンポーネント
//! - **SchedulerBuilder**: 構築と起動時検証
//! - **Scheduler**: deadline 待ち + タスクの同時起動 + 集約
//! - **ClaimTask**: 1 タスクのリトライループ
//! - **ClockSync**: NTP サーバとのオフセット推定

pub mod builder;
pub mod claim_task;
pub mod clock_sync;
pub mod scheduler;

pub use self::builder::{
    DEFAULT_PER_SERVER_TIMEOUT, DEFAULT_RETRY_INTERVAL, DEFAULT_TIME_SERVERS, SchedulerBuilder,
};
pub use self::claim_task::{ClaimTask, TaskContext};
pub use self::clock_sync::ClockSync;
pub use self::scheduler::{RunHandle, Scheduler};
