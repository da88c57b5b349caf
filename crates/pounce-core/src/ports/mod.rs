//! Ports - 抽象化レイヤー
//!
//! 外部システム（報酬 API, NTP サーバ, 観測者）へのインターフェース。
//! The application layer only ever sees these traits; `impls` holds the
//! production adapters and tests substitute scripted fakes.

pub mod clock;
pub mod endpoint;
pub mod event_sink;
pub mod id_generator;
pub mod time_source;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::endpoint::EndpointClient;
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::time_source::TimeSource;
