//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HttpEndpoint**: reqwest による form POST（EndpointClient）、セッション確認と share url ログイン
//! - **SntpTimeSource**: UDP 上の SNTP クライアント（TimeSource）
//! - **ChannelSink / TracingSink / NoopSink / FanoutSink**: EventSink

pub mod http_endpoint;
pub mod sinks;
pub mod sntp;

pub use self::http_endpoint::{
    HttpEndpoint, HttpEndpointBuilder, INIT_ROUTE, SESSION_ROUTE, default_route,
};
pub use self::sinks::{ChannelSink, FanoutSink, NoopSink, TracingSink};
pub use self::sntp::SntpTimeSource;
