//! EventSink port - イベント通知の抽象化
//!
//! Tasks emit from many tokio tasks at once, so `emit` is synchronous and
//! must not block. Sinks that need I/O should hand the event to a channel.

use crate::domain::ClaimEvent;

/// EventSink は ClaimEvent を受け取る
///
/// # 実装
/// - `ChannelSink`: tokio mpsc へ転送
/// - `TracingSink`: tracing のログ行に変換
/// - `NoopSink`: 何もしない
/// - `FanoutSink`: 複数の sink に順番に転送
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ClaimEvent);
}
