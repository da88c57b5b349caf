//! EventSink implementations.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::{ClaimEvent, OutcomeKind, TaskState};
use crate::ports::EventSink;

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: ClaimEvent) {}
}

/// Forwards events to an unbounded tokio channel for real-time consumers.
///
/// Unbounded so that `emit` never blocks a task loop. Once the receiver is
/// gone events are silently discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ClaimEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClaimEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ClaimEvent) {
        // ignore send error: receiver may already be dropped
        let _ = self.tx.send(event);
    }
}

/// Renders events as structured log lines under the `pounce::events` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ClaimEvent) {
        match event {
            ClaimEvent::ClockSynced {
                server, offset_ms, ..
            } => info!(target: "pounce::events", %server, offset_ms, "clock synced"),
            ClaimEvent::SyncDegraded { reason, .. } => {
                warn!(target: "pounce::events", %reason, "using local clock")
            }
            ClaimEvent::Activated {
                run_id,
                task_count,
                waited,
                ..
            } => info!(
                target: "pounce::events",
                %run_id,
                task_count,
                waited_ms = waited.as_millis() as u64,
                "activated"
            ),
            ClaimEvent::Attempt(a) => match a.outcome {
                OutcomeKind::Success => info!(
                    target: "pounce::events",
                    task_id = %a.task_id,
                    attempt = a.attempt_number,
                    message = %a.message,
                    "attempt succeeded"
                ),
                kind => info!(
                    target: "pounce::events",
                    task_id = %a.task_id,
                    attempt = a.attempt_number,
                    outcome = %kind,
                    message = %a.message,
                    "attempt"
                ),
            },
            ClaimEvent::Finished(t) => match t.final_state {
                TaskState::Succeeded | TaskState::Stopped => info!(
                    target: "pounce::events",
                    task_id = %t.task_id,
                    state = %t.final_state,
                    attempts = t.attempts,
                    summary = %t.summary,
                    "finished"
                ),
                _ => warn!(
                    target: "pounce::events",
                    task_id = %t.task_id,
                    state = %t.final_state,
                    attempts = t.attempts,
                    summary = %t.summary,
                    "finished"
                ),
            },
            ClaimEvent::RunCompleted { run_id, counts, .. } => info!(
                target: "pounce::events",
                %run_id,
                succeeded = counts.succeeded,
                failed = counts.failed_permanent + counts.failed_exhausted,
                stopped = counts.stopped,
                "run completed"
            ),
        }
    }
}

/// Forwards each event to several sinks, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: ClaimEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
