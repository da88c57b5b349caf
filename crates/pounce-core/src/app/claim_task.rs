//! ClaimTask - 1 つの claim 操作を終端状態まで駆動するループ
//!
//! attempt -> classify -> decide -> (sleep | finish)
//!
//! Cancellation is checked at two points only: at the decision point right
//! after an attempt, and during the inter-attempt sleep. An attempt already
//! in flight always runs to completion (bounded by `attempt_timeout`), and a
//! terminal decision it produces takes precedence over the cancel.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::domain::{
    AttemptEvent, Budget, ClaimEvent, ClaimSpec, FailureReason, NetworkError, Outcome,
    ResponseClassifier, RetryDecision, RetryPolicy, RunId, TaskRecord, TaskReport, TaskState,
    TerminalEvent,
};
use crate::ports::{Clock, EndpointClient, EventSink};

/// Everything a task needs besides its own spec. Shared by all tasks of a
/// run.
#[derive(Clone)]
pub struct TaskContext {
    pub run_id: RunId,
    pub endpoint: Arc<dyn EndpointClient>,
    pub classifier: Arc<ResponseClassifier>,
    pub policy: RetryPolicy,
    pub budget: Budget,
    pub sink: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
}

pub struct ClaimTask {
    spec: ClaimSpec,
    record: TaskRecord,
    ctx: Arc<TaskContext>,
    summary: String,
}

impl ClaimTask {
    pub fn new(spec: ClaimSpec, ctx: Arc<TaskContext>) -> Self {
        let record = TaskRecord::new(spec.task_id.clone());
        Self {
            spec,
            record,
            ctx,
            summary: String::new(),
        }
    }

    pub fn record(&self) -> &TaskRecord {
        &self.record
    }

    /// Drive the task to a terminal state and report how it ended.
    ///
    /// A cancel that is already set when this is called stops the task
    /// before its first attempt (`Pending -> Stopped`).
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> TaskReport {
        let span = info_span!(
            "claim_task",
            task_id = %self.spec.task_id,
            run_id = %self.ctx.run_id,
            operation = %self.spec.operation.kind,
        );
        async move {
            self.drive(&mut cancel).await;
            self.report()
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, cancel: &mut watch::Receiver<bool>) {
        if is_cancelled(cancel) {
            self.finish(TaskState::Stopped, "cancelled before activation".into());
            return;
        }
        if let Err(err) = self.record.start() {
            error!(%err, "task could not start");
            return;
        }
        debug!(resource = %self.spec.operation.resource, "task started");

        loop {
            let attempt_number = match self.record.begin_attempt() {
                Ok(n) => n,
                Err(err) => {
                    error!(%err, "attempt refused");
                    return;
                }
            };

            let outcome = self.attempt_once().await;
            debug!(
                attempt = attempt_number,
                outcome = %outcome.kind,
                message = %outcome.message,
                "attempt classified"
            );
            self.emit_attempt(attempt_number, &outcome);

            let decision =
                self.ctx
                    .policy
                    .next(&outcome, attempt_number, self.ctx.budget.max_attempts);
            let message = outcome.message.clone();
            self.record.record_outcome(outcome);

            match decision {
                RetryDecision::StopSuccess => {
                    self.finish(TaskState::Succeeded, message);
                    return;
                }
                RetryDecision::StopFailure(reason) => {
                    let state = match reason {
                        FailureReason::Permanent(_) => TaskState::FailedPermanent,
                        FailureReason::Exhausted { .. } => TaskState::FailedExhausted,
                    };
                    self.finish(state, reason.to_string());
                    return;
                }
                RetryDecision::Continue(delay) => {
                    if is_cancelled(cancel) {
                        self.finish(TaskState::Stopped, stopped_summary(&message));
                        return;
                    }
                    tokio::select! {
                        biased;
                        _ = cancelled(cancel) => {
                            self.finish(TaskState::Stopped, stopped_summary(&message));
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn attempt_once(&self) -> Outcome {
        let timeout = self.ctx.budget.attempt_timeout;
        let kind = self.spec.operation.kind;
        let call = self
            .ctx
            .endpoint
            .attempt(&self.spec.operation, &self.spec.credentials);

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(raw)) => {
                debug!(status = raw.status, "response received");
                trace!(body = ?raw.body, "response body");
                self.ctx.classifier.classify(kind, &raw)
            }
            Ok(Err(err)) => self.ctx.classifier.classify_network_error(&err),
            Err(_) => self
                .ctx
                .classifier
                .classify_network_error(&NetworkError::timeout(timeout)),
        }
    }

    fn emit_attempt(&self, attempt_number: u64, outcome: &Outcome) {
        self.ctx.sink.emit(ClaimEvent::Attempt(AttemptEvent {
            task_id: self.spec.task_id.clone(),
            attempt_number,
            outcome: outcome.kind,
            message: outcome.message.clone(),
            timestamp: self.ctx.clock.now(),
            elapsed: self.record.elapsed(),
        }));
    }

    fn finish(&mut self, state: TaskState, summary: String) {
        if let Err(err) = self.record.finish(state) {
            error!(%err, "illegal terminal transition");
            return;
        }
        let attempts = self.record.attempt_count();
        match state {
            TaskState::Succeeded => info!(attempts, %summary, "claim succeeded"),
            TaskState::Stopped => info!(attempts, %summary, "task stopped"),
            _ => warn!(attempts, state = %state, %summary, "claim failed"),
        }
        self.summary = summary.clone();
        self.ctx.sink.emit(ClaimEvent::Finished(TerminalEvent {
            task_id: self.spec.task_id.clone(),
            final_state: state,
            summary,
            attempts,
            timestamp: self.ctx.clock.now(),
            elapsed: self.record.elapsed(),
        }));
    }

    fn report(&self) -> TaskReport {
        let payload = match self.record.state() {
            TaskState::Succeeded => self.record.last_outcome().and_then(|o| o.payload.clone()),
            _ => None,
        };
        TaskReport {
            final_state: self.record.state(),
            message: self.summary.clone(),
            attempts: self.record.attempt_count(),
            elapsed: self.record.elapsed(),
            payload,
        }
    }
}

fn stopped_summary(last_message: &str) -> String {
    format!("cancelled (last outcome: {last_message})")
}

pub(crate) fn is_cancelled(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Resolves once cancel is set. A dropped sender never resolves: the run
/// then simply continues to completion.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|c| *c).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
