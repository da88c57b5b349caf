//! Scheduler - 複数の ClaimTask を同時に起動・集約する
//!
//! Lifecycle of one run:
//! 1. validate specs synchronously (`spawn` returns errors right away)
//! 2. `At(target)`: reuse or obtain a clock offset, then sleep once until
//!    the local instant matching `target`
//! 3. spawn one tokio task per spec, all at once
//! 4. collect every `TaskReport`, emit `RunCompleted`
//!
//! Design note:
//! - The offset cache survives across runs of the same scheduler (and its
//!   clones). A failed run sync is not cached, so the next run tries again.
//!   A failed explicit `sync_clock` is handed to the next run once, which
//!   then degrades without querying the servers a second time.
//! - Cancellation is a `watch<bool>` shared by the deadline wait and every
//!   task. Dropping the `RunHandle` does not cancel the run.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{Instrument, info, info_span, warn};

use super::claim_task::{ClaimTask, TaskContext, cancelled};
use super::clock_sync::ClockSync;
use crate::domain::{
    Activation, Budget, ClaimEvent, ClaimSpec, ClockOffset, ConfigError, ResponseClassifier,
    RetryPolicy, RunId, RunReport, SchedulerError, SyncError, SyncedOffset, TaskId, TaskReport,
    TaskState, TerminalEvent,
};
use crate::observability::TerminalCounts;
use crate::ports::{Clock, EndpointClient, EventSink, IdGenerator};

/// Wiring produced by `SchedulerBuilder`.
pub(crate) struct SchedulerParts {
    pub endpoint: Arc<dyn EndpointClient>,
    pub classifier: ResponseClassifier,
    pub policy: RetryPolicy,
    pub budget: Budget,
    pub sink: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub clock_sync: ClockSync,
    pub servers: Vec<String>,
    pub per_server_timeout: Duration,
}

struct Inner {
    endpoint: Arc<dyn EndpointClient>,
    classifier: Arc<ResponseClassifier>,
    policy: RetryPolicy,
    budget: Budget,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    clock_sync: ClockSync,
    servers: Vec<String>,
    per_server_timeout: Duration,
    offset: Mutex<OffsetSlot>,
}

/// Clock offset state shared by all runs.
#[derive(Debug, Default)]
enum OffsetSlot {
    #[default]
    Empty,
    Synced(SyncedOffset),
    /// `sync_clock` failed; consumed by the next deadline run.
    Failed(String),
}

/// Cheap to clone; clones share the offset cache.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub(crate) fn from_parts(parts: SchedulerParts) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint: parts.endpoint,
                classifier: Arc::new(parts.classifier),
                policy: parts.policy,
                budget: parts.budget,
                sink: parts.sink,
                clock: parts.clock,
                ids: parts.ids,
                clock_sync: parts.clock_sync,
                servers: parts.servers,
                per_server_timeout: parts.per_server_timeout,
                offset: Mutex::new(OffsetSlot::Empty),
            }),
        }
    }

    /// Validate and start a run in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        &self,
        specs: Vec<ClaimSpec>,
        activation: Activation,
    ) -> Result<RunHandle, SchedulerError> {
        self.validate(&specs, &activation)?;

        let run_id = self.inner.ids.generate_run_id();
        let task_ids = specs.iter().map(|s| s.task_id.clone()).collect();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let this = self.clone();
        let span = info_span!("run", %run_id);
        let join = tokio::spawn(
            async move { this.execute(run_id, specs, activation, cancel_rx).await }
                .instrument(span),
        );

        Ok(RunHandle {
            run_id,
            task_ids,
            cancel_tx,
            join,
        })
    }

    /// `spawn` + `join`.
    pub async fn run(
        &self,
        specs: Vec<ClaimSpec>,
        activation: Activation,
    ) -> Result<RunReport, SchedulerError> {
        Ok(self.spawn(specs, activation)?.join().await)
    }

    /// Sync now and cache the result, replacing any cached offset.
    pub async fn sync_clock(&self) -> Result<SyncedOffset, SyncError> {
        let mut slot = self.inner.offset.lock().await;
        match self.sync_and_announce().await {
            Ok(synced) => {
                *slot = OffsetSlot::Synced(synced.clone());
                Ok(synced)
            }
            Err(err) => {
                *slot = OffsetSlot::Failed(err.to_string());
                Err(err)
            }
        }
    }

    pub async fn cached_offset(&self) -> Option<SyncedOffset> {
        match &*self.inner.offset.lock().await {
            OffsetSlot::Synced(synced) => Some(synced.clone()),
            _ => None,
        }
    }

    /// Forget the cached offset (or a pending sync failure); the next
    /// deadline run syncs again.
    pub async fn invalidate_offset(&self) {
        *self.inner.offset.lock().await = OffsetSlot::Empty;
    }

    /// Reference "now": local clock corrected by the cached offset (or the
    /// bare local clock when nothing is cached).
    pub async fn reference_now(&self) -> DateTime<Utc> {
        let offset = self
            .cached_offset()
            .await
            .map(|s| s.offset)
            .unwrap_or(ClockOffset::ZERO);
        offset.to_reference(self.inner.clock.now())
    }

    fn validate(&self, specs: &[ClaimSpec], activation: &Activation) -> Result<(), SchedulerError> {
        if specs.is_empty() {
            return Err(SchedulerError::NoTasks);
        }
        let mut seen = HashSet::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(&spec.task_id) {
                return Err(SchedulerError::DuplicateTaskId(spec.task_id.clone()));
            }
            if !spec.credentials.is_complete() {
                return Err(ConfigError::EmptyCredentials.into());
            }
        }
        if matches!(activation, Activation::At(_)) && self.inner.servers.is_empty() {
            return Err(ConfigError::NoTimeServers.into());
        }
        Ok(())
    }

    async fn execute(
        self,
        run_id: RunId,
        specs: Vec<ClaimSpec>,
        activation: Activation,
        mut cancel: watch::Receiver<bool>,
    ) -> RunReport {
        let wait_started = Instant::now();
        let clock_synced = match activation {
            Activation::Immediate => false,
            Activation::At(target) => self.wait_for_deadline(target, &mut cancel).await,
        };
        let waited = wait_started.elapsed();

        let activated_at = if *cancel.borrow() {
            info!("run cancelled before activation");
            None
        } else {
            let now = self.inner.clock.now();
            info!(
                task_count = specs.len(),
                waited_ms = waited.as_millis() as u64,
                clock_synced,
                "activating tasks"
            );
            self.inner.sink.emit(ClaimEvent::Activated {
                run_id,
                task_count: specs.len(),
                waited,
                timestamp: now,
            });
            Some(now)
        };

        let ctx = Arc::new(TaskContext {
            run_id,
            endpoint: Arc::clone(&self.inner.endpoint),
            classifier: Arc::clone(&self.inner.classifier),
            policy: self.inner.policy,
            budget: self.inner.budget,
            sink: Arc::clone(&self.inner.sink),
            clock: Arc::clone(&self.inner.clock),
        });

        let activated = Instant::now();
        let mut joins: Vec<(TaskId, JoinHandle<TaskReport>)> = Vec::with_capacity(specs.len());
        for spec in specs {
            let task_id = spec.task_id.clone();
            let task = ClaimTask::new(spec, Arc::clone(&ctx));
            joins.push((task_id, tokio::spawn(task.run(cancel.clone()))));
        }

        let mut report = RunReport {
            run_id,
            activated_at,
            clock_synced,
            tasks: Default::default(),
        };
        for (task_id, join) in joins {
            let task_report = match join.await {
                Ok(r) => r,
                Err(err) => self.crashed(&task_id, err, activated.elapsed()),
            };
            report.tasks.insert(task_id, task_report);
        }

        let counts = report.counts();
        log_summary(&counts);
        self.inner.sink.emit(ClaimEvent::RunCompleted {
            run_id,
            counts,
            timestamp: self.inner.clock.now(),
        });
        report
    }

    /// Sleep until `target` (reference time) is reached on the local clock.
    /// Returns whether a synchronized offset was used.
    async fn wait_for_deadline(
        &self,
        target: DateTime<Utc>,
        cancel: &mut watch::Receiver<bool>,
    ) -> bool {
        let synced = self.offset_for_run().await;
        let offset = synced.as_ref().map(|s| s.offset).unwrap_or(ClockOffset::ZERO);

        let local_wake = offset.to_local(target);
        // negative -> already due
        let wait = (local_wake - self.inner.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        info!(
            %target,
            offset_ms = offset.as_millis(),
            wait_ms = wait.as_millis() as u64,
            "waiting for activation"
        );

        if !wait.is_zero() {
            tokio::select! {
                _ = cancelled(cancel) => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
        synced.is_some()
    }

    /// Cached offset, or a fresh sync. A failed sync (fresh or left by
    /// `sync_clock`) emits one `SyncDegraded` and yields `None`.
    async fn offset_for_run(&self) -> Option<SyncedOffset> {
        let mut slot = self.inner.offset.lock().await;
        let reason = match std::mem::take(&mut *slot) {
            OffsetSlot::Synced(synced) => {
                *slot = OffsetSlot::Synced(synced.clone());
                return Some(synced);
            }
            OffsetSlot::Failed(reason) => reason,
            OffsetSlot::Empty => match self.sync_and_announce().await {
                Ok(synced) => {
                    *slot = OffsetSlot::Synced(synced.clone());
                    return Some(synced);
                }
                Err(err) => err.to_string(),
            },
        };
        warn!(error = %reason, "clock sync failed; falling back to the local clock");
        self.inner.sink.emit(ClaimEvent::SyncDegraded {
            reason,
            timestamp: self.inner.clock.now(),
        });
        None
    }

    async fn sync_and_announce(&self) -> Result<SyncedOffset, SyncError> {
        let synced = self
            .inner
            .clock_sync
            .sync(&self.inner.servers, self.inner.per_server_timeout)
            .await?;
        self.inner.sink.emit(ClaimEvent::ClockSynced {
            server: synced.server.clone(),
            offset_ms: synced.offset.as_millis(),
            timestamp: self.inner.clock.now(),
        });
        Ok(synced)
    }

    /// A task that panicked (or was aborted) still gets a report entry.
    fn crashed(&self, task_id: &TaskId, err: JoinError, elapsed: Duration) -> TaskReport {
        let message = format!("task crashed: {}", join_error_message(err));
        warn!(task_id = %task_id, %message, "claim task did not finish normally");
        self.inner.sink.emit(ClaimEvent::Finished(TerminalEvent {
            task_id: task_id.clone(),
            final_state: TaskState::FailedPermanent,
            summary: message.clone(),
            attempts: 0,
            timestamp: self.inner.clock.now(),
            elapsed,
        }));
        TaskReport {
            final_state: TaskState::FailedPermanent,
            message,
            attempts: 0,
            elapsed,
            payload: None,
        }
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "aborted".to_string();
    }
    let panic = err.into_panic();
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

fn log_summary(counts: &TerminalCounts) {
    info!(
        succeeded = counts.succeeded,
        failed_permanent = counts.failed_permanent,
        failed_exhausted = counts.failed_exhausted,
        stopped = counts.stopped,
        "run completed"
    );
}

/// Handle to a run started with `Scheduler::spawn`.
///
/// - `request_cancel()` で全タスクに停止を通知
/// - `join()` で RunReport を待つ
pub struct RunHandle {
    run_id: RunId,
    task_ids: Vec<TaskId>,
    cancel_tx: watch::Sender<bool>,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Ask every non-terminal task to stop. In-flight attempts finish first.
    pub fn request_cancel(&self) {
        // ignore send error: the run may already be over
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for every task to reach a terminal state.
    pub async fn join(mut self) -> RunReport {
        let result = (&mut self.join).await;
        self.into_report(result)
    }

    /// Like `join`, but cancel the run as soon as `stop` resolves (e.g. a
    /// Ctrl-C future) and then keep waiting for the tasks to wind down.
    pub async fn join_until<F: Future>(mut self, stop: F) -> RunReport {
        let result = tokio::select! {
            result = &mut self.join => result,
            _ = stop => {
                info!(run_id = %self.run_id, "stop requested");
                self.request_cancel();
                (&mut self.join).await
            }
        };
        self.into_report(result)
    }

    pub async fn cancel_and_join(self) -> RunReport {
        self.request_cancel();
        self.join().await
    }

    fn into_report(self, result: Result<RunReport, JoinError>) -> RunReport {
        match result {
            Ok(report) => report,
            Err(err) => {
                // the run driver itself died: report every task as failed
                let message = format!("run crashed: {}", join_error_message(err));
                warn!(run_id = %self.run_id, %message, "run driver did not finish normally");
                RunReport {
                    run_id: self.run_id,
                    activated_at: None,
                    clock_synced: false,
                    tasks: self
                        .task_ids
                        .into_iter()
                        .map(|id| {
                            let entry = TaskReport {
                                final_state: TaskState::FailedPermanent,
                                message: message.clone(),
                                attempts: 0,
                                elapsed: Duration::ZERO,
                                payload: None,
                            };
                            (id, entry)
                        })
                        .collect(),
                }
            }
        }
    }
}
