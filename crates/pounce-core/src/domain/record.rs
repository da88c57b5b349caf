//! Task record: the mutable half of a claim task.

use std::time::Duration;

use tokio::time::Instant;

use super::errors::StateError;
use super::ids::TaskId;
use super::outcome::Outcome;
use super::state::TaskState;

/// Single source of truth for one task's progress.
///
/// All transitions go through the methods below, which enforce:
/// - a terminal state never changes again,
/// - `attempt_count` only grows while `Running`.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    task_id: TaskId,
    state: TaskState,
    attempt_count: u64,
    last_outcome: Option<Outcome>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl TaskRecord {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            state: TaskState::Pending,
            attempt_count: 0,
            last_outcome: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn attempt_count(&self) -> u64 {
        self.attempt_count
    }

    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.last_outcome.as_ref()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Pending -> Running.
    pub fn start(&mut self) -> Result<(), StateError> {
        self.transition(TaskState::Running)?;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Count a new attempt. Returns the 1-based attempt number.
    pub fn begin_attempt(&mut self) -> Result<u64, StateError> {
        if self.state != TaskState::Running {
            return Err(StateError {
                from: self.state,
                to: TaskState::Running,
            });
        }
        self.attempt_count += 1;
        Ok(self.attempt_count)
    }

    /// Remember the classification of the attempt that just finished.
    pub fn record_outcome(&mut self, outcome: Outcome) {
        if !self.state.is_terminal() {
            self.last_outcome = Some(outcome);
        }
    }

    /// Move to a terminal state.
    pub fn finish(&mut self, to: TaskState) -> Result<(), StateError> {
        if !to.is_terminal() {
            return Err(StateError {
                from: self.state,
                to,
            });
        }
        self.transition(to)?;
        self.finished_at = Some(Instant::now());
        Ok(())
    }

    /// Time since `start`, frozen at `finish`. Zero if never started.
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            (None, _) => Duration::ZERO,
        }
    }

    fn transition(&mut self, to: TaskState) -> Result<(), StateError> {
        if !self.state.can_transition_to(to) {
            return Err(StateError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> TaskRecord {
        let mut r = TaskRecord::new(TaskId::new("box-1"));
        r.start().unwrap();
        r
    }

    #[test]
    fn attempts_only_count_while_running() {
        let mut r = TaskRecord::new(TaskId::new("box-1"));
        assert!(r.begin_attempt().is_err());
        assert_eq!(r.attempt_count(), 0);

        r.start().unwrap();
        assert_eq!(r.begin_attempt().unwrap(), 1);
        assert_eq!(r.begin_attempt().unwrap(), 2);
    }

    #[test]
    fn terminal_state_is_frozen() {
        let mut r = running();
        r.begin_attempt().unwrap();
        r.finish(TaskState::Succeeded).unwrap();

        assert!(r.begin_attempt().is_err());
        assert!(r.finish(TaskState::Stopped).is_err());
        r.record_outcome(Outcome::retryable("late"));

        assert_eq!(r.state(), TaskState::Succeeded);
        assert_eq!(r.attempt_count(), 1);
        assert!(r.last_outcome().is_none());
    }

    #[test]
    fn finish_rejects_non_terminal_target() {
        let mut r = running();
        let err = r.finish(TaskState::Pending).unwrap_err();
        assert_eq!(err.from, TaskState::Running);
        assert_eq!(err.to, TaskState::Pending);
    }

    #[test]
    fn pending_task_can_be_stopped_without_attempts() {
        let mut r = TaskRecord::new(TaskId::new("box-2"));
        r.finish(TaskState::Stopped).unwrap();
        assert_eq!(r.attempt_count(), 0);
        assert_eq!(r.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_freezes_at_finish() {
        let mut r = running();
        tokio::time::sleep(Duration::from_millis(300)).await;
        r.finish(TaskState::FailedExhausted).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(r.elapsed(), Duration::from_millis(300));
    }
}
