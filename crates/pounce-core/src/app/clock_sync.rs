//! ClockSync - 基準時刻とのオフセット推定
//!
//! Servers are tried strictly in order and the first answer wins. There is
//! no averaging: one round trip to a nearby server is already well inside
//! the accuracy the deadline needs.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{ClockOffset, SyncError, SyncedOffset, TimeQueryError};
use crate::ports::{Clock, TimeSource};

pub struct ClockSync {
    source: Arc<dyn TimeSource>,
    clock: Arc<dyn Clock>,
}

impl ClockSync {
    pub fn new(source: Arc<dyn TimeSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }

    /// Query `servers` in order, each bounded by `per_server_timeout`.
    ///
    /// The offset is `reference - local`, with the local time read right
    /// after the answer arrives.
    pub async fn sync(
        &self,
        servers: &[String],
        per_server_timeout: Duration,
    ) -> Result<SyncedOffset, SyncError> {
        if servers.is_empty() {
            return Err(SyncError::NoServers);
        }

        let mut failures = Vec::with_capacity(servers.len());
        for server in servers {
            let result = tokio::time::timeout(per_server_timeout, self.source.query(server))
                .await
                .unwrap_or(Err(TimeQueryError::Timeout(per_server_timeout)));

            match result {
                Ok(reference) => {
                    let offset = ClockOffset::between(reference, self.clock.now());
                    info!(
                        server = %server,
                        offset_ms = offset.as_millis(),
                        "clock synchronized"
                    );
                    return Ok(SyncedOffset {
                        server: server.clone(),
                        offset,
                    });
                }
                Err(err) => {
                    warn!(server = %server, error = %err, "time server failed");
                    failures.push((server.clone(), err.to_string()));
                }
            }
        }

        Err(SyncError::AllServersFailed { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Reply {
        Time(DateTime<Utc>),
        Refuse,
        Hang,
    }

    struct ScriptedSource {
        replies: HashMap<String, Reply>,
        asked: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(replies: Vec<(&str, Reply)>) -> Self {
            Self {
                replies: replies
                    .into_iter()
                    .map(|(s, r)| (s.to_string(), r))
                    .collect(),
                asked: Mutex::new(Vec::new()),
            }
        }

        fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TimeSource for ScriptedSource {
        async fn query(&self, server: &str) -> Result<DateTime<Utc>, TimeQueryError> {
            self.asked.lock().unwrap().push(server.to_string());
            match self.replies.get(server) {
                Some(Reply::Time(t)) => Ok(*t),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(TimeQueryError::Malformed("unreachable".into()))
                }
                Some(Reply::Refuse) | None => {
                    Err(TimeQueryError::KissOfDeath("RATE".into()))
                }
            }
        }
    }

    fn local() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 16, 12, 59, 0).unwrap()
    }

    fn servers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_wins_after_failures() {
        let source = Arc::new(ScriptedSource::new(vec![
            ("a", Reply::Refuse),
            ("b", Reply::Hang),
            ("c", Reply::Time(local() + TimeDelta::milliseconds(1_200))),
            ("d", Reply::Time(local())),
        ]));
        let sync = ClockSync::new(source.clone(), Arc::new(FixedClock::new(local())));

        let synced = sync
            .sync(&servers(&["a", "b", "c", "d"]), Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(synced.server, "c");
        assert_eq!(synced.offset.as_millis(), 1_200);
        // "d" is never asked
        assert_eq!(source.asked(), servers(&["a", "b", "c"]));
    }

    #[tokio::test(start_paused = true)]
    async fn every_failure_is_reported() {
        let source = Arc::new(ScriptedSource::new(vec![
            ("a", Reply::Refuse),
            ("b", Reply::Hang),
        ]));
        let sync = ClockSync::new(source, Arc::new(FixedClock::new(local())));

        let err = sync
            .sync(&servers(&["a", "b"]), Duration::from_secs(2))
            .await
            .unwrap_err();

        match err {
            SyncError::AllServersFailed { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(failures[0].1.contains("RATE"));
                assert!(failures[1].1.contains("timed out"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_server_list() {
        let sync = ClockSync::new(
            Arc::new(ScriptedSource::new(vec![])),
            Arc::new(FixedClock::new(local())),
        );
        assert!(matches!(
            sync.sync(&[], Duration::from_secs(1)).await,
            Err(SyncError::NoServers)
        ));
    }
}
