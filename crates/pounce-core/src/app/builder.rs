//! SchedulerBuilder - Scheduler の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 不正な interval / budget / timeout は `build()` 時に ConfigError
//! - 実行時にはもう設定エラーが起きない

use std::sync::Arc;
use std::time::Duration;

use super::clock_sync::ClockSync;
use super::scheduler::{Scheduler, SchedulerParts};
use crate::domain::{Budget, ConfigError, ResponseClassifier, RetryPolicy};
use crate::impls::{NoopSink, SntpTimeSource};
use crate::ports::{
    Clock, EndpointClient, EventSink, IdGenerator, SystemClock, TimeSource, UlidGenerator,
};

/// Public NTP servers tried in order when none are configured.
pub const DEFAULT_TIME_SERVERS: [&str; 4] = [
    "ntp.aliyun.com",
    "ntp1.aliyun.com",
    "ntp2.aliyun.com",
    "ntp.tencent.com",
];

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_PER_SERVER_TIMEOUT: Duration = Duration::from_secs(2);

/// # 使用例
/// ```ignore
/// let scheduler = SchedulerBuilder::new(Arc::new(endpoint))
///     .interval(Duration::from_millis(100))
///     .max_attempts(Some(50))
///     .event_sink(Arc::new(TracingSink))
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    endpoint: Arc<dyn EndpointClient>,
    time_source: Option<Arc<dyn TimeSource>>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    ids: Option<Arc<dyn IdGenerator>>,
    classifier: ResponseClassifier,
    interval: Duration,
    budget: Budget,
    servers: Vec<String>,
    per_server_timeout: Duration,
}

impl SchedulerBuilder {
    pub fn new(endpoint: Arc<dyn EndpointClient>) -> Self {
        Self {
            endpoint,
            time_source: None,
            clock: Arc::new(SystemClock),
            sink: Arc::new(NoopSink),
            ids: None,
            classifier: ResponseClassifier::default(),
            interval: DEFAULT_RETRY_INTERVAL,
            budget: Budget::default(),
            servers: DEFAULT_TIME_SERVERS.iter().map(|s| s.to_string()).collect(),
            per_server_timeout: DEFAULT_PER_SERVER_TIMEOUT,
        }
    }

    /// Defaults to SNTP over UDP.
    pub fn time_source(mut self, source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(source);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Defaults to a ULID generator driven by the configured clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn classifier(mut self, classifier: ResponseClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// `None` = unbounded.
    pub fn max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.budget.max_attempts = max_attempts;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.budget.attempt_timeout = timeout;
        self
    }

    pub fn budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Replaces the server list. An empty list only allows `Immediate` runs.
    pub fn time_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.servers = servers.into_iter().map(Into::into).collect();
        self
    }

    pub fn per_server_timeout(mut self, timeout: Duration) -> Self {
        self.per_server_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Scheduler, ConfigError> {
        let policy = RetryPolicy::new(self.interval)?;
        self.budget.validate()?;
        if self.per_server_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("time server"));
        }

        let time_source: Arc<dyn TimeSource> = match self.time_source {
            Some(source) => source,
            None => Arc::new(SntpTimeSource::new()),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&self.clock))),
        };

        Ok(Scheduler::from_parts(SchedulerParts {
            endpoint: self.endpoint,
            classifier: self.classifier,
            policy,
            budget: self.budget,
            sink: self.sink,
            clock: Arc::clone(&self.clock),
            ids,
            clock_sync: ClockSync::new(time_source, self.clock),
            servers: self.servers,
            per_server_timeout: self.per_server_timeout,
        }))
    }
}
