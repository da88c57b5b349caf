//! TOML configuration.
//!
//! # Example
//!
//! ```toml
//! [endpoint]
//! base_url = "https://example.com/api/jan5424542/"
//!
//! [retry]
//! interval_ms = 100
//! max_attempts = 50
//!
//! [clock]
//! at = "21:00:00.000"
//! utc_offset_hours = 8
//!
//! [credentials]
//! account_id = "account.xxxx"
//! session_token = "xxxx"
//!
//! [[tasks]]
//! id = "box-1"
//! operation = "claim-box"
//! resource = "1"
//! ```
//!
//! Every section is optional; omitted values fall back to the defaults
//! below. Credentials and the base url are usually supplied by the CLI.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::app::{DEFAULT_TIME_SERVERS, SchedulerBuilder};
use crate::domain::{
    Budget, ClaimSpec, ConfigError, Credentials, MessageRules, Operation, OperationKind,
    ResponseClassifier, parse_time_of_day, utc_offset_hours,
};
use crate::impls::HttpEndpoint;
use crate::ports::EndpointClient;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub retry: RetryConfig,
    pub clock: ClockConfig,
    pub credentials: CredentialsConfig,
    /// Per-operation message rules, keyed by operation name. Replaces the
    /// built-in rules of that operation.
    pub rules: BTreeMap<String, MessageRules>,
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointConfig {
    pub base_url: Option<String>,
    pub timeout_ms: u64,
    pub user_agent: Option<String>,
    /// Operation name -> route relative to `base_url`.
    pub routes: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 30_000,
            user_agent: None,
            routes: BTreeMap::new(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub interval_ms: u64,
    pub max_attempts: u64,
    /// Ignore `max_attempts` and retry until success, a permanent failure or
    /// cancellation.
    pub unbounded: bool,
    pub attempt_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            max_attempts: 50,
            unbounded: false,
            attempt_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    pub servers: Vec<String>,
    pub per_server_timeout_ms: u64,
    pub utc_offset_hours: i32,
    /// Daily activation time, `HH:MM:SS[.mmm]` in `utc_offset_hours`.
    /// Absent means "start immediately".
    pub at: Option<String>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            servers: DEFAULT_TIME_SERVERS.iter().map(|s| s.to_string()).collect(),
            per_server_timeout_ms: 2_000,
            utc_offset_hours: 8,
            at: None,
        }
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsConfig {
    pub account_id: String,
    pub session_token: String,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("account_id", &self.account_id)
            .field("session_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub id: String,
    pub operation: String,
    /// Box number or item id. Sign-in needs none.
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl TaskConfig {
    pub fn to_operation(&self) -> Result<Operation, ConfigError> {
        let kind: OperationKind = self.operation.parse()?;
        let mut op = match (kind, &self.resource) {
            (OperationKind::SignIn, None) => Operation::sign_in(),
            (_, Some(resource)) => Operation::new(kind, resource.clone()),
            (_, None) => return Err(ConfigError::MissingResource(self.id.clone())),
        };
        for (k, v) in &self.params {
            op = op.with_param(k.clone(), v.clone());
        }
        Ok(op)
    }
}

impl Config {
    /// Parse and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Everything that can be checked without credentials or a base url,
    /// which are often filled in later from the command line.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        self.budget().validate()?;
        if self.clock.per_server_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("time server"));
        }
        if self.endpoint.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("http"));
        }
        self.zone()?;
        self.time_of_day()?;
        self.classifier()?;
        for route in self.endpoint.routes.keys() {
            route.parse::<OperationKind>()?;
        }
        for task in &self.tasks {
            task.to_operation()?;
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.retry.interval_ms)
    }

    pub fn budget(&self) -> Budget {
        Budget {
            max_attempts: (!self.retry.unbounded).then_some(self.retry.max_attempts),
            attempt_timeout: Duration::from_millis(self.retry.attempt_timeout_ms),
        }
    }

    pub fn per_server_timeout(&self) -> Duration {
        Duration::from_millis(self.clock.per_server_timeout_ms)
    }

    pub fn zone(&self) -> Result<FixedOffset, ConfigError> {
        utc_offset_hours(self.clock.utc_offset_hours)
    }

    pub fn time_of_day(&self) -> Result<Option<NaiveTime>, ConfigError> {
        self.clock.at.as_deref().map(parse_time_of_day).transpose()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.credentials.account_id.clone(),
            self.credentials.session_token.clone(),
        )
    }

    pub fn classifier(&self) -> Result<ResponseClassifier, ConfigError> {
        let mut classifier = ResponseClassifier::default();
        for (name, rules) in &self.rules {
            classifier = classifier.with_rules(name.parse()?, rules.clone());
        }
        Ok(classifier)
    }

    /// One `ClaimSpec` per `[[tasks]]` entry, all using the configured
    /// credentials.
    pub fn specs(&self) -> Result<Vec<ClaimSpec>, ConfigError> {
        let credentials = self.credentials();
        self.tasks
            .iter()
            .map(|t| -> Result<ClaimSpec, ConfigError> {
                Ok(ClaimSpec::new(t.id.clone(), t.to_operation()?, credentials.clone()))
            })
            .collect()
    }

    pub fn http_endpoint(&self) -> Result<HttpEndpoint, ConfigError> {
        let base_url = self
            .endpoint
            .base_url
            .as_deref()
            .ok_or_else(|| ConfigError::InvalidBaseUrl {
                url: String::new(),
                reason: "no base url configured".into(),
            })?;

        let mut builder = HttpEndpoint::builder(base_url)
            .timeout(Duration::from_millis(self.endpoint.timeout_ms));
        if let Some(agent) = &self.endpoint.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        for (name, route) in &self.endpoint.routes {
            builder = builder.route(name.parse()?, route.clone());
        }
        for (name, value) in &self.endpoint.headers {
            builder = builder.header(name.clone(), value.clone());
        }
        for (name, value) in &self.endpoint.cookies {
            builder = builder.cookie(name.clone(), value.clone());
        }
        builder.build()
    }

    /// A `SchedulerBuilder` carrying the retry, budget, classifier and clock
    /// settings of this config.
    pub fn scheduler_builder(
        &self,
        endpoint: Arc<dyn EndpointClient>,
    ) -> Result<SchedulerBuilder, ConfigError> {
        Ok(SchedulerBuilder::new(endpoint)
            .interval(self.interval())
            .budget(self.budget())
            .classifier(self.classifier()?)
            .time_servers(self.clock.servers.clone())
            .per_server_timeout(self.per_server_timeout()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.interval(), Duration::from_millis(100));
        assert_eq!(config.budget(), Budget::default());
        assert_eq!(config.clock.servers.len(), 4);
        assert_eq!(config.zone().unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(config.time_of_day().unwrap(), None);
    }

    #[test]
    fn full_config_produces_specs() {
        let config = Config::from_toml_str(
            r#"
            [endpoint]
            base_url = "https://example.com/api/act"
            routes = { exchange = "game/v2/exchange" }
            cookies = { laravel_session = "abc" }

            [retry]
            interval_ms = 250
            unbounded = true

            [clock]
            at = "20:59:59.800"
            utc_offset_hours = 9

            [credentials]
            account_id = "account.1"
            session_token = "tok"

            [rules.claim-box]
            already_claimed = ["already"]

            [[tasks]]
            id = "box-3"
            operation = "claim-box"
            resource = "3"

            [[tasks]]
            id = "daily"
            operation = "sign-in"
            "#,
        )
        .unwrap();

        assert_eq!(config.budget().max_attempts, None);
        assert_eq!(config.interval(), Duration::from_millis(250));
        assert!(config.time_of_day().unwrap().is_some());

        let specs = config.specs().unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].operation, Operation::claim_box("3"));
        assert_eq!(specs[1].operation, Operation::sign_in());
        assert!(specs[1].credentials.is_complete());

        let classifier = config.classifier().unwrap();
        assert_eq!(
            classifier.rules(OperationKind::ClaimBox).map(|r| r.already_claimed.clone()),
            Some(vec!["already".to_string()])
        );
        assert!(config.http_endpoint().is_ok());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("[retry]\ninterval_ms = 0"),
            Err(ConfigError::ZeroInterval)
        ));
        assert!(matches!(
            Config::from_toml_str("[retry]\nmax_attempts = 0"),
            Err(ConfigError::ZeroMaxAttempts)
        ));
        assert!(matches!(
            Config::from_toml_str("[clock]\nat = \"25:00\""),
            Err(ConfigError::InvalidTimeOfDay(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[[tasks]]\nid = \"x\"\noperation = \"open-box\""),
            Err(ConfigError::UnknownOperation(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[[tasks]]\nid = \"x\"\noperation = \"exchange\""),
            Err(ConfigError::MissingResource(id)) if id == "x"
        ));
        assert!(matches!(
            Config::from_toml_str("[retry]\nbogus = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_base_url_is_a_config_error() {
        let config = Config::default();
        assert!(matches!(
            config.http_endpoint(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
