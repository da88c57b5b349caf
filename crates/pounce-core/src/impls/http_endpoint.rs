//! reqwest-backed `EndpointClient`.
//!
//! Every operation is a form POST of `uid`, `token`, `type` (plus any extra
//! params) to `<base_url>/<route>`. One `reqwest::Client` (connection pool,
//! cookie jar, default headers) is shared by all tasks.
//!
//! Besides the claim routes, `check_session` (`myinfo`) probes whether a
//! uid/token pair is still logged in and `bootstrap` (`init`) exchanges a
//! share url for a fresh pair.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::cookie::Jar;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tracing::{debug, trace};
use url::{Url, form_urlencoded};

use crate::domain::{
    Bootstrap, ConfigError, Credentials, NetworkError, NetworkErrorKind, Operation, OperationKind,
    RawResult, SessionError, SessionInfo, read_session_response,
};
use crate::ports::EndpointClient;

/// Route of each operation, relative to the base url.
pub fn default_route(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::SignIn => "activity/dailyfcard",
        OperationKind::ClaimBox => "game/qexchange",
        OperationKind::Exchange => "game/exchangedl",
    }
}

/// Session status and points balance.
pub const SESSION_ROUTE: &str = "myinfo";
/// Share-url login.
pub const INIT_ROUTE: &str = "init";

const DEFAULT_USER_AGENT: &str = concat!("pounce/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    base_url: Url,
    routes: HashMap<OperationKind, String>,
}

impl HttpEndpoint {
    /// Start building an endpoint rooted at `base_url`.
    pub fn builder(base_url: &str) -> HttpEndpointBuilder {
        HttpEndpointBuilder::new(base_url)
    }

    /// Full url of `kind`'s route.
    pub fn url_for(&self, kind: OperationKind) -> Result<Url, NetworkError> {
        let route = self
            .routes
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_route(kind));
        self.join(route)
    }

    fn join(&self, route: &str) -> Result<Url, NetworkError> {
        self.base_url
            .join(route.trim_start_matches('/'))
            .map_err(|err| NetworkError::new(NetworkErrorKind::Other, err.to_string()))
    }

    async fn post_form<T: Serialize + ?Sized>(
        &self,
        url: Url,
        form: &T,
    ) -> Result<RawResult, NetworkError> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_reqwest_error)?;
        Ok(RawResult::from_text(status, text))
    }

    /// Ask `myinfo` whether `credentials` are still logged in.
    ///
    /// Code `"03"` comes back as `SessionError::Expired`.
    pub async fn check_session(
        &self,
        credentials: &Credentials,
    ) -> Result<SessionInfo, SessionError> {
        let url = self.join(SESSION_ROUTE)?;
        let form = [
            ("uid", credentials.account_id.as_str()),
            ("token", credentials.session_token.as_str()),
        ];
        let raw = self.post_form(url, &form).await?;
        debug!(status = raw.status, code = ?raw.code(), "session probe");
        let res = read_session_response(&raw)?;
        Ok(SessionInfo::from_res(&res))
    }

    /// Log in through `init` with the `siteinfo` / `rand` parameters of a
    /// share url. The returned ticket is the session token.
    pub async fn bootstrap(&self, share_url: &str) -> Result<Bootstrap, SessionError> {
        let (siteinfo, rand) = share_params(share_url)?;
        let url = self.join(INIT_ROUTE)?;
        let form = [
            ("siteinfo", double_encode(&siteinfo)),
            ("rand", double_encode(&rand)),
            ("t", Utc::now().timestamp_millis().to_string()),
        ];
        let raw = self.post_form(url, &form).await?;
        debug!(status = raw.status, code = ?raw.code(), "share url login");

        let res = read_session_response(&raw)?;
        let text = |name: &str| match res.get(name) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let (Some(uid), Some(ticket)) = (text("uid"), text("ticket")) else {
            return Err(SessionError::Malformed("login response lacks uid or ticket".into()));
        };
        Ok(Bootstrap {
            credentials: Credentials::new(uid, ticket),
            session: SessionInfo::from_res(&res),
        })
    }
}

/// `siteinfo` and `rand` from a share url's query string.
fn share_params(share_url: &str) -> Result<(String, String), SessionError> {
    let url = Url::parse(share_url.trim())
        .map_err(|err| SessionError::InvalidShareUrl(err.to_string()))?;
    let param = |name: &'static str| {
        url.query_pairs()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v.into_owned())
            .ok_or(SessionError::MissingShareParam(name))
    };
    Ok((param("siteinfo")?, param("rand")?))
}

/// The site expects both values percent-encoded twice before the form
/// encoding itself.
fn double_encode(value: &str) -> String {
    let once: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
    form_urlencoded::byte_serialize(once.as_bytes()).collect()
}

#[async_trait]
impl EndpointClient for HttpEndpoint {
    async fn attempt(
        &self,
        operation: &Operation,
        credentials: &Credentials,
    ) -> Result<RawResult, NetworkError> {
        let url = self.url_for(operation.kind)?;

        let mut form: Vec<(&str, &str)> = vec![
            ("uid", credentials.account_id.as_str()),
            ("token", credentials.session_token.as_str()),
            ("type", operation.resource.as_str()),
        ];
        form.extend(operation.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        debug!(%url, operation = %operation.kind, resource = %operation.resource, "sending claim request");
        let raw = self.post_form(url, &form).await?;
        trace!(status = raw.status, body = ?raw.body, "claim response");
        Ok(raw)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> NetworkError {
    let kind = if err.is_timeout() {
        NetworkErrorKind::Timeout
    } else if err.is_connect() {
        NetworkErrorKind::Connect
    } else if err.is_body() || err.is_decode() {
        NetworkErrorKind::Body
    } else {
        NetworkErrorKind::Other
    };
    NetworkError::new(kind, err.to_string())
}

/// Builder for [`HttpEndpoint`].
#[derive(Debug)]
pub struct HttpEndpointBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: Option<String>,
    routes: HashMap<OperationKind, String>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
}

impl HttpEndpointBuilder {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: None,
            routes: HashMap::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// Client-level timeout; the task loop applies its own, usually
    /// tighter, per-attempt bound on top.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn route(mut self, kind: OperationKind, path: impl Into<String>) -> Self {
        self.routes.insert(kind, path.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Pre-seed the session cookie jar (e.g. an existing `laravel_session`).
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<HttpEndpoint, ConfigError> {
        let base_url = parse_base_url(&self.base_url)?;
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("http"));
        }

        let jar = Arc::new(Jar::default());
        for (name, value) in &self.cookies {
            jar.add_cookie_str(&format!("{name}={value}"), &base_url);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .cookie_provider(jar)
            .default_headers(self.default_headers(&base_url)?)
            .user_agent(self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));
        if base_url.host_str().is_some_and(is_loopback_host) {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Ok(HttpEndpoint {
            client,
            base_url,
            routes: self.routes,
        })
    }

    fn default_headers(&self, base_url: &Url) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        let origin = base_url.origin().ascii_serialization();
        if let Ok(value) = HeaderValue::from_str(&origin) {
            headers.insert(header::ORIGIN, value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("{origin}/")) {
            headers.insert(header::REFERER, value);
        }

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| ConfigError::HttpClient(format!("header `{name}`: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| ConfigError::HttpClient(format!("header `{name}`: {err}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Parse and normalize: the path always ends with `/` so that routes join
/// underneath it instead of replacing its last segment.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let mut url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn is_loopback_host(host: &str) -> bool {
    host == "localhost"
        || host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<std::net::IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}
