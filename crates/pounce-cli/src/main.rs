//! pounce: 指定時刻に報酬エンドポイントへ一斉にリクエストを撃つ CLI
//!
//! 設定ファイル（TOML）とコマンドライン引数を合成し、Scheduler を 1 回だけ実行する。
//! イベントは JSON Lines で stdout、ログは stderr、最後に RunReport を JSON で出す。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pounce_core::config::TaskConfig;
use pounce_core::domain::SessionError;
use pounce_core::impls::{ChannelSink, FanoutSink, HttpEndpoint, TracingSink};
use pounce_core::ports::EventSink;
use pounce_core::{Activation, ClaimEvent, Config, Credentials, OperationKind};

/// Fire claim requests at a synchronized wall-clock instant.
#[derive(Debug, Parser)]
#[command(name = "pounce", version, about, long_about = None)]
struct Cli {
    /// TOML config file. Flags below override its values.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// API base url, e.g. https://example.com/api/jan5424542/
    #[arg(long, env = "POUNCE_BASE_URL")]
    base_url: Option<String>,

    /// Account id (uid).
    #[arg(long, env = "POUNCE_UID")]
    uid: Option<String>,

    /// Session token.
    #[arg(long, env = "POUNCE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Share url carrying `siteinfo` / `rand`; logs in and replaces uid/token.
    #[arg(long = "url", env = "POUNCE_SHARE_URL", hide_env_values = true)]
    share_url: Option<String>,

    /// Skip the session check that runs before waiting for activation.
    #[arg(long)]
    skip_session_check: bool,

    /// Operation for tasks given on the command line: sign-in, claim-box or exchange.
    #[arg(long)]
    op: Option<String>,

    /// Box number or item id. Repeat for several tasks.
    #[arg(long = "resource", short = 'r')]
    resources: Vec<String>,

    /// Daily activation time HH:MM:SS[.mmm]. Omit to start immediately.
    #[arg(long)]
    at: Option<String>,

    /// UTC offset (hours) that `--at` is expressed in.
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<i32>,

    #[arg(long)]
    interval_ms: Option<u64>,

    /// Attempts per task before giving up.
    #[arg(long, conflicts_with = "unbounded")]
    max_attempts: Option<u64>,

    /// Retry until success, a permanent failure or Ctrl-C.
    #[arg(long)]
    unbounded: bool,

    /// JSON log lines instead of human-readable ones.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(url) = &self.base_url {
            config.endpoint.base_url = Some(url.clone());
        }
        if let Some(uid) = &self.uid {
            config.credentials.account_id = uid.clone();
        }
        if let Some(token) = &self.token {
            config.credentials.session_token = token.clone();
        }
        if let Some(at) = &self.at {
            config.clock.at = Some(at.clone());
        }
        if let Some(hours) = self.utc_offset {
            config.clock.utc_offset_hours = hours;
        }
        if let Some(ms) = self.interval_ms {
            config.retry.interval_ms = ms;
        }
        if let Some(n) = self.max_attempts {
            config.retry.max_attempts = n;
            config.retry.unbounded = false;
        }
        if self.unbounded {
            config.retry.unbounded = true;
        }
        config.tasks.extend(self.cli_tasks()?);

        config.validate().context("invalid configuration")?;
        if config.tasks.is_empty() {
            bail!("nothing to do: add [[tasks]] to the config or pass --op");
        }
        Ok(config)
    }

    fn cli_tasks(&self) -> Result<Vec<TaskConfig>> {
        let Some(op) = &self.op else {
            if !self.resources.is_empty() {
                bail!("--resource needs --op");
            }
            return Ok(Vec::new());
        };
        let kind: OperationKind = op.parse()?;

        let task = |resource: Option<&String>| TaskConfig {
            id: match resource {
                Some(r) => format!("{}-{r}", kind.as_str()),
                None => kind.as_str().to_string(),
            },
            operation: kind.as_str().to_string(),
            resource: resource.cloned(),
            params: Default::default(),
        };

        if self.resources.is_empty() {
            if kind != OperationKind::SignIn {
                bail!("--op {kind} needs at least one --resource");
            }
            return Ok(vec![task(None)]);
        }
        Ok(self.resources.iter().map(|r| task(Some(r))).collect())
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Print every event as one JSON line on stdout until the sink closes.
async fn print_events(mut rx: UnboundedReceiver<ClaimEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to encode event"),
        }
    }
}

/// Stop early on an expired login instead of finding out at the deadline.
/// Other probe failures only warn: the claim routes may still work.
async fn check_session(endpoint: &HttpEndpoint, credentials: &Credentials) -> Result<()> {
    match endpoint.check_session(credentials).await {
        Ok(info) => {
            info!(
                account_id = %credentials.account_id,
                nickname = info.nickname.as_deref().unwrap_or(""),
                scores = info.scores,
                "session is valid"
            );
            Ok(())
        }
        Err(SessionError::Expired(message)) => {
            bail!("session expired ({message}); log in again or pass a fresh --url")
        }
        Err(e) => {
            warn!(error = %e, "session check failed, continuing");
            Ok(())
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if no handler can be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    warn!("interrupted, stopping tasks");
}

async fn run(cli: Cli) -> Result<bool> {
    let mut config = cli.resolve_config()?;
    let endpoint = Arc::new(config.http_endpoint().context("building http client")?);

    if let Some(share_url) = &cli.share_url {
        let boot = endpoint
            .bootstrap(share_url)
            .await
            .context("logging in with the share url")?;
        info!(
            account_id = %boot.credentials.account_id,
            nickname = boot.session.nickname.as_deref().unwrap_or(""),
            scores = boot.session.scores,
            "logged in from share url"
        );
        config.credentials.account_id = boot.credentials.account_id;
        config.credentials.session_token = boot.credentials.session_token;
    }
    let credentials = config.credentials();
    if !credentials.is_complete() {
        bail!("credentials missing: pass --uid and --token, or --url");
    }
    if !cli.skip_session_check {
        check_session(&endpoint, &credentials).await?;
    }
    let specs = config.specs()?;

    let (channel, events) = ChannelSink::new();
    let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink), Arc::new(channel)];
    let sink = FanoutSink::new(sinks);
    let scheduler = config
        .scheduler_builder(endpoint)?
        .event_sink(Arc::new(sink))
        .build()
        .context("building scheduler")?;
    let printer = tokio::spawn(print_events(events));

    let activation = match config.time_of_day()? {
        Some(time_of_day) => {
            // a failure here is handed to the run, which then degrades
            // without querying the servers again
            if let Err(e) = scheduler.sync_clock().await {
                warn!(error = %e, "clock sync failed, using the local clock");
            }
            let now = scheduler.reference_now().await;
            Activation::next_daily(time_of_day, config.zone()?, now)
        }
        None => Activation::Immediate,
    };
    if let Some(target) = activation.target() {
        info!(%target, "waiting for activation");
    }

    let report = scheduler
        .spawn(specs, activation)?
        .join_until(interrupted())
        .await;

    // the sink's sender lives in the scheduler
    drop(scheduler);
    let _ = printer.await;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("encoding report")?
    );
    Ok(report.all_succeeded())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pounce").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn resources_become_one_task_each() {
        let cli = parse(&["--op", "claim-box", "-r", "1", "-r", "3"]);
        let tasks = cli.cli_tasks().unwrap();
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["claim-box-1", "claim-box-3"]);
        assert_eq!(tasks[1].resource.as_deref(), Some("3"));
    }

    #[test]
    fn share_url_replaces_uid_and_token_flags() {
        let cli = parse(&["--url", "https://share.example.com/?siteinfo=s&rand=r", "--op", "sign-in"]);
        assert_eq!(
            cli.share_url.as_deref(),
            Some("https://share.example.com/?siteinfo=s&rand=r")
        );
        assert!(!cli.skip_session_check);
        assert!(cli.resolve_config().is_ok());
    }

    #[test]
    fn sign_in_needs_no_resource() {
        let cli = parse(&["--op", "sign-in"]);
        let tasks = cli.cli_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].resource, None);
    }

    #[test]
    fn claim_without_resource_is_rejected() {
        assert!(parse(&["--op", "exchange"]).cli_tasks().is_err());
        assert!(parse(&["-r", "1"]).cli_tasks().is_err());
    }

    #[test]
    fn flags_override_config_values() {
        let cli = parse(&[
            "--op",
            "claim-box",
            "-r",
            "2",
            "--uid",
            "account.1",
            "--token",
            "t",
            "--at",
            "21:00:00",
            "--utc-offset",
            "-5",
            "--unbounded",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.clock.utc_offset_hours, -5);
        assert_eq!(config.budget().max_attempts, None);
        assert_eq!(config.credentials.account_id, "account.1");
        assert!(config.time_of_day().unwrap().is_some());
    }

    #[test]
    fn empty_run_is_rejected() {
        assert!(parse(&[]).resolve_config().is_err());
    }
}
