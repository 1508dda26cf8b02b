//! Runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use factorio_notify_core::Error;

/// Where lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    /// Spawn and supervise a child process, reading its stdout.
    Supervise {
        /// Program followed by its arguments.
        argv: Vec<String>,
        /// How long to wait after SIGINT before killing the child.
        grace: Duration,
    },
    /// Follow a log file that something else is appending to.
    Tail {
        path: PathBuf,
        /// Sleep between polls when no new data is available.
        poll_interval: Duration,
    },
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Name the webhook messages are posted under.
    pub username: String,

    /// Webhook endpoint.
    pub webhook_url: reqwest::Url,

    pub source: SourceConfig,
}

impl NotifyConfig {
    /// Validate raw settings.
    ///
    /// Fails when the username is blank, the URL is not http(s), or the
    /// source has nothing to run.
    pub fn new(
        username: String,
        webhook_url: &str,
        source: SourceConfig,
    ) -> Result<Self, Error> {
        if username.trim().is_empty() {
            return Err(Error::Config("webhook username must not be empty".into()));
        }

        let webhook_url = reqwest::Url::parse(webhook_url)
            .map_err(|e| Error::Config(format!("invalid webhook URL: {e}")))?;
        if !matches!(webhook_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "webhook URL must use http or https, got `{}`",
                webhook_url.scheme()
            )));
        }

        match &source {
            SourceConfig::Supervise { argv, .. } if argv.is_empty() => {
                return Err(Error::Config("no command given to supervise".into()));
            }
            SourceConfig::Tail { poll_interval, .. } if poll_interval.is_zero() => {
                return Err(Error::Config("poll interval must be positive".into()));
            }
            _ => {}
        }

        Ok(Self {
            username,
            webhook_url,
            source,
        })
    }
}

/// Parse a duration such as `10s`, `1m30s`, `250ms` or `1h`.
///
/// A bare integer is taken as seconds. Units: `h`, `m`, `s`, `ms`, `us`,
/// `ns`; fractional values (`1.5s`) are accepted.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".into());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration `{input}`"))?;
        if num_end == 0 {
            return Err(format!("expected a number in duration `{input}`"));
        }
        let value: f64 = rest[..num_end]
            .parse()
            .map_err(|_| format!("invalid number in duration `{input}`"))?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_end] {
            "h" => 3_600_000_000_000.0,
            "m" => 60_000_000_000.0,
            "s" => 1_000_000_000.0,
            "ms" => 1_000_000.0,
            "us" | "µs" => 1_000.0,
            "ns" => 1.0,
            other => return Err(format!("unknown unit `{other}` in duration `{input}`")),
        };
        rest = &rest[unit_end..];

        let nanos = (value * unit_nanos).round();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Err(format!("duration `{input}` out of range"));
        }
        total += Duration::from_nanos(nanos as u64);
    }
    Ok(total)
}
