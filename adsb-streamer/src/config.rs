//! Configuration for adsb-streamer.
//!
//! Reads a JSON file (`config.json` by default) whose `WEBHOOK_URL` and
//! `FILENAME` keys name the delivery endpoint and the receiver log to tail.
//! Command-line flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use adsb_core::tracker::{Policy, MESSAGE_RATE_LIMIT, POSITION_TIMEOUT};
use adsb_core::TimestampFormat;
use reqwest::Url;
use serde::Deserialize;

use crate::error::{Result, StreamerError};
use crate::notification::{ConsoleFormat, RetryPolicy, DEFAULT_RETRY_PAUSE};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default capacity of the dispatch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// On-disk configuration. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(rename = "WEBHOOK_URL", default)]
    pub webhook_url: Option<String>,
    #[serde(rename = "FILENAME", default)]
    pub filename: Option<PathBuf>,
    #[serde(default)]
    pub timestamp_format: Option<String>,
    #[serde(default)]
    pub extended_decode: Option<bool>,
    #[serde(default)]
    pub position_timeout_secs: Option<f64>,
    #[serde(default)]
    pub rate_limit_secs: Option<f64>,
    #[serde(default)]
    pub retry_pause_secs: Option<f64>,
    #[serde(default)]
    pub max_delivery_attempts: Option<u32>,
    #[serde(default)]
    pub aircraft_idle_secs: Option<f64>,
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

impl FileConfig {
    /// Read and parse a config file. Missing or malformed files are errors.
    pub fn load(path: &Path) -> Result<FileConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StreamerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
            .map_err(|e| StreamerError::Config(format!("{}: {e}", path.display())))
    }

    pub fn parse(text: &str) -> Result<FileConfig> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load `explicit` if given, else `config.json` if it exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<FileConfig> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(FileConfig::default())
                }
            }
        }
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input: Option<PathBuf>,
    pub webhook: Option<String>,
    pub timestamp_format: Option<String>,
    pub no_extended: bool,
    pub json: bool,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: PathBuf,
    /// `None` means console output only.
    pub webhook: Option<Url>,
    pub timestamp_format: TimestampFormat,
    pub policy: Policy,
    pub retry: RetryPolicy,
    pub aircraft_idle: Option<f64>,
    pub queue_capacity: usize,
    pub console_format: ConsoleFormat,
}

impl Settings {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Settings> {
        let input = overrides
            .input
            .or(file.filename)
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                StreamerError::Config("no input file: set FILENAME or pass --input".into())
            })?;

        let webhook = overrides
            .webhook
            .or(file.webhook_url)
            .as_deref()
            .and_then(parse_webhook);

        let timestamp_format = match overrides.timestamp_format.or(file.timestamp_format) {
            Some(pattern) => TimestampFormat::new(&pattern)?,
            None => TimestampFormat::default(),
        };

        let policy = Policy {
            position_timeout: non_negative(
                "position_timeout_secs",
                file.position_timeout_secs.unwrap_or(POSITION_TIMEOUT),
            )?,
            rate_limit: non_negative(
                "rate_limit_secs",
                file.rate_limit_secs.unwrap_or(MESSAGE_RATE_LIMIT),
            )?,
            extended_fields: !overrides.no_extended && file.extended_decode.unwrap_or(true),
        };

        let pause = non_negative(
            "retry_pause_secs",
            file.retry_pause_secs.unwrap_or(DEFAULT_RETRY_PAUSE.as_secs_f64()),
        )?;
        if file.max_delivery_attempts == Some(0) {
            return Err(StreamerError::Config(
                "max_delivery_attempts must be at least 1".into(),
            ));
        }
        let retry = RetryPolicy {
            default_pause: Duration::try_from_secs_f64(pause).map_err(|e| {
                StreamerError::Config(format!("retry_pause_secs out of range: {e}"))
            })?,
            max_attempts: file.max_delivery_attempts,
        };

        let aircraft_idle = file
            .aircraft_idle_secs
            .map(|secs| non_negative("aircraft_idle_secs", secs))
            .transpose()?;

        let queue_capacity = file.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            return Err(StreamerError::Config("queue_capacity must be at least 1".into()));
        }

        Ok(Settings {
            input,
            webhook,
            timestamp_format,
            policy,
            retry,
            aircraft_idle,
            queue_capacity,
            console_format: if overrides.json {
                ConsoleFormat::Json
            } else {
                ConsoleFormat::Text
            },
        })
    }
}

/// A usable webhook endpoint: absolute http(s) URL with a host.
pub fn parse_webhook(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = Url::parse(raw).ok()?;
    let scheme_ok = matches!(url.scheme(), "http" | "https");
    (scheme_ok && url.host_str().is_some()).then_some(url)
}

fn non_negative(key: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(StreamerError::Config(format!(
            "{key} must be a non-negative number, got {value}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
