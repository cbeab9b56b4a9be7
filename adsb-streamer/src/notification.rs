//! Notification sinks: webhook delivery with 429 backoff, or console output.
//!
//! The webhook body is a Discord-style embed whose description lists the
//! record as `Key: Value` lines.

use std::sync::Arc;
use std::time::Duration;

use adsb_core::DecodedRecord;
use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, StreamerError};

/// Pause used when a 429 response carries no usable `retry_after`.
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(60);

pub const EMBED_TITLE: &str = "New Aircraft Detected";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How rate-limited deliveries are retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub default_pause: Duration,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            default_pause: DEFAULT_RETRY_PAUSE,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookPayload {
    pub content: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub description: String,
}

impl WebhookPayload {
    pub fn for_record(record: &DecodedRecord) -> Self {
        WebhookPayload {
            content: String::new(),
            embeds: vec![Embed {
                title: EMBED_TITLE.to_string(),
                description: record.to_lines(),
            }],
        }
    }
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Sends a JSON body to a URL. Split out so retry behaviour can be tested
/// without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, url: &Url, body: &serde_json::Value) -> Result<HttpResponse>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(ReqwestTransport { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, url: &Url, body: &serde_json::Value) -> Result<HttpResponse> {
        let response = self.client.post(url.clone()).json(body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpResponse { status, body })
    }
}

/// Destination for notification records.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one record. Returns the number of attempts it took.
    async fn deliver(&self, record: &DecodedRecord) -> Result<u32>;
}

/// Posts records to a webhook, sleeping and resending on HTTP 429.
pub struct WebhookSink<T = ReqwestTransport> {
    url: Url,
    transport: T,
    retry: RetryPolicy,
}

impl<T: Transport> WebhookSink<T> {
    pub fn new(url: Url, transport: T, retry: RetryPolicy) -> Self {
        WebhookSink {
            url,
            transport,
            retry,
        }
    }
}

#[async_trait]
impl<T: Transport> NotificationSink for WebhookSink<T> {
    async fn deliver(&self, record: &DecodedRecord) -> Result<u32> {
        let payload = serde_json::to_value(WebhookPayload::for_record(record))?;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let response = self.transport.post_json(&self.url, &payload).await?;

            match response.status {
                200..=299 => {
                    debug!(attempts, status = response.status, "webhook accepted notification");
                    return Ok(attempts);
                }
                429 => {
                    if self.retry.max_attempts.is_some_and(|max| attempts >= max) {
                        return Err(StreamerError::RateLimited { attempts });
                    }
                    let pause = retry_after(&response.body).unwrap_or(self.retry.default_pause);
                    warn!(
                        attempts,
                        pause_secs = pause.as_secs_f64(),
                        "webhook rate limited, retrying"
                    );
                    tokio::time::sleep(pause).await;
                }
                status => {
                    return Err(StreamerError::Delivery {
                        status,
                        body: response.body,
                    })
                }
            }
        }
    }
}

/// `retry_after` seconds from a 429 JSON body.
pub fn retry_after(body: &str) -> Option<Duration> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let secs = value.get("retry_after")?.as_f64()?;
    if secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsoleFormat {
    /// `Key: Value` pairs on one line.
    #[default]
    Text,
    Json,
}

/// Prints records to stdout. Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    format: ConsoleFormat,
}

impl ConsoleSink {
    pub fn new(format: ConsoleFormat) -> Self {
        ConsoleSink { format }
    }

    pub fn render(&self, record: &DecodedRecord) -> Result<String> {
        match self.format {
            ConsoleFormat::Text => Ok(record.to_string()),
            ConsoleFormat::Json => Ok(serde_json::to_string(record)?),
        }
    }
}

#[async_trait]
impl NotificationSink for ConsoleSink {
    async fn deliver(&self, record: &DecodedRecord) -> Result<u32> {
        println!("{}", self.render(record)?);
        Ok(1)
    }
}

/// Webhook sink when an endpoint is configured, console sink otherwise.
pub fn build_sink(
    webhook: Option<Url>,
    retry: RetryPolicy,
    console: ConsoleFormat,
) -> Result<Arc<dyn NotificationSink>> {
    Ok(match webhook {
        Some(url) => Arc::new(WebhookSink::new(url, ReqwestTransport::new()?, retry)),
        None => Arc::new(ConsoleSink::new(console)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use adsb_core::FieldValue;
    use tokio::time::Instant;

    /// Replays canned responses and records every request.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse>>>,
        requests: Mutex<Vec<(Instant, serde_json::Value)>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse>>) -> Self {
            ScriptedTransport {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<(Instant, serde_json::Value)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(&self, _url: &Url, body: &serde_json::Value) -> Result<HttpResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((Instant::now(), body.clone()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(response(204, "")))
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: body.to_string(),
        }
    }

    fn record() -> DecodedRecord {
        let mut record = DecodedRecord::new();
        record.set("ICAO", "40621D");
        record.set("Callsign", "KLM1023");
        record.set("Altitude", FieldValue::Unknown);
        record
    }

    fn sink(responses: Vec<Result<HttpResponse>>, retry: RetryPolicy) -> WebhookSink<ScriptedTransport> {
        let url = Url::parse("https://example.com/hook").unwrap();
        WebhookSink::new(url, ScriptedTransport::new(responses), retry)
    }

    #[test]
    fn test_payload_shape() {
        let payload = serde_json::to_value(WebhookPayload::for_record(&record())).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "content": "",
                "embeds": [{
                    "title": "New Aircraft Detected",
                    "description": "ICAO: 40621D\nCallsign: KLM1023\nAltitude: N/A",
                }],
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_waits_retry_after_and_resends() {
        let sink = sink(
            vec![
                Ok(response(429, r#"{"message": "You are being rate limited.", "retry_after": 5}"#)),
                Ok(response(204, "")),
            ],
            RetryPolicy::default(),
        );
        let attempts = sink.deliver(&record()).await.unwrap();

        assert_eq!(attempts, 2);
        let requests = sink.transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].0 - requests[0].0, Duration::from_secs(5));
        assert_eq!(requests[0].1, requests[1].1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_without_retry_after_uses_default_pause() {
        let sink = sink(
            vec![Ok(response(429, "rate limited")), Ok(response(200, ""))],
            RetryPolicy::default(),
        );
        sink.deliver(&record()).await.unwrap();

        let requests = sink.transport.requests();
        assert_eq!(requests[1].0 - requests[0].0, DEFAULT_RETRY_PAUSE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_with_oversized_retry_after_uses_default_pause() {
        let sink = sink(
            vec![
                Ok(response(429, r#"{"retry_after": 1e300}"#)),
                Ok(response(204, "")),
            ],
            RetryPolicy::default(),
        );
        assert_eq!(sink.deliver(&record()).await.unwrap(), 2);

        let requests = sink.transport.requests();
        assert_eq!(requests[1].0 - requests[0].0, DEFAULT_RETRY_PAUSE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_not_retried() {
        let sink = sink(vec![Ok(response(500, "boom"))], RetryPolicy::default());
        let start = Instant::now();
        let result = sink.deliver(&record()).await;

        assert!(matches!(
            result,
            Err(StreamerError::Delivery { status: 500, .. })
        ));
        assert_eq!(sink.transport.requests().len(), 1);
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_not_retried() {
        let sink = sink(
            vec![Err(StreamerError::Io(std::io::Error::other("connection reset")))],
            RetryPolicy::default(),
        );
        let result = sink.deliver(&record()).await;

        assert!(matches!(result, Err(StreamerError::Io(_))));
        assert_eq!(sink.transport.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_gives_up() {
        let limited = || Ok(response(429, r#"{"retry_after": 0.5}"#));
        let retry = RetryPolicy {
            max_attempts: Some(2),
            ..RetryPolicy::default()
        };
        let sink = sink(vec![limited(), limited(), limited()], retry);
        let result = sink.deliver(&record()).await;

        assert!(matches!(
            result,
            Err(StreamerError::RateLimited { attempts: 2 })
        ));
        assert_eq!(sink.transport.requests().len(), 2);
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(retry_after(r#"{"retry_after": 5}"#), Some(Duration::from_secs(5)));
        assert_eq!(
            retry_after(r#"{"retry_after": 2.5}"#),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(retry_after(r#"{"retry_after": "soon"}"#), None);
        assert_eq!(retry_after(r#"{"retry_after": -1}"#), None);
        assert_eq!(retry_after(r#"{"retry_after": 1e300}"#), None);
        assert_eq!(retry_after(r#"{}"#), None);
        assert_eq!(retry_after("<html>"), None);
    }

    #[test]
    fn test_console_render() {
        let text = ConsoleSink::new(ConsoleFormat::Text).render(&record()).unwrap();
        assert_eq!(text, "ICAO: 40621D Callsign: KLM1023 Altitude: N/A");

        let json = ConsoleSink::new(ConsoleFormat::Json).render(&record()).unwrap();
        assert_eq!(json, r#"{"ICAO":"40621D","Callsign":"KLM1023","Altitude":null}"#);
    }

    #[tokio::test]
    async fn test_build_sink_without_webhook_is_console() {
        let sink = build_sink(None, RetryPolicy::default(), ConsoleFormat::Text).unwrap();
        assert_eq!(sink.deliver(&record()).await.unwrap(), 1);
    }
}
