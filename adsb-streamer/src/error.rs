//! Error type for the streamer binary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook rejected notification: HTTP {status}: {body}")]
    Delivery { status: u16, body: String },
    #[error("still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Core(#[from] adsb_core::AdsbError),
}

pub type Result<T> = std::result::Result<T, StreamerError>;
