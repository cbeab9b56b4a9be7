//! adsb-streamer: follow a receiver log and deliver aircraft notifications.
//!
//! Glue around `adsb-core`: config loading, the file tail, notification
//! sinks and the async pipeline connecting them.

pub mod config;
pub mod error;
pub mod notification;
pub mod pipeline;
pub mod source;

pub use error::{Result, StreamerError};
