//! adsb-core: decode + aggregation library for ADS-B stream notifications.
//!
//! No async, no I/O. Lines go in, `Notification`s come out; delivering them
//! is left to `adsb-streamer`.

pub mod clock;
pub mod cpr;
pub mod crc;
pub mod decode;
pub mod extended;
pub mod frame;
pub mod line;
pub mod record;
pub mod store;
pub mod tracker;
pub mod types;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use frame::Frame;
pub use line::{parse_line, SourceLine, TimestampFormat};
pub use record::{DecodedRecord, FieldValue};
pub use store::{AircraftState, AircraftStore, Position};
pub use tracker::{Notification, Policy, Tracker};
pub use types::*;
