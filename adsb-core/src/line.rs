//! Parse receiver log lines of the form `date,<ignored>,hex[,...]`.
//!
//! The date is read with a strftime pattern in local time. Patterns without
//! a time-of-day resolve to local midnight, so every message from the same
//! day shares one timestamp.

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::types::*;

/// Default date pattern, e.g. `Mon Jan 02 2006`.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%a %b %d %Y";

/// A validated strftime pattern for the first field of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampFormat {
    pattern: String,
}

impl TimestampFormat {
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty()
            || StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
        {
            return Err(AdsbError::TimestampFormat(pattern.to_string()));
        }
        Ok(TimestampFormat {
            pattern: pattern.to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Unix seconds for `text` interpreted in local time.
    ///
    /// A weekday (`%a`, `%A`) is checked against the date: a line reading
    /// `Tue Jan 02 2006` is rejected, because that day was a Monday.
    pub fn parse(&self, text: &str) -> Result<f64> {
        let text = text.trim();
        let naive = NaiveDateTime::parse_from_str(text, &self.pattern)
            .or_else(|_| {
                NaiveDate::parse_from_str(text, &self.pattern).map(|d| d.and_time(NaiveTime::MIN))
            })
            .map_err(|e| AdsbError::Timestamp(format!("{text:?}: {e}")))?;

        let local = Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| AdsbError::Timestamp(format!("{text:?}: not a valid local time")))?;
        Ok(local.timestamp_millis() as f64 / 1000.0)
    }
}

impl Default for TimestampFormat {
    fn default() -> Self {
        TimestampFormat {
            pattern: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

/// A line that passed structural checks.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub timestamp: f64,
    pub message: String,
}

/// Split and validate a raw line.
///
/// Rejects lines with fewer than three fields, an empty date, an
/// unparseable date, or an empty / non-hex message.
pub fn parse_line(line: &str, format: &TimestampFormat) -> Result<SourceLine> {
    let parts: Vec<&str> = line.trim().split(',').collect();
    if parts.len() < 3 {
        return Err(AdsbError::MalformedLine("fewer than 3 fields"));
    }
    if parts[0].trim().is_empty() {
        return Err(AdsbError::MalformedLine("empty timestamp"));
    }

    let message = parts[2].trim();
    if !is_hex(message) {
        return Err(AdsbError::InvalidHex(message.to_string()));
    }

    let timestamp = format.parse(parts[0])?;
    Ok(SourceLine {
        timestamp,
        message: message.to_string(),
    })
}
