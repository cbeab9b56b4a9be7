//! Shared types, error enum, ICAO and hex helpers for adsb-core.

use thiserror::Error;

/// All errors produced by adsb-core.
#[derive(Debug, Error)]
pub enum AdsbError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("invalid frame length: expected {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("not an extended squitter: DF{0}")]
    NotExtendedSquitter(u8),
    #[error("CRC validation failed")]
    CrcFailed,
    #[error("type code {actual} is not a {expected} message")]
    WrongTypeCode { expected: &'static str, actual: u8 },
    #[error("{0} not available in message")]
    FieldUnavailable(&'static str),
    #[error("CPR decode failed: {0}")]
    CprFailed(String),
    #[error("invalid timestamp format: {0}")]
    TimestampFormat(String),
    #[error("unparseable timestamp: {0}")]
    Timestamp(String),
    #[error("malformed line: {0}")]
    MalformedLine(&'static str),
}

pub type Result<T> = std::result::Result<T, AdsbError>;

/// Downlink format of an ADS-B extended squitter.
pub const DF_EXTENDED_SQUITTER: u8 = 17;

/// Downlink format of TIS-B / ADS-R rebroadcasts.
pub const DF_TISB: u8 = 18;

/// Hex digits in a 112-bit message.
pub const LONG_MSG_HEX_LEN: usize = 28;

// ---------------------------------------------------------------------------
// ICAO address helpers
// ---------------------------------------------------------------------------

/// 3-byte ICAO address. Stored as raw bytes to avoid per-message String allocation.
pub type Icao = [u8; 3];

/// Format ICAO address as 6-char uppercase hex string.
pub fn icao_to_string(icao: &Icao) -> String {
    format!("{:02X}{:02X}{:02X}", icao[0], icao[1], icao[2])
}

/// Parse a 6-char hex string into an ICAO address.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    if hex.len() != 6 {
        return None;
    }
    let val = u32::from_str_radix(hex, 16).ok()?;
    Some([(val >> 16) as u8, (val >> 8) as u8, val as u8])
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// True if `s` is non-empty and consists only of hex digits.
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|c| c.is_ascii_hexdigit())
}

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

/// Encode bytes as uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02X}")).collect()
}

fn hex_digit(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

// ---------------------------------------------------------------------------
// ADS-B callsign character set
// ---------------------------------------------------------------------------

/// ADS-B character set for callsign encoding (6 bits per character).
pub const CALLSIGN_CHARSET: &[u8; 64] =
    b"#ABCDEFGHIJKLMNOPQRSTUVWXYZ##### ###############0123456789######";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
