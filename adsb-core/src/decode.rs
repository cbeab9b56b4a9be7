//! Field decoders for extended squitter frames.
//!
//! Each decoder checks that the frame's Type Code carries the field and
//! returns an error otherwise, so callers can treat a failure as "this
//! message did not update that field":
//! - TC 1-4:   callsign
//! - TC 5-8:   surface movement (altitude reported as ground level)
//! - TC 9-18:  barometric altitude
//! - TC 19:    airborne velocity
//! - TC 20-22: GNSS height

use serde::Serialize;

use crate::frame::Frame;
use crate::types::*;

const FEET_PER_METRE: f64 = 3.28084;

// ---------------------------------------------------------------------------
// Altitude
// ---------------------------------------------------------------------------

/// Altitude in feet from a position message.
///
/// Surface messages report 0 (on the ground); GNSS heights are converted
/// from metres.
pub fn altitude(frame: &Frame) -> Result<i32> {
    let tc = frame.type_code();
    let alt_code = ((frame.me() >> 36) & 0x0FFF) as u32;
    match tc {
        5..=8 => Ok(0),
        9..=18 => decode_altitude(alt_code).ok_or(AdsbError::FieldUnavailable("altitude")),
        20..=22 => {
            if alt_code == 0 {
                return Err(AdsbError::FieldUnavailable("altitude"));
            }
            Ok((alt_code as f64 * FEET_PER_METRE).round() as i32)
        }
        _ => Err(AdsbError::WrongTypeCode {
            expected: "position",
            actual: tc,
        }),
    }
}

/// Decode the 12-bit barometric altitude code.
///
/// The Q-bit (bit 4) selects 25-ft resolution; otherwise the code is
/// 100-ft Gillham gray code.
pub fn decode_altitude(alt_code: u32) -> Option<i32> {
    if alt_code == 0 {
        return None;
    }
    if (alt_code >> 4) & 1 == 1 {
        let n = ((alt_code >> 5) << 4) | (alt_code & 0x0F);
        Some(n as i32 * 25 - 1000)
    } else {
        decode_gillham(alt_code)
    }
}

/// Bit layout, MSB first: C1 A1 C2 A2 C4 A4 B1 Q B2 D2 B4 D4.
fn decode_gillham(alt_code: u32) -> Option<i32> {
    let bit = |n: u32| (alt_code >> n) & 1;
    let (c1, a1, c2, a2, c4, a4) = (bit(11), bit(10), bit(9), bit(8), bit(7), bit(6));
    let (b1, b2, d2, b4, d4) = (bit(5), bit(3), bit(2), bit(1), bit(0));

    // 500-ft increments: D2 D4 A1 A2 A4 B1 B2 B4 as one gray-coded value
    let gray500 = d2 << 7 | d4 << 6 | a1 << 5 | a2 << 4 | a4 << 3 | b1 << 2 | b2 << 1 | b4;
    let n500 = gray_to_binary(gray500) as i32;

    let mut n100 = gray_to_binary(c1 << 2 | c2 << 1 | c4) as i32;
    if matches!(n100, 0 | 5 | 6) {
        return None;
    }
    if n100 == 7 {
        n100 = 5;
    }
    if n500 % 2 == 1 {
        n100 = 6 - n100;
    }

    Some(n500 * 500 + n100 * 100 - 1300)
}

fn gray_to_binary(mut n: u32) -> u32 {
    n ^= n >> 8;
    n ^= n >> 4;
    n ^= n >> 2;
    n ^= n >> 1;
    n
}

// ---------------------------------------------------------------------------
// Identification
// ---------------------------------------------------------------------------

/// Callsign from TC 1-4, with padding and `#` placeholders removed.
pub fn callsign(frame: &Frame) -> Result<String> {
    let tc = frame.type_code();
    if !(1..=4).contains(&tc) {
        return Err(AdsbError::WrongTypeCode {
            expected: "identification",
            actual: tc,
        });
    }

    let me = frame.me();
    let raw: String = (0..8)
        .map(|i| CALLSIGN_CHARSET[((me >> (42 - i * 6)) & 0x3F) as usize] as char)
        .filter(|&c| c != '#')
        .collect();
    Ok(raw.trim().to_string())
}

// ---------------------------------------------------------------------------
// Velocity
// ---------------------------------------------------------------------------

/// Speed reference for velocity messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeedType {
    Ground,
    IAS,
    TAS,
}

impl std::fmt::Display for SpeedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeedType::Ground => write!(f, "GS"),
            SpeedType::IAS => write!(f, "IAS"),
            SpeedType::TAS => write!(f, "TAS"),
        }
    }
}

/// TC 19: airborne velocity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Velocity {
    pub speed_kts: Option<f64>,
    pub heading_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,
    pub speed_type: SpeedType,
}

/// Decode TC 19 subtypes 1-4.
pub fn velocity(frame: &Frame) -> Result<Velocity> {
    let tc = frame.type_code();
    if tc != 19 {
        return Err(AdsbError::WrongTypeCode {
            expected: "velocity",
            actual: tc,
        });
    }

    let me = frame.me();
    let subtype = ((me >> 48) & 0x07) as u8;
    let vertical_rate_fpm = vertical_rate(me);

    match subtype {
        1 | 2 => {
            let scale = if subtype == 2 { 4 } else { 1 };
            let ew_vel = ((me >> 32) & 0x3FF) as i32 - 1;
            let ns_vel = ((me >> 21) & 0x3FF) as i32 - 1;

            let (speed_kts, heading_deg) = if ew_vel >= 0 && ns_vel >= 0 {
                let vx = (if (me >> 42) & 1 == 1 { -ew_vel } else { ew_vel }) * scale;
                let vy = (if (me >> 31) & 1 == 1 { -ns_vel } else { ns_vel }) * scale;
                let (vx, vy) = (vx as f64, vy as f64);
                let heading = vx.atan2(vy).to_degrees().rem_euclid(360.0);
                (Some(round2(vx.hypot(vy))), Some(round2(heading)))
            } else {
                (None, None)
            };

            Ok(Velocity {
                speed_kts,
                heading_deg,
                vertical_rate_fpm,
                speed_type: SpeedType::Ground,
            })
        }
        3 | 4 => {
            let scale = if subtype == 4 { 4.0 } else { 1.0 };
            let heading_deg = ((me >> 42) & 1 == 1)
                .then(|| round2(((me >> 32) & 0x3FF) as f64 * 360.0 / 1024.0));
            let speed_raw = ((me >> 21) & 0x3FF) as i32;
            let speed_kts = (speed_raw > 0).then(|| (speed_raw - 1) as f64 * scale);

            Ok(Velocity {
                speed_kts,
                heading_deg,
                vertical_rate_fpm,
                speed_type: if (me >> 31) & 1 == 1 {
                    SpeedType::TAS
                } else {
                    SpeedType::IAS
                },
            })
        }
        _ => Err(AdsbError::FieldUnavailable("velocity subtype")),
    }
}

/// Speed (knots) and heading (degrees) from TC 19.
pub fn speed_heading(frame: &Frame) -> Result<(Option<f64>, Option<f64>)> {
    let v = velocity(frame)?;
    Ok((v.speed_kts, v.heading_deg))
}

fn vertical_rate(me: u64) -> Option<i32> {
    let value = ((me >> 10) & 0x1FF) as i32 - 1;
    if value < 0 {
        return None;
    }
    let rate = value * 64;
    Some(if (me >> 19) & 1 == 1 { -rate } else { rate })
}

// ---------------------------------------------------------------------------
// Surface movement
// ---------------------------------------------------------------------------

/// Ground speed in knots from the quantized TC 5-8 movement field.
///
/// `None` when the transmitter reports no information.
pub fn surface_movement(frame: &Frame) -> Result<Option<f64>> {
    let tc = frame.type_code();
    if !(5..=8).contains(&tc) {
        return Err(AdsbError::WrongTypeCode {
            expected: "surface position",
            actual: tc,
        });
    }

    let mov = ((frame.me() >> 44) & 0x7F) as u32;
    Ok(movement_to_knots(mov))
}

fn movement_to_knots(mov: u32) -> Option<f64> {
    // (first code, speed at first code, step) per quantization band
    const BANDS: [(u32, f64, f64); 6] = [
        (2, 0.125, 0.125),
        (9, 1.0, 0.25),
        (13, 2.0, 0.5),
        (39, 15.0, 1.0),
        (94, 70.0, 2.0),
        (109, 100.0, 5.0),
    ];
    match mov {
        0 | 125.. => None,
        1 => Some(0.0),
        124 => Some(175.0),
        _ => BANDS
            .iter()
            .rev()
            .find(|(first, _, _)| mov >= *first)
            .map(|(first, base, step)| base + (mov - first) as f64 * step),
    }
}

/// Round to 2 decimal places.
fn round2(val: f64) -> f64 {
    (val * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
