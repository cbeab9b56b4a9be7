//! Compact Position Reporting: global decode of airborne even/odd pairs.
//!
//! Key constants:
//! - NZ = 15 (latitude zones per hemisphere for even frames)
//! - Nb = 17 (bits per coordinate)
//! - Dlat_even = 360 / (4 * NZ) = 6.0 degrees
//! - Dlat_odd = 360 / (4 * NZ - 1) ≈ 6.1017 degrees
//!
//! No pair-age check is made here. Callers that need one compare the
//! timestamps themselves.

use crate::frame::Frame;
use crate::types::{AdsbError, Result};

/// Number of latitude zones per hemisphere.
const NZ: f64 = 15.0;

/// 2^17, the CPR coordinate range.
const CPR_MAX: f64 = (1u32 << 17) as f64;

/// Number of longitude zones at a given latitude (the NL function).
///
/// Ranges from 59 at the equator down to 1 near the poles.
pub fn nl(lat: f64) -> i32 {
    if lat.abs() >= 87.0 {
        return 1;
    }

    let a = 1.0 - (std::f64::consts::PI / (2.0 * NZ)).cos();
    let b = lat.abs().to_radians().cos().powi(2);
    let zones = (2.0 * std::f64::consts::PI / (1.0 - a / b).acos()).floor() as i32;
    zones.max(1)
}

/// Modulo that always returns a non-negative result.
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Resolve latitude/longitude from an airborne even/odd frame pair.
///
/// The more recent frame determines the reported position; a tie picks the
/// even frame. Fails when either frame is not an airborne position of the
/// expected parity or the two latitudes straddle an NL zone boundary.
pub fn airborne_position(even: &Frame, odd: &Frame, t_even: f64, t_odd: f64) -> Result<(f64, f64)> {
    if !even.is_airborne_position() || !odd.is_airborne_position() {
        return Err(AdsbError::CprFailed(format!(
            "not an airborne position pair (TC {} / TC {})",
            even.type_code(),
            odd.type_code()
        )));
    }
    if even.oe_flag() || !odd.oe_flag() {
        return Err(AdsbError::CprFailed("frames out of parity order".into()));
    }

    global_decode(
        even.cpr_lat(),
        even.cpr_lon(),
        odd.cpr_lat(),
        odd.cpr_lon(),
        t_even >= t_odd,
    )
}

/// Global CPR decode from raw 17-bit coordinates.
pub fn global_decode(
    lat_even: u32,
    lon_even: u32,
    lat_odd: u32,
    lon_odd: u32,
    even_is_latest: bool,
) -> Result<(f64, f64)> {
    let dlat_even = 360.0 / (4.0 * NZ);
    let dlat_odd = 360.0 / (4.0 * NZ - 1.0);

    let lat_even_cpr = lat_even as f64 / CPR_MAX;
    let lon_even_cpr = lon_even as f64 / CPR_MAX;
    let lat_odd_cpr = lat_odd as f64 / CPR_MAX;
    let lon_odd_cpr = lon_odd as f64 / CPR_MAX;

    // Latitude zone index
    let j = (59.0 * lat_even_cpr - 60.0 * lat_odd_cpr + 0.5).floor();

    let normalize = |lat: f64| if lat >= 270.0 { lat - 360.0 } else { lat };
    let lat_e = normalize(dlat_even * (modulo(j, 60.0) + lat_even_cpr));
    let lat_o = normalize(dlat_odd * (modulo(j, 59.0) + lat_odd_cpr));

    if nl(lat_e) != nl(lat_o) {
        return Err(AdsbError::CprFailed(format!(
            "latitudes {lat_e:.4} and {lat_o:.4} fall in different NL zones"
        )));
    }

    let (lat, nl_val) = if even_is_latest {
        (lat_e, nl(lat_e))
    } else {
        (lat_o, nl(lat_o))
    };
    let m = (lon_even_cpr * (nl_val - 1) as f64 - lon_odd_cpr * nl_val as f64 + 0.5).floor();

    let (n_lon, lon_cpr) = if even_is_latest {
        (nl_val.max(1), lon_even_cpr)
    } else {
        ((nl_val - 1).max(1), lon_odd_cpr)
    };
    let lon = 360.0 / n_lon as f64 * (modulo(m, n_lon as f64) + lon_cpr);
    let lon = if lon >= 180.0 { lon - 360.0 } else { lon };

    if !(-90.0..=90.0).contains(&lat) {
        return Err(AdsbError::CprFailed(format!("latitude {lat:.4} out of range")));
    }

    Ok((round6(lat), round6(lon)))
}

/// Round to 6 decimal places.
fn round6(val: f64) -> f64 {
    (val * 1_000_000.0).round() / 1_000_000.0
}
