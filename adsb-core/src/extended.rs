//! Extended decode fields for a single message.
//!
//! Produces a record describing the triggering message on its own, to be
//! merged after the aggregated aircraft fields:
//! `DownlinkFormat`, `TypeCode`, `ICAO24`, one type-specific field, `ICAO`.
//! Any decode failure collapses the type-specific part into an `Error` field.

use crate::decode;
use crate::frame::{self, Frame};
use crate::record::{DecodedRecord, FieldValue};
use crate::types::*;

/// Decode the extended fields of a raw hex message.
pub fn decode_extended(message: &str) -> DecodedRecord {
    let mut record = DecodedRecord::new();

    let df = match frame::df(message) {
        Ok(df) => df,
        Err(e) => {
            record.set("Error", format!("Failed to decode Mode-S message: {e}"));
            return record;
        }
    };
    record.set("DownlinkFormat", df);

    if df != DF_EXTENDED_SQUITTER && df != DF_TISB {
        return record;
    }

    let frame = match Frame::parse(message) {
        Ok(frame) => frame,
        Err(e) => {
            record.set("Error", format!("Failed to decode ADS-B message: {e}"));
            return record;
        }
    };
    match adsb_fields(&frame) {
        Ok(fields) => record.merge(fields),
        Err(e) => record.set("Error", format!("Failed to decode ADS-B message: {e}")),
    }
    record.set("ICAO", icao_to_string(&frame.icao()));
    record
}

fn adsb_fields(frame: &Frame) -> Result<DecodedRecord> {
    let tc = frame.type_code();
    let mut fields = DecodedRecord::new();
    fields.set("TypeCode", tc);
    fields.set("ICAO24", icao_to_string(&frame.icao()));
    fields.set("DownlinkFormat", frame.df());

    match tc {
        1..=4 => fields.set("Callsign", decode::callsign(frame)?),
        5..=8 => fields.set(
            "SurfaceMovement",
            FieldValue::from_option(decode::surface_movement(frame)?),
        ),
        19 => {
            let v = decode::velocity(frame)?;
            let part = |x: Option<String>| x.unwrap_or_else(|| "N/A".to_string());
            fields.set(
                "Velocity",
                format!(
                    "{} kt, {} deg, {} ft/min ({})",
                    part(v.speed_kts.map(|s| s.to_string())),
                    part(v.heading_deg.map(|h| h.to_string())),
                    part(v.vertical_rate_fpm.map(|r| r.to_string())),
                    v.speed_type
                ),
            );
        }
        20..=22 => fields.set("Altitude", decode::altitude(frame)?),
        _ => {}
    }
    Ok(fields)
}
