//! Per-aircraft state and the store that owns it.
//!
//! The store is a plain map keyed by ICAO address. Entries are created on
//! first sight and, unless `prune_idle` is called, live for the life of the
//! process.

use std::collections::HashMap;

use serde::Serialize;

use crate::cpr;
use crate::frame::Frame;
use crate::record::{DecodedRecord, FieldValue};
use crate::types::*;

/// A resolved position. Latitude and longitude only exist together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// Most recent CPR frame of one parity, with its line timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct CprSample {
    pub frame: Frame,
    pub timestamp: f64,
}

/// Result of feeding one position frame into the fusion step.
#[derive(Debug)]
pub enum FusionOutcome {
    /// Stored; the other parity has not been seen yet.
    Waiting,
    Resolved(Position),
    /// Both parities present but CPR rejected the pair. Position unchanged.
    Failed(AdsbError),
}

/// Mutable state for a single tracked aircraft.
#[derive(Debug, Clone)]
pub struct AircraftState {
    pub icao: Icao,
    pub callsign: Option<String>,
    pub altitude: Option<i32>,
    pub velocity: Option<f64>,
    pub heading: Option<f64>,

    // CPR buffer
    pub last_even: Option<CprSample>,
    pub last_odd: Option<CprSample>,

    pub position: Option<Position>,
    pub last_position_update: Option<f64>,

    // Notification gating
    pub last_notified: Option<f64>,
    pub notification_pending: bool,

    // Metadata
    pub last_seen: f64,
    pub message_count: u64,
}

impl AircraftState {
    pub fn new(icao: Icao) -> Self {
        AircraftState {
            icao,
            callsign: None,
            altitude: None,
            velocity: None,
            heading: None,
            last_even: None,
            last_odd: None,
            position: None,
            last_position_update: None,
            last_notified: None,
            notification_pending: false,
            last_seen: 0.0,
            message_count: 0,
        }
    }

    pub fn lat(&self) -> Option<f64> {
        self.position.map(|p| p.lat)
    }

    pub fn lon(&self) -> Option<f64> {
        self.position.map(|p| p.lon)
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// Store a position frame in its parity slot and try to resolve.
    ///
    /// The slot is overwritten unconditionally and the pair is attempted
    /// regardless of how far apart the two timestamps are.
    pub fn fuse_position(&mut self, frame: &Frame, timestamp: f64, now: f64) -> FusionOutcome {
        let sample = CprSample {
            frame: frame.clone(),
            timestamp,
        };
        if frame.oe_flag() {
            self.last_odd = Some(sample);
        } else {
            self.last_even = Some(sample);
        }

        let (Some(even), Some(odd)) = (&self.last_even, &self.last_odd) else {
            return FusionOutcome::Waiting;
        };

        match cpr::airborne_position(&even.frame, &odd.frame, even.timestamp, odd.timestamp) {
            Ok((lat, lon)) => {
                let position = Position { lat, lon };
                self.position = Some(position);
                self.last_position_update = Some(now);
                FusionOutcome::Resolved(position)
            }
            Err(e) => FusionOutcome::Failed(e),
        }
    }

    /// Drop the position if it was resolved more than `timeout` seconds ago.
    /// Returns true if a position was cleared.
    pub fn expire_position(&mut self, now: f64, timeout: f64) -> bool {
        match self.last_position_update {
            Some(updated) if self.position.is_some() && now - updated > timeout => {
                self.position = None;
                true
            }
            _ => false,
        }
    }

    /// Callsign and position known, nothing in flight, rate limit elapsed.
    pub fn ready_to_notify(&self, now: f64, rate_limit: f64) -> bool {
        self.callsign.is_some()
            && self.position.is_some()
            && !self.notification_pending
            && self.last_notified.is_none_or(|last| now - last >= rate_limit)
    }

    /// Aggregated fields in notification order.
    pub fn to_record(&self, type_code: u8) -> DecodedRecord {
        let mut record = DecodedRecord::new();
        record.set("ICAO", icao_to_string(&self.icao));
        record.set("TypeCode", type_code);
        record.set("Altitude", FieldValue::from_option(self.altitude));
        record.set("Velocity", FieldValue::from_option(self.velocity));
        record.set("Heading", FieldValue::from_option(self.heading));
        record.set("Callsign", FieldValue::from_option(self.callsign.clone()));
        record.set("Latitude", FieldValue::from_option(self.lat()));
        record.set("Longitude", FieldValue::from_option(self.lon()));
        record
    }
}

/// All aircraft seen so far, keyed by ICAO address.
#[derive(Debug, Default)]
pub struct AircraftStore {
    aircraft: HashMap<Icao, AircraftState>,
}

impl AircraftStore {
    pub fn new() -> Self {
        AircraftStore::default()
    }

    /// Existing state for `icao`, or a fresh one inserted on the spot.
    pub fn get_or_create(&mut self, icao: Icao) -> &mut AircraftState {
        self.aircraft
            .entry(icao)
            .or_insert_with(|| AircraftState::new(icao))
    }

    pub fn get(&self, icao: &Icao) -> Option<&AircraftState> {
        self.aircraft.get(icao)
    }

    pub fn get_mut(&mut self, icao: &Icao) -> Option<&mut AircraftState> {
        self.aircraft.get_mut(icao)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AircraftState> {
        self.aircraft.values()
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    /// Remove aircraft silent for more than `max_idle` seconds, unless a
    /// notification for them is still in flight. Returns count removed.
    pub fn prune_idle(&mut self, now: f64, max_idle: f64) -> usize {
        let before = self.aircraft.len();
        self.aircraft
            .retain(|_, ac| ac.notification_pending || now - ac.last_seen <= max_idle);
        before - self.aircraft.len()
    }
}
