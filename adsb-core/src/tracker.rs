//! Aggregation and notification gating.
//!
//! Pure logic, no I/O. Every DF17 message updates the state of its
//! aircraft; when callsign and position are both known and the rate limit
//! allows, the tracker hands back a `Notification` for the caller to deliver.
//!
//! Delivery is the caller's business. While a notification is out, the
//! aircraft is marked pending and no further notification is produced for it
//! until `notification_finished` reports the time the sink returned.

use std::sync::Arc;

use crate::clock::Clock;
use crate::decode;
use crate::extended::decode_extended;
use crate::frame::{self, Frame};
use crate::line::{parse_line, TimestampFormat};
use crate::record::DecodedRecord;
use crate::store::{AircraftStore, FusionOutcome};
use crate::types::*;

/// Seconds after which an un-refreshed position is discarded.
pub const POSITION_TIMEOUT: f64 = 120.0;

/// Minimum seconds between two notifications for one aircraft.
pub const MESSAGE_RATE_LIMIT: f64 = 10.0;

/// Tunable knobs of the aggregation policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    pub position_timeout: f64,
    pub rate_limit: f64,
    /// Merge the triggering message's own decode into each notification.
    pub extended_fields: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            position_timeout: POSITION_TIMEOUT,
            rate_limit: MESSAGE_RATE_LIMIT,
            extended_fields: true,
        }
    }
}

/// A record ready to be handed to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub icao: Icao,
    pub record: DecodedRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub lines: u64,
    pub malformed_lines: u64,
    pub messages: u64,
    pub non_adsb: u64,
    pub invalid_frames: u64,
    pub positions_resolved: u64,
    pub cpr_failures: u64,
    pub positions_expired: u64,
    pub notifications: u64,
}

/// Owns the aircraft store and applies the aggregation policy to it.
pub struct Tracker {
    store: AircraftStore,
    policy: Policy,
    format: TimestampFormat,
    clock: Arc<dyn Clock>,
    pub counters: Counters,
}

impl Tracker {
    pub fn new(policy: Policy, format: TimestampFormat, clock: Arc<dyn Clock>) -> Self {
        Tracker {
            store: AircraftStore::new(),
            policy,
            format,
            clock,
            counters: Counters::default(),
        }
    }

    pub fn store(&self) -> &AircraftStore {
        &self.store
    }

    /// Parse a raw source line and process its message.
    ///
    /// Malformed lines are rejected with an error and leave no trace in the
    /// store.
    pub fn process_line(&mut self, line: &str) -> Result<Option<Notification>> {
        self.counters.lines += 1;
        let parsed = parse_line(line, &self.format).inspect_err(|_| {
            self.counters.malformed_lines += 1;
        })?;
        self.process_message(parsed.timestamp, &parsed.message)
    }

    /// Apply one hex message carrying the given line timestamp.
    ///
    /// Only DF17 messages touch the store. Individual field decode failures
    /// are absorbed; the prior value is kept.
    pub fn process_message(&mut self, timestamp: f64, message: &str) -> Result<Option<Notification>> {
        self.counters.messages += 1;

        let df = frame::df(message)?;
        if df != DF_EXTENDED_SQUITTER {
            self.counters.non_adsb += 1;
            return Err(AdsbError::NotExtendedSquitter(df));
        }
        let frame = Frame::parse(message).inspect_err(|_| {
            self.counters.invalid_frames += 1;
        })?;

        let now = self.clock.now();
        let tc = frame.type_code();
        let policy = self.policy;

        let ac = self.store.get_or_create(frame.icao());
        ac.last_seen = now;
        ac.message_count += 1;

        match tc {
            1..=4 => {
                if let Ok(callsign) = decode::callsign(&frame) {
                    ac.callsign = Some(callsign);
                }
            }
            19 => {
                if let Ok((speed, heading)) = decode::speed_heading(&frame) {
                    ac.velocity = speed;
                    ac.heading = heading;
                }
            }
            5..=18 | 20..=22 => {
                if let Ok(alt) = decode::altitude(&frame) {
                    ac.altitude = Some(alt);
                }
            }
            _ => {}
        }

        if (9..=18).contains(&tc) {
            match ac.fuse_position(&frame, timestamp, now) {
                FusionOutcome::Resolved(_) => self.counters.positions_resolved += 1,
                FusionOutcome::Failed(_) => self.counters.cpr_failures += 1,
                FusionOutcome::Waiting => {}
            }
        }

        if ac.expire_position(now, policy.position_timeout) {
            self.counters.positions_expired += 1;
        }

        if !ac.ready_to_notify(now, policy.rate_limit) {
            return Ok(None);
        }

        ac.notification_pending = true;
        let mut record = ac.to_record(tc);
        if policy.extended_fields {
            record.merge(decode_extended(message));
        }
        self.counters.notifications += 1;

        Ok(Some(Notification {
            icao: ac.icao,
            record,
        }))
    }

    /// Record that the sink returned for `icao` at wall-clock time `at`,
    /// whether or not delivery succeeded.
    pub fn notification_finished(&mut self, icao: &Icao, at: f64) {
        if let Some(ac) = self.store.get_mut(icao) {
            ac.last_notified = Some(at);
            ac.notification_pending = false;
        }
    }

    /// Evict aircraft idle for longer than `max_idle` seconds.
    pub fn prune_idle(&mut self, max_idle: f64) -> usize {
        let now = self.clock.now();
        self.store.prune_idle(now, max_idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crc;
    use crate::record::FieldValue;

    const IDENT: &str = "8D4840D6202CC371C32CE0576098";
    const EVEN: &str = "8D40621D58C382D690C8AC2863A7";
    const ODD: &str = "8D40621D58C386435CC412692AD6";
    const VELOCITY: &str = "8D485020994409940838175B284F";
    const ICAO: Icao = [0x40, 0x62, 0x1D];

    /// Apply `edit` to the raw bytes and recompute the parity field.
    fn patch(hex: &str, edit: impl FnOnce(&mut Vec<u8>)) -> String {
        let mut raw = hex_decode(hex).unwrap();
        edit(&mut raw);
        let pi = crc::crc24_payload(&raw);
        raw[11] = (pi >> 16) as u8;
        raw[12] = (pi >> 8) as u8;
        raw[13] = pi as u8;
        hex_encode(&raw)
    }

    fn with_icao(hex: &str, icao: Icao) -> String {
        patch(hex, |raw| raw[1..4].copy_from_slice(&icao))
    }

    /// Replace the 17-bit CPR latitude of a position frame.
    fn with_cpr_lat(hex: &str, lat: u32) -> String {
        patch(hex, |raw| {
            let me = raw[4..11].iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
            let me = (me & !(0x1FFFF << 17)) | ((lat as u64) << 17);
            for (i, byte) in raw[4..11].iter_mut().enumerate() {
                *byte = (me >> (48 - 8 * i)) as u8;
            }
        })
    }

    fn line(message: &str) -> String {
        format!("Mon Jan 02 2006,1,{message}")
    }

    fn tracker(extended_fields: bool) -> (Tracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1000.0));
        let policy = Policy {
            extended_fields,
            ..Policy::default()
        };
        let tracker = Tracker::new(policy, TimestampFormat::default(), clock.clone());
        (tracker, clock)
    }

    fn feed(tracker: &mut Tracker, message: &str) -> Option<Notification> {
        tracker.process_line(&line(message)).unwrap()
    }

    #[test]
    fn test_notification_after_callsign_and_position() {
        let (mut tracker, _clock) = tracker(false);

        assert!(feed(&mut tracker, &with_icao(IDENT, ICAO)).is_none());
        assert!(feed(&mut tracker, EVEN).is_none());
        let n = feed(&mut tracker, ODD).expect("notification once position resolves");

        assert_eq!(n.icao, ICAO);
        let record = &n.record;
        assert_eq!(record.get("ICAO"), Some(&FieldValue::Text("40621D".into())));
        assert_eq!(record.get("TypeCode"), Some(&FieldValue::Int(11)));
        assert_eq!(record.get("Altitude"), Some(&FieldValue::Int(38000)));
        assert_eq!(record.get("Velocity"), Some(&FieldValue::Unknown));
        assert_eq!(record.get("Callsign"), Some(&FieldValue::Text("KLM1023".into())));
        match (record.get("Latitude"), record.get("Longitude")) {
            (Some(FieldValue::Float(lat)), Some(FieldValue::Float(lon))) => {
                assert!((lat - 52.2572).abs() < 1e-3);
                assert!((lon - 3.9194).abs() < 1e-3);
            }
            other => panic!("position missing from record: {other:?}"),
        }
        assert_eq!(tracker.counters.notifications, 1);
    }

    #[test]
    fn test_no_notification_without_callsign() {
        let (mut tracker, _clock) = tracker(false);
        assert!(feed(&mut tracker, EVEN).is_none());
        assert!(feed(&mut tracker, ODD).is_none());
        assert!(tracker.store().get(&ICAO).unwrap().has_position());
    }

    #[test]
    fn test_pending_and_rate_limit() {
        let (mut tracker, clock) = tracker(false);
        feed(&mut tracker, &with_icao(IDENT, ICAO));
        feed(&mut tracker, EVEN);
        assert!(feed(&mut tracker, ODD).is_some());

        // Still in flight
        assert!(feed(&mut tracker, EVEN).is_none());

        tracker.notification_finished(&ICAO, 1000.0);
        clock.advance(5.0);
        assert!(feed(&mut tracker, ODD).is_none());

        clock.set(1009.999);
        assert!(feed(&mut tracker, EVEN).is_none());

        clock.set(1010.0);
        assert!(feed(&mut tracker, ODD).is_some());
    }

    #[test]
    fn test_notifications_never_closer_than_rate_limit() {
        let (mut tracker, clock) = tracker(false);
        feed(&mut tracker, &with_icao(IDENT, ICAO));

        let mut sent = Vec::new();
        for i in 0..60 {
            let msg = if i % 2 == 0 { EVEN } else { ODD };
            if feed(&mut tracker, msg).is_some() {
                let at = clock.now();
                sent.push(at);
                tracker.notification_finished(&ICAO, at);
            }
            clock.advance(0.75);
        }

        assert!(sent.len() > 1);
        for pair in sent.windows(2) {
            assert!(pair[1] - pair[0] >= MESSAGE_RATE_LIMIT);
        }
    }

    #[test]
    fn test_position_expires_after_timeout() {
        let (mut tracker, clock) = tracker(false);
        feed(&mut tracker, EVEN);
        feed(&mut tracker, ODD);

        clock.set(1120.0);
        assert!(feed(&mut tracker, &with_icao(VELOCITY, ICAO)).is_none());
        assert!(tracker.store().get(&ICAO).unwrap().has_position());

        clock.set(1120.5);
        // Callsign arrives, but the position just went stale
        assert!(feed(&mut tracker, &with_icao(IDENT, ICAO)).is_none());
        let ac = tracker.store().get(&ICAO).unwrap();
        assert!(ac.lat().is_none() && ac.lon().is_none());
        assert_eq!(ac.callsign.as_deref(), Some("KLM1023"));
        assert_eq!(tracker.counters.positions_expired, 1);
    }

    #[test]
    fn test_malformed_lines_leave_no_state() {
        let (mut tracker, _clock) = tracker(true);
        assert!(tracker.process_line("garbage").is_err());
        assert!(tracker.process_line("Mon Jan 02 2006,1").is_err());
        assert!(tracker.process_line("Mon Jan 02 2006,1,NOTHEX!").is_err());
        assert!(tracker.process_line(&format!("not a date,1,{EVEN}")).is_err());

        assert!(tracker.store().is_empty());
        assert_eq!(tracker.counters.malformed_lines, 4);
        assert_eq!(tracker.counters.messages, 0);
    }

    #[test]
    fn test_non_df17_ignored() {
        let (mut tracker, _clock) = tracker(true);
        let df18 = patch(EVEN, |raw| raw[0] = 0x90);
        assert!(matches!(
            tracker.process_line(&line(&df18)),
            Err(AdsbError::NotExtendedSquitter(18))
        ));
        assert!(matches!(
            tracker.process_line(&line("02E197C845AC82")),
            Err(AdsbError::NotExtendedSquitter(0))
        ));
        assert!(tracker.store().is_empty());
        assert_eq!(tracker.counters.non_adsb, 2);
    }

    #[test]
    fn test_crc_failure_rejected() {
        let (mut tracker, _clock) = tracker(true);
        let result = tracker.process_line(&line("8D40621D58C382D690C8AC2863A8"));
        assert!(matches!(result, Err(AdsbError::CrcFailed)));
        assert!(tracker.store().is_empty());
        assert_eq!(tracker.counters.invalid_frames, 1);
    }

    #[test]
    fn test_altitude_failure_keeps_prior_value() {
        let (mut tracker, _clock) = tracker(false);
        feed(&mut tracker, EVEN);
        assert_eq!(tracker.store().get(&ICAO).unwrap().altitude, Some(38000));

        // Altitude code zeroed: not available
        let no_alt = patch(EVEN, |raw| {
            raw[5] = 0;
            raw[6] &= 0x0F;
        });
        feed(&mut tracker, &no_alt);
        assert_eq!(tracker.store().get(&ICAO).unwrap().altitude, Some(38000));
    }

    #[test]
    fn test_blank_callsign_overwrites() {
        let (mut tracker, _clock) = tracker(false);
        let icao = [0x48, 0x40, 0xD6];
        feed(&mut tracker, IDENT);

        let blank = patch(IDENT, |raw| {
            raw[5..11].copy_from_slice(&[0x82, 0x08, 0x20, 0x82, 0x08, 0x20]);
        });
        feed(&mut tracker, &blank);
        assert_eq!(
            tracker.store().get(&icao).unwrap().callsign.as_deref(),
            Some("")
        );
        assert_eq!(tracker.store().get(&icao).unwrap().message_count, 2);
    }

    #[test]
    fn test_cpr_failure_keeps_previous_position() {
        let (mut tracker, clock) = tracker(false);
        feed(&mut tracker, EVEN);
        feed(&mut tracker, ODD);
        let before = tracker.store().get(&ICAO).unwrap().position;
        assert!(before.is_some());

        // Even latitude now decodes to NL 58 while the odd one sits in NL 57
        clock.advance(5.0);
        feed(&mut tracker, &with_cpr_lat(EVEN, 69_500));

        let ac = tracker.store().get(&ICAO).unwrap();
        assert_eq!(ac.position, before);
        assert_eq!(ac.last_position_update, Some(1000.0));
        assert_eq!(ac.message_count, 3);
        assert_eq!(tracker.counters.cpr_failures, 1);
        assert_eq!(tracker.counters.positions_resolved, 1);
    }

    #[test]
    fn test_velocity_updates_speed_and_heading() {
        let (mut tracker, _clock) = tracker(false);
        feed(&mut tracker, VELOCITY);
        let ac = tracker.store().get(&[0x48, 0x50, 0x20]).unwrap();
        assert!((ac.velocity.unwrap() - 159.2).abs() < 0.1);
        assert!((ac.heading.unwrap() - 182.88).abs() < 0.01);
    }

    #[test]
    fn test_extended_fields_merged_in_order() {
        let (mut tracker, _clock) = tracker(true);
        feed(&mut tracker, &with_icao(IDENT, ICAO));
        feed(&mut tracker, EVEN);
        let n = feed(&mut tracker, ODD).unwrap();

        assert_eq!(
            n.record.keys().collect::<Vec<_>>(),
            vec![
                "ICAO",
                "TypeCode",
                "Altitude",
                "Velocity",
                "Heading",
                "Callsign",
                "Latitude",
                "Longitude",
                "DownlinkFormat",
                "ICAO24",
            ]
        );
        assert_eq!(n.record.get("DownlinkFormat"), Some(&FieldValue::Int(17)));
        assert_eq!(n.record.get("ICAO24"), Some(&FieldValue::Text("40621D".into())));
    }

    #[test]
    fn test_prune_idle() {
        let (mut tracker, clock) = tracker(false);
        feed(&mut tracker, IDENT);
        clock.advance(30.0);
        feed(&mut tracker, VELOCITY);

        clock.advance(40.0);
        assert_eq!(tracker.prune_idle(60.0), 1);
        assert_eq!(tracker.store().len(), 1);
        assert!(tracker.store().get(&[0x48, 0x50, 0x20]).is_some());
    }
}
