//! Aircraft tracking and position decoding
//!
//! Maintains the set of recently heard aircraft, keyed by ICAO address.
//! Entries are created on the first message from an address, updated by
//! every later one, and dropped after `ttl` of silence.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};

use crate::cpr::{self, CprFrame};
use crate::message::ModesMessage;

/// Feet per meter, as used for the metric display.
pub const FEET_PER_METER: f64 = 3.2828;
/// Kilometers per hour in one knot.
pub const KMH_PER_KNOT: f64 = 1.852;

/// Tracked aircraft data
#[derive(Debug, Clone)]
pub struct Aircraft {
    /// ICAO 24-bit address
    pub addr: u32,
    /// Hex address string
    pub hex_addr: String,
    /// Flight callsign
    pub flight: String,
    /// Altitude in feet
    pub altitude: i32,
    /// Ground speed in knots
    pub speed: u16,
    /// Track in degrees
    pub track: u16,
    /// Squawk code from DF5/DF21
    pub squawk: u16,
    /// Vertical rate in ft/min from the last velocity report
    pub vert_rate: i32,
    /// Last seen, ms since epoch
    pub seen_ms: u64,
    pub messages: u64,
    /// Last even CPR report, if one has arrived
    pub even_cpr: Option<CprFrame>,
    /// Last odd CPR report, if one has arrived
    pub odd_cpr: Option<CprFrame>,
    /// Decoded latitude
    pub lat: f64,
    /// Decoded longitude
    pub lon: f64,
    /// Km from the receiver reference point at the last position fix
    pub distance: f64,
}

impl Aircraft {
    pub fn new(addr: u32, now_ms: u64) -> Self {
        Self {
            addr,
            hex_addr: format!("{:06X}", addr),
            flight: String::new(),
            altitude: 0,
            speed: 0,
            track: 0,
            squawk: 0,
            vert_rate: 0,
            seen_ms: now_ms,
            messages: 0,
            even_cpr: None,
            odd_cpr: None,
            lat: 0.0,
            lon: 0.0,
            distance: 0.0,
        }
    }

    #[cfg(test)]
    pub fn has_position(&self) -> bool {
        self.lat != 0.0 || self.lon != 0.0
    }
}

/// One rendered row of the aircraft list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftView {
    pub hex: String,
    pub flight: String,
    /// Feet, or meters when metric
    pub altitude: i32,
    /// Knots, or km/h when metric
    pub speed: i32,
    pub lat: f64,
    pub lon: f64,
    /// Kilometers
    pub distance: f64,
    pub track: u16,
    pub squawk: u16,
    /// Feet per minute
    pub vert_rate: i32,
    pub messages: u64,
    pub seen_secs: u64,
}

impl AircraftView {
    fn new(a: &Aircraft, metric: bool, now_ms: u64) -> Self {
        let (altitude, speed) = if metric {
            (
                (a.altitude as f64 / FEET_PER_METER) as i32,
                (a.speed as f64 * KMH_PER_KNOT) as i32,
            )
        } else {
            (a.altitude, a.speed as i32)
        };

        Self {
            hex: a.hex_addr.clone(),
            flight: a.flight.clone(),
            altitude,
            speed,
            lat: a.lat,
            lon: a.lon,
            distance: a.distance,
            track: a.track,
            squawk: a.squawk,
            vert_rate: a.vert_rate,
            messages: a.messages,
            seen_secs: now_ms.saturating_sub(a.seen_ms) / 1000,
        }
    }
}

/// Store for tracking multiple aircraft
///
/// Iteration order is creation order, newest first. An update does not
/// move an aircraft to the front.
pub struct AircraftTable {
    aircraft: HashMap<u32, Aircraft>,
    /// Addresses in creation order, oldest first.
    order: Vec<u32>,
    check_crc: bool,
    ref_lat: f64,
    ref_lon: f64,
}

impl AircraftTable {
    pub fn new(check_crc: bool, ref_lat: f64, ref_lon: f64) -> Self {
        Self {
            aircraft: HashMap::new(),
            order: Vec::new(),
            check_crc,
            ref_lat,
            ref_lon,
        }
    }

    /// Update aircraft from a decoded message
    ///
    /// `mm.timestamp_ms` is taken as the current time. Returns `None`, with
    /// no state touched, when CRC checking is on and the message failed it.
    pub fn ingest(&mut self, mm: &ModesMessage) -> Option<&Aircraft> {
        if self.check_crc && !mm.crc_ok {
            return None;
        }

        let addr = mm.icao_address();
        let now = mm.timestamp_ms;

        let aircraft = self.aircraft.entry(addr).or_insert_with(|| {
            self.order.push(addr);
            debug!(icao = %format!("{:06X}", addr), "new aircraft");
            Aircraft::new(addr, now)
        });
        aircraft.seen_ms = now;
        aircraft.messages += 1;

        match mm.msg_type {
            0 | 4 | 16 | 20 => {
                aircraft.altitude = mm.altitude;
            }
            5 | 21 => {
                if mm.identity != 0 {
                    aircraft.squawk = mm.identity;
                }
            }
            17 => {
                if mm.is_identification() {
                    aircraft.flight = mm.flight.chars().take(8).collect();
                } else if mm.is_airborne_position() {
                    aircraft.altitude = mm.altitude;

                    let frame = CprFrame {
                        lat: mm.raw_latitude,
                        lon: mm.raw_longitude,
                        time_ms: now,
                    };
                    if mm.fflag {
                        aircraft.odd_cpr = Some(frame);
                    } else {
                        aircraft.even_cpr = Some(frame);
                    }

                    // Both halves must have been received, close together.
                    if let (Some(even), Some(odd)) = (aircraft.even_cpr, aircraft.odd_cpr) {
                        if cpr::is_fresh_pair(&even, &odd) {
                            update_position(aircraft, &even, &odd, self.ref_lat, self.ref_lon);
                        }
                    }
                } else if mm.is_airborne_velocity() {
                    aircraft.speed = mm.velocity;
                    aircraft.track = mm.heading as u16;
                    aircraft.vert_rate = mm.vertical_rate_fpm();
                }
            }
            _ => {}
        }

        self.aircraft.get(&addr)
    }

    /// Drop every aircraft silent for longer than `ttl`. Survivors keep
    /// their relative order. Returns how many were removed.
    pub fn sweep(&mut self, now_ms: u64, ttl: Duration) -> usize {
        let ttl_ms = ttl.as_millis() as u64;
        let before = self.aircraft.len();

        self.aircraft.retain(|addr, a| {
            let keep = now_ms.saturating_sub(a.seen_ms) <= ttl_ms;
            if !keep {
                trace!(icao = %format!("{:06X}", addr), "aircraft expired");
            }
            keep
        });
        let aircraft = &self.aircraft;
        self.order.retain(|addr| aircraft.contains_key(addr));

        before - self.aircraft.len()
    }

    /// Up to `max_rows` rows for display, newest first.
    pub fn snapshot(&self, max_rows: usize, metric: bool, now_ms: u64) -> Vec<AircraftView> {
        self.iter()
            .take(max_rows)
            .map(|a| AircraftView::new(a, metric, now_ms))
            .collect()
    }

    /// Aircraft in display order, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Aircraft> {
        self.order
            .iter()
            .rev()
            .filter_map(|addr| self.aircraft.get(addr))
    }

    #[cfg(test)]
    pub fn get(&self, addr: u32) -> Option<&Aircraft> {
        self.aircraft.get(&addr)
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }
}

/// Combine the stored even/odd reports. A zone mismatch leaves the last
/// known position in place.
fn update_position(aircraft: &mut Aircraft, even: &CprFrame, odd: &CprFrame, ref_lat: f64, ref_lon: f64) {
    match cpr::decode_cpr(even, odd) {
        Some((lat, lon)) => {
            aircraft.lat = lat;
            aircraft.lon = lon;
            aircraft.distance = cpr::distance_km(lat, lon, ref_lat, ref_lon);
        }
        None => {
            debug!(icao = %aircraft.hex_addr, "CPR pair spans latitude zones, skipped");
        }
    }
}
