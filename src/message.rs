//! Decoded Mode S messages and the decoder seam
//!
//! The demodulator (preamble search, bit slicing, CRC and error correction)
//! lives behind [`MessageDecoder`]. Everything downstream only sees
//! [`ModesMessage`] records.

use serde::{Deserialize, Serialize};

use crate::icao_cache::IcaoCache;

/// Unit for altitude measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AltitudeUnit {
    #[default]
    Feet,
    Meters,
}

/// Decoded Mode S message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModesMessage {
    /// Downlink Format (DF)
    pub msg_type: u8,
    /// ICAO address bytes
    pub aa: [u8; 3],
    /// Whether CRC was valid
    pub crc_ok: bool,
    /// Bit position that was corrected (None if no correction)
    pub error_bit: Option<usize>,
    /// Responder capabilities (CA field)
    pub ca: u8,
    /// Extended squitter message type (ME type)
    pub me_type: u8,
    /// Extended squitter message subtype
    pub me_sub: u8,
    /// Flight status (DF4,5,20,21)
    pub fs: u8,
    /// Squawk identity code
    pub identity: u16,
    pub altitude: i32,
    pub unit: AltitudeUnit,
    /// Flight callsign, at most 8 characters
    pub flight: String,
    /// CPR format flag (false = even, true = odd)
    pub fflag: bool,
    /// UTC synchronized time flag
    pub tflag: bool,
    /// Raw 17-bit CPR latitude
    pub raw_latitude: u32,
    /// Raw 17-bit CPR longitude
    pub raw_longitude: u32,
    pub heading_is_valid: bool,
    /// Heading in degrees
    pub heading: f64,
    /// East/West direction (0 = East, 1 = West)
    pub ew_dir: u8,
    pub ew_velocity: u16,
    /// North/South direction (0 = North, 1 = South)
    pub ns_dir: u8,
    pub ns_velocity: u16,
    pub vert_rate_source: u8,
    pub vert_rate_sign: u8,
    pub vert_rate: u16,
    /// Ground speed computed from the E/W and N/S components, knots
    pub velocity: u16,
    /// Reception time, milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl ModesMessage {
    /// Get the 24-bit ICAO address as a u32
    pub fn icao_address(&self) -> u32 {
        ((self.aa[0] as u32) << 16) | ((self.aa[1] as u32) << 8) | (self.aa[2] as u32)
    }

    #[cfg(test)]
    pub fn set_icao_address(&mut self, addr: u32) {
        self.aa = [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8];
    }

    /// Extended squitter identification (ME types 1-4)
    pub fn is_identification(&self) -> bool {
        self.msg_type == 17 && (1..=4).contains(&self.me_type)
    }

    /// Extended squitter airborne position with barometric altitude (ME 9-18)
    pub fn is_airborne_position(&self) -> bool {
        self.msg_type == 17 && (9..=18).contains(&self.me_type)
    }

    /// Extended squitter ground-speed velocity (ME 19, subtypes 1 and 2)
    pub fn is_airborne_velocity(&self) -> bool {
        self.msg_type == 17 && self.me_type == 19 && matches!(self.me_sub, 1 | 2)
    }

    /// Signed vertical rate in feet per minute, 0 when not available.
    pub fn vertical_rate_fpm(&self) -> i32 {
        if self.vert_rate == 0 {
            return 0;
        }
        let sign = if self.vert_rate_sign == 0 { 1 } else { -1 };
        sign * (self.vert_rate as i32 - 1) * 64
    }
}

/// Turns one window of magnitudes into decoded messages.
///
/// Called on the decode thread only, after the sample buffer lock has been
/// released. The cache belongs to the shared context and is handed in so
/// the decoder can both consult and refresh it. `fix_errors` enables
/// single-bit correction of replies that fail their CRC.
pub trait MessageDecoder {
    fn decode(&mut self, magnitude: &[u16], icao_cache: &mut IcaoCache, fix_errors: bool) -> Vec<ModesMessage>;
}

/// Decoder that never finds anything. Lets the acquisition and tracking
/// pipeline run when no demodulator is linked in.
#[derive(Debug, Default)]
pub struct NullDecoder;

impl MessageDecoder for NullDecoder {
    fn decode(&mut self, _magnitude: &[u16], _icao_cache: &mut IcaoCache, _fix_errors: bool) -> Vec<ModesMessage> {
        Vec::new()
    }
}
