//! Compact Position Reporting (CPR) global decoding
//!
//! An airborne position needs one even and one odd report. Together they
//! pin down the latitude zone, and the newer report of the pair supplies
//! the position itself.

/// 2^17: raw CPR latitude and longitude are 17-bit fractions of a zone.
const CPR_SCALE: f64 = 131072.0;

const AIR_DLAT0: f64 = 360.0 / 60.0;
const AIR_DLAT1: f64 = 360.0 / 59.0;

/// Even and odd reports further apart than this are not combined.
pub const CPR_MAX_PAIR_AGE_MS: u64 = 10_000;

/// Mean Earth radius used for distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Latitude thresholds of the NL function, from 1090-WP-9-14.
/// Below `NL_TABLE[k]` degrees there are `59 - k` longitude zones.
const NL_TABLE: [f64; 58] = [
    10.47047130, 14.82817437, 18.18626357, 21.02939493, 23.54504487, 25.82924707,
    27.93898710, 29.91135686, 31.77209708, 33.53993436, 35.22899598, 36.85025108,
    38.41241892, 39.92256684, 41.38651832, 42.80914012, 44.19454951, 45.54626723,
    46.86733252, 48.16039128, 49.42776439, 50.67150166, 51.89342469, 53.09516153,
    54.27817472, 55.44378444, 56.59318756, 57.72747354, 58.84763776, 59.95459277,
    61.04917774, 62.13216659, 63.20427479, 64.26616523, 65.31845310, 66.36171008,
    67.39646774, 68.42322022, 69.44242631, 70.45451075, 71.45986473, 72.45884545,
    73.45177442, 74.43893416, 75.42056257, 76.39684391, 77.36789461, 78.33374083,
    79.29428225, 80.24923213, 81.19801349, 82.13956981, 83.07199445, 83.99173563,
    84.89166191, 85.75541621, 86.53536998, 87.00000000,
];

/// One raw CPR report as kept on an aircraft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CprFrame {
    pub lat: u32,
    pub lon: u32,
    /// Reception time in milliseconds
    pub time_ms: u64,
}

/// CPR modulo function (always positive)
pub fn cpr_mod(a: i32, b: i32) -> i32 {
    let res = a % b;
    if res < 0 { res + b } else { res }
}

/// Number of longitude zones at a given latitude. Symmetric about the
/// equator, 59 at the equator down to 1 from 87 degrees poleward.
pub fn cpr_nl(lat: f64) -> i32 {
    let lat = lat.abs();
    match NL_TABLE.iter().position(|&threshold| lat < threshold) {
        Some(k) => 59 - k as i32,
        None => 1,
    }
}

/// CPR N function
pub fn cpr_n(lat: f64, is_odd: bool) -> i32 {
    (cpr_nl(lat) - is_odd as i32).max(1)
}

/// Longitude zone width in degrees
pub fn cpr_dlon(lat: f64, is_odd: bool) -> f64 {
    360.0 / cpr_n(lat, is_odd) as f64
}

/// True when the two reports are close enough in time to be combined.
pub fn is_fresh_pair(even: &CprFrame, odd: &CprFrame) -> bool {
    even.time_ms.abs_diff(odd.time_ms) <= CPR_MAX_PAIR_AGE_MS
}

/// Globally decode an even/odd pair into `(lat, lon)` degrees.
///
/// Returns `None` when the two reports fall in different latitude zones.
/// The newer report is the reference; on equal times the odd one is used.
pub fn decode_cpr(even: &CprFrame, odd: &CprFrame) -> Option<(f64, f64)> {
    let lat0 = even.lat as f64;
    let lat1 = odd.lat as f64;
    let lon0 = even.lon as f64;
    let lon1 = odd.lon as f64;

    // Latitude index
    let j = ((59.0 * lat0 - 60.0 * lat1) / CPR_SCALE + 0.5).floor() as i32;

    let mut rlat0 = AIR_DLAT0 * (cpr_mod(j, 60) as f64 + lat0 / CPR_SCALE);
    let mut rlat1 = AIR_DLAT1 * (cpr_mod(j, 59) as f64 + lat1 / CPR_SCALE);

    if rlat0 >= 270.0 {
        rlat0 -= 360.0;
    }
    if rlat1 >= 270.0 {
        rlat1 -= 360.0;
    }

    if cpr_nl(rlat0) != cpr_nl(rlat1) {
        return None;
    }

    let (rlat, is_odd, lon_ref) = if even.time_ms > odd.time_ms {
        (rlat0, false, lon0)
    } else {
        (rlat1, true, lon1)
    };

    let nl = cpr_nl(rlat) as f64;
    let ni = cpr_n(rlat, is_odd);
    let m = ((lon0 * (nl - 1.0) - lon1 * nl) / CPR_SCALE + 0.5).floor() as i32;

    let mut lon = cpr_dlon(rlat, is_odd) * (cpr_mod(m, ni) as f64 + lon_ref / CPR_SCALE);
    if lon > 180.0 {
        lon -= 360.0;
    }

    Some((rlat, lon))
}

/// Great-circle distance in kilometers (haversine).
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let u = ((lat2 - lat1).to_radians() / 2.0).sin();
    let v = ((lon2 - lon1).to_radians() / 2.0).sin();

    2.0 * EARTH_RADIUS_KM * (u * u + lat1_rad.cos() * lat2_rad.cos() * v * v).sqrt().asin()
}
