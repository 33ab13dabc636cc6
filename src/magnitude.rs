//! I/Q to magnitude conversion
//!
//! Raw samples arrive as interleaved unsigned 8-bit I/Q bytes centered at 127.
//! Each pair is folded to `|I-127|, |Q-127|` (both in 0..=128) and mapped
//! through a precomputed table, so the hot loop never calls `sqrt`.

/// Side of the lookup table: offsets 0..=128 on each axis.
pub const LUT_SIDE: usize = 129;

/// Scale applied to `sqrt(i² + q²)`. Keeps neighbouring I/Q pairs distinct;
/// the largest entry is `round(sqrt(128² + 128²) * 360) = 65167`.
const MAGNITUDE_SCALE: f64 = 360.0;

/// Lookup table for I/Q to magnitude conversion.
/// Index: i * 129 + q (where i, q are 0..=128)
pub struct MagnitudeLut {
    table: Box<[u16]>,
}

impl MagnitudeLut {
    /// Build the 129 x 129 table. Immutable afterwards, so one instance can
    /// be shared read-only by any number of threads.
    pub fn new() -> Self {
        let mut table = vec![0u16; LUT_SIDE * LUT_SIDE].into_boxed_slice();

        for i in 0..LUT_SIDE {
            for q in 0..LUT_SIDE {
                let mag = ((i * i + q * q) as f64).sqrt() * MAGNITUDE_SCALE;
                table[i * LUT_SIDE + q] = mag.round() as u16;
            }
        }

        Self { table }
    }

    /// Look up magnitude for offset-corrected I/Q values.
    ///
    /// Both arguments must be in 0..=128; anything larger is outside the
    /// table's domain and panics on the index.
    #[inline]
    pub fn lookup(&self, i: u8, q: u8) -> u16 {
        debug_assert!(i <= 128 && q <= 128);
        self.table[i as usize * LUT_SIDE + q as usize]
    }
}

impl Default for MagnitudeLut {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold a raw sample byte to its distance from the 127 center (0..=128).
#[inline]
fn fold(sample: u8) -> u8 {
    (sample as i16 - 127).unsigned_abs() as u8
}

/// Fill `out` with one magnitude per I/Q pair of `data`.
///
/// `out` must hold at least `data.len() / 2` entries; a trailing odd byte is
/// ignored. Returns the number of magnitudes written.
pub fn compute_magnitude_vector(data: &[u8], lut: &MagnitudeLut, out: &mut [u16]) -> usize {
    let mut written = 0;
    for (pair, slot) in data.chunks_exact(2).zip(out.iter_mut()) {
        *slot = lut.lookup(fold(pair[0]), fold(pair[1]));
        written += 1;
    }
    written
}
