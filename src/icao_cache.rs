//! Recently seen ICAO addresses
//!
//! A flat table of (address, timestamp) pairs the message decoder consults
//! before trusting an address recovered through CRC bit correction. The
//! table is allocated and zeroed once; its size never changes.

/// Number of slots. Must stay a power of two: slots are selected by masking.
pub const MODES_ICAO_CACHE_LEN: usize = 1024;
/// Seconds an address stays trustworthy after it was last recorded.
#[allow(dead_code)]
pub const MODES_ICAO_CACHE_TTL: u32 = 60;

const _: () = assert!(MODES_ICAO_CACHE_LEN.is_power_of_two());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IcaoCacheEntry {
    pub addr: u32,
    /// Unix seconds of the last `record`; 0 marks a never-written slot.
    pub seen: u32,
}

pub struct IcaoCache {
    entries: Box<[IcaoCacheEntry]>,
}

impl IcaoCache {
    pub fn new() -> Self {
        Self {
            entries: vec![IcaoCacheEntry::default(); MODES_ICAO_CACHE_LEN].into_boxed_slice(),
        }
    }

    /// Slot index for an address: integer mix, then mask to the table size.
    pub fn slot(addr: u32) -> usize {
        let mut a = addr;
        a = ((a >> 16) ^ a).wrapping_mul(0x045d_9f3b);
        a = ((a >> 16) ^ a).wrapping_mul(0x045d_9f3b);
        a = (a >> 16) ^ a;
        a as usize & (MODES_ICAO_CACHE_LEN - 1)
    }

    /// Timestamp of the last `record` of exactly this address, if its slot
    /// has not since been taken by another address.
    #[allow(dead_code)]
    pub fn lookup(&self, addr: u32) -> Option<u32> {
        let entry = self.entries[Self::slot(addr)];
        (entry.seen != 0 && entry.addr == addr).then_some(entry.seen)
    }

    /// Store `addr` as seen at `now`. A colliding address is replaced.
    #[allow(dead_code)]
    pub fn record(&mut self, addr: u32, now: u32) {
        self.entries[Self::slot(addr)] = IcaoCacheEntry { addr, seen: now };
    }

    /// True when `addr` was recorded no more than the TTL before `now`.
    #[cfg(test)]
    pub fn is_recent(&self, addr: u32, now: u32) -> bool {
        self.lookup(addr)
            .is_some_and(|seen| now.saturating_sub(seen) <= MODES_ICAO_CACHE_TTL)
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}

impl Default for IcaoCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cache_is_zeroed() {
        let cache = IcaoCache::new();
        assert_eq!(cache.capacity(), MODES_ICAO_CACHE_LEN);
        assert!(cache.entries.iter().all(|e| *e == IcaoCacheEntry::default()));
        assert_eq!(cache.lookup(0), None);
        assert_eq!(cache.lookup(0x4840D6), None);
    }

    #[test]
    fn test_slot_in_range() {
        for addr in [0u32, 1, 0x4840D6, 0xABCDEF, 0xFFFFFF, u32::MAX] {
            assert!(IcaoCache::slot(addr) < MODES_ICAO_CACHE_LEN);
        }
    }

    #[test]
    fn test_record_and_lookup() {
        let mut cache = IcaoCache::new();
        cache.record(0x4840D6, 1_700_000_000);
        assert_eq!(cache.lookup(0x4840D6), Some(1_700_000_000));

        cache.record(0x4840D6, 1_700_000_030);
        assert_eq!(cache.lookup(0x4840D6), Some(1_700_000_030));
    }

    #[test]
    fn test_ttl() {
        let mut cache = IcaoCache::new();
        cache.record(0xABCDEF, 1000);
        assert!(cache.is_recent(0xABCDEF, 1000));
        assert!(cache.is_recent(0xABCDEF, 1000 + MODES_ICAO_CACHE_TTL));
        assert!(!cache.is_recent(0xABCDEF, 1001 + MODES_ICAO_CACHE_TTL));
        assert!(!cache.is_recent(0x123456, 1000));
    }

    #[test]
    fn test_collision_last_writer_wins() {
        let mut cache = IcaoCache::new();
        let first = 0x000001u32;
        let target = IcaoCache::slot(first);
        let other = (2..0x0100_0000u32)
            .find(|&a| IcaoCache::slot(a) == target)
            .expect("colliding address in 24-bit space");

        cache.record(first, 500);
        cache.record(other, 600);
        assert_eq!(cache.lookup(first), None);
        assert_eq!(cache.lookup(other), Some(600));
    }
}
