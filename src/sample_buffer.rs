//! Single-slot mailbox between the acquisition thread and the decode loop
//!
//! The producer overwrites the window on every transfer whether or not the
//! consumer got to the previous one. There is no queue: a slow consumer
//! loses windows, which keeps memory and latency bounded.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::magnitude::{MagnitudeLut, compute_magnitude_vector};

/// Preamble duration in microseconds
pub const MODES_PREAMBLE_US: usize = 8;
pub const MODES_LONG_MSG_BITS: usize = 112;
/// Sample periods spanned by the longest message, preamble included
pub const MODES_FULL_LEN: usize = MODES_PREAMBLE_US + MODES_LONG_MSG_BITS;
/// Bytes of payload delivered by one hardware transfer
pub const MODES_DATA_LEN: usize = 16 * 16384;
/// Tail of each window carried to the head of the next one so that a
/// message straddling two transfers is whole in at least one window.
pub const MODES_OVERLAP_LEN: usize = (MODES_FULL_LEN - 1) * 4;

struct Slot {
    data: Box<[u8]>,
    ready: bool,
}

pub struct SampleBuffer {
    data_len: usize,
    slot: Mutex<Slot>,
    cond: Condvar,
}

impl SampleBuffer {
    /// Buffer sized for `data_len` payload bytes per transfer, plus the
    /// carried-over tail. Starts filled with 127 (zero signal).
    pub fn new(data_len: usize) -> Self {
        let data = vec![127u8; data_len + MODES_OVERLAP_LEN].into_boxed_slice();
        Self {
            data_len,
            slot: Mutex::new(Slot { data, ready: false }),
            cond: Condvar::new(),
        }
    }

    /// Total window length in bytes.
    pub fn window_len(&self) -> usize {
        self.data_len + MODES_OVERLAP_LEN
    }

    /// Magnitudes produced per window.
    pub fn magnitude_len(&self) -> usize {
        self.window_len() / 2
    }

    /// Producer side, called once per completed transfer.
    ///
    /// Input longer than the payload capacity is truncated. Never blocks on
    /// the consumer. Returns `true` when an unconsumed window was overwritten.
    pub fn produce(&self, buf: &[u8]) -> bool {
        let mut slot = self.slot.lock();
        let len = buf.len().min(self.data_len);

        slot.data
            .copy_within(self.data_len..self.data_len + MODES_OVERLAP_LEN, 0);
        slot.data[MODES_OVERLAP_LEN..MODES_OVERLAP_LEN + len].copy_from_slice(&buf[..len]);

        let overwritten = slot.ready;
        slot.ready = true;
        self.cond.notify_one();
        overwritten
    }

    /// Consumer side: block until a window is ready, then convert it into
    /// `magnitude` while still holding the lock and mark it consumed.
    ///
    /// `exit` is checked only before each wait; a wait in progress ends on
    /// the next producer signal, not on the flag itself. Returns `None` once
    /// exit has been requested and no window is pending.
    pub fn consume(&self, exit: &AtomicBool, lut: &MagnitudeLut, magnitude: &mut [u16]) -> Option<usize> {
        let mut slot = self.slot.lock();
        while !slot.ready {
            if exit.load(Ordering::SeqCst) {
                return None;
            }
            self.cond.wait(&mut slot);
        }

        let n = compute_magnitude_vector(&slot.data, lut, magnitude);
        slot.ready = false;
        self.cond.notify_one();
        trace!(samples = n, "window consumed");
        Some(n)
    }

    /// Block a producer until the pending window has been consumed. Only
    /// for sources that can be paused, such as files; a live receiver never
    /// waits. Returns `false` if exit was requested instead.
    pub fn wait_consumed(&self, exit: &AtomicBool) -> bool {
        let mut slot = self.slot.lock();
        while slot.ready {
            if exit.load(Ordering::SeqCst) {
                return false;
            }
            self.cond.wait(&mut slot);
        }
        !exit.load(Ordering::SeqCst)
    }

    /// Wake any waiter without delivering data, so it re-reads the exit
    /// flag. Used on shutdown by whichever side stops first.
    pub fn wake(&self) {
        let _slot = self.slot.lock();
        self.cond.notify_all();
    }

    #[cfg(test)]
    fn window(&self) -> Vec<u8> {
        self.slot.lock().data.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_window_geometry() {
        let sb = SampleBuffer::new(MODES_DATA_LEN);
        assert_eq!(MODES_FULL_LEN, 120);
        assert_eq!(MODES_OVERLAP_LEN, 476);
        assert_eq!(sb.window_len(), 16 * 16384 + 476);
        assert_eq!(sb.magnitude_len(), sb.window_len() / 2);
        assert!(sb.window().iter().all(|&b| b == 127));
    }

    #[test]
    fn test_tail_carried_to_next_window() {
        let sb = SampleBuffer::new(2048);
        let lengths = [2048usize, 17, 900, 3000, 0, 2047, 476];

        for (n, &len) in lengths.iter().enumerate() {
            let before = sb.window();
            let tail = before[before.len() - MODES_OVERLAP_LEN..].to_vec();

            let chunk: Vec<u8> = (0..len).map(|k| ((k * 31 + n * 7) % 251) as u8).collect();
            sb.produce(&chunk);

            let after = sb.window();
            assert_eq!(&after[..MODES_OVERLAP_LEN], &tail[..], "write {}", n);

            let copied = len.min(2048);
            assert_eq!(
                &after[MODES_OVERLAP_LEN..MODES_OVERLAP_LEN + copied],
                &chunk[..copied]
            );
        }
    }

    #[test]
    fn test_oversized_transfer_is_clamped() {
        let sb = SampleBuffer::new(64);
        let chunk = vec![200u8; 500];
        sb.produce(&chunk);
        let w = sb.window();
        assert_eq!(w.len(), 64 + MODES_OVERLAP_LEN);
        assert!(w[MODES_OVERLAP_LEN..].iter().all(|&b| b == 200));
    }

    #[test]
    fn test_unconsumed_window_is_overwritten() {
        let sb = SampleBuffer::new(64);
        let lut = MagnitudeLut::new();
        let exit = AtomicBool::new(false);
        let mut mag = vec![0u16; sb.magnitude_len()];

        assert!(!sb.produce(&[255u8; 64]));
        assert!(sb.produce(&[127u8; 64]));

        // Only the latest window is delivered.
        assert_eq!(sb.consume(&exit, &lut, &mut mag), Some(sb.magnitude_len()));
        assert!(mag[MODES_OVERLAP_LEN / 2..].iter().all(|&m| m == 0));

        exit.store(true, Ordering::SeqCst);
        assert_eq!(sb.consume(&exit, &lut, &mut mag), None);
    }

    #[test]
    fn test_consumer_blocks_until_produced() {
        let sb = Arc::new(SampleBuffer::new(128));
        let lut = MagnitudeLut::new();
        let exit = AtomicBool::new(false);
        let mut mag = vec![0u16; sb.magnitude_len()];

        let producer = {
            let sb = Arc::clone(&sb);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                sb.produce(&[255u8; 128]);
            })
        };

        let n = sb.consume(&exit, &lut, &mut mag);
        assert_eq!(n, Some(sb.magnitude_len()));
        assert_eq!(mag[sb.magnitude_len() - 1], lut.lookup(128, 128));
        producer.join().unwrap();
    }

    #[test]
    fn test_lockstep_producer_loses_nothing() {
        let sb = Arc::new(SampleBuffer::new(64));
        let exit = Arc::new(AtomicBool::new(false));

        let producer = {
            let sb = Arc::clone(&sb);
            let exit = Arc::clone(&exit);
            thread::spawn(move || {
                for n in 1..=5u8 {
                    if !sb.wait_consumed(&exit) {
                        return;
                    }
                    sb.produce(&[127 + n; 64]);
                }
                sb.wait_consumed(&exit);
                exit.store(true, Ordering::SeqCst);
                sb.wake();
            })
        };

        let lut = MagnitudeLut::new();
        let mut mag = vec![0u16; sb.magnitude_len()];
        let mut seen = Vec::new();
        while sb.consume(&exit, &lut, &mut mag).is_some() {
            seen.push(mag[sb.magnitude_len() - 1]);
        }
        producer.join().unwrap();

        let expected: Vec<u16> = (1..=5u8).map(|n| lut.lookup(n, n)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_wake_releases_consumer_on_exit() {
        let sb = Arc::new(SampleBuffer::new(32));
        let exit = Arc::new(AtomicBool::new(false));

        let consumer = {
            let sb = Arc::clone(&sb);
            let exit = Arc::clone(&exit);
            thread::spawn(move || {
                let lut = MagnitudeLut::new();
                let mut mag = vec![0u16; sb.magnitude_len()];
                sb.consume(&exit, &lut, &mut mag)
            })
        };

        thread::sleep(Duration::from_millis(20));
        exit.store(true, Ordering::SeqCst);
        sb.wake();
        assert_eq!(consumer.join().unwrap(), None);
    }
}
