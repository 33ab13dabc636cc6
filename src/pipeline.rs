//! Process-wide decoding context and the consumer loop
//!
//! The acquisition thread only ever touches `samples` and `exit`. The ICAO
//! cache and the aircraft table are used from the decode thread alone, so
//! they carry no locks of their own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, info};

use crate::aircraft::{AircraftTable, AircraftView};
use crate::config::Config;
use crate::icao_cache::IcaoCache;
use crate::magnitude::MagnitudeLut;
use crate::message::{MessageDecoder, ModesMessage};
use crate::sample_buffer::{MODES_DATA_LEN, SampleBuffer};

/// Minimum time between two maintenance ticks (sweep + redraw).
pub const MODES_INTERACTIVE_REFRESH_TIME: Duration = Duration::from_millis(250);

/// Milliseconds since the Unix epoch.
pub fn mstime() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Rows handed to the renderer on each maintenance tick.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub rows: Vec<AircraftView>,
    /// Aircraft tracked, including rows beyond the display limit
    pub total: usize,
    pub now_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub windows: u64,
    pub messages: u64,
    pub rejected: u64,
    pub evicted: u64,
}

pub struct Context {
    pub config: Config,
    pub samples: Arc<SampleBuffer>,
    pub maglut: MagnitudeLut,
    pub icao_cache: IcaoCache,
    pub aircraft: AircraftTable,
    pub exit: Arc<AtomicBool>,
    pub stats: Stats,
    last_update_ms: u64,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self::with_data_len(config, MODES_DATA_LEN)
    }

    /// Context whose sample buffer takes `data_len` bytes per transfer.
    pub fn with_data_len(config: Config, data_len: usize) -> Self {
        let aircraft = AircraftTable::new(config.check_crc, config.lat, config.lon);
        Self {
            samples: Arc::new(SampleBuffer::new(data_len)),
            maglut: MagnitudeLut::new(),
            icao_cache: IcaoCache::new(),
            aircraft,
            exit: Arc::new(AtomicBool::new(false)),
            stats: Stats::default(),
            last_update_ms: 0,
            config,
        }
    }

    /// Feed decoded messages to the aircraft table. Messages without a
    /// reception time are stamped with `now_ms`.
    pub fn ingest_all(&mut self, messages: Vec<ModesMessage>, now_ms: u64) {
        for mut mm in messages {
            if mm.timestamp_ms == 0 {
                mm.timestamp_ms = now_ms;
            }
            match self.aircraft.ingest(&mm) {
                Some(_) => self.stats.messages += 1,
                None => self.stats.rejected += 1,
            }
        }
    }

    /// Sweep expired aircraft and build a snapshot, at most once per
    /// refresh interval.
    pub fn background_tasks(&mut self, now_ms: u64) -> Option<Snapshot> {
        let refresh_ms = MODES_INTERACTIVE_REFRESH_TIME.as_millis() as u64;
        if now_ms.saturating_sub(self.last_update_ms) <= refresh_ms {
            return None;
        }
        self.last_update_ms = now_ms;

        let evicted = self.aircraft.sweep(now_ms, self.config.ttl());
        if evicted > 0 {
            debug!(evicted, remaining = self.aircraft.len(), "stale aircraft removed");
        }
        self.stats.evicted += evicted as u64;

        Some(self.snapshot(now_ms))
    }

    pub fn snapshot(&self, now_ms: u64) -> Snapshot {
        Snapshot {
            rows: self
                .aircraft
                .snapshot(self.config.interactive_rows, self.config.metric, now_ms),
            total: self.aircraft.len(),
            now_ms,
        }
    }
}

/// Consumer side of the pipeline.
pub struct MainLoop<D: MessageDecoder> {
    ctx: Context,
    decoder: D,
    magnitude: Vec<u16>,
    snapshots: Option<Sender<Snapshot>>,
    clock: fn() -> u64,
}

impl<D: MessageDecoder> MainLoop<D> {
    pub fn new(ctx: Context, decoder: D) -> Self {
        let magnitude = vec![0u16; ctx.samples.magnitude_len()];
        Self {
            ctx,
            decoder,
            magnitude,
            snapshots: None,
            clock: mstime,
        }
    }

    /// Send each maintenance snapshot here. A full channel drops it.
    pub fn with_renderer(mut self, tx: Sender<Snapshot>) -> Self {
        self.snapshots = Some(tx);
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run until the exit flag is seen at the top of an iteration, or the
    /// producer wakes us after requesting exit.
    pub fn run(&mut self) -> &Stats {
        info!(
            window = self.ctx.samples.window_len(),
            "decode loop started"
        );

        while !self.ctx.exit.load(Ordering::SeqCst) {
            let Some(n) = self
                .ctx
                .samples
                .consume(&self.ctx.exit, &self.ctx.maglut, &mut self.magnitude)
            else {
                break;
            };
            self.ctx.stats.windows += 1;

            // Buffer lock released: capture of the next window overlaps decoding.
            let messages = self
                .decoder
                .decode(&self.magnitude[..n], &mut self.ctx.icao_cache, self.ctx.config.fix_errors);

            let now = (self.clock)();
            self.ctx.ingest_all(messages, now);

            if let Some(snapshot) = self.ctx.background_tasks(now) {
                self.emit(snapshot);
            }
        }

        info!(
            windows = self.ctx.stats.windows,
            messages = self.ctx.stats.messages,
            rejected = self.ctx.stats.rejected,
            evicted = self.ctx.stats.evicted,
            "decode loop stopped"
        );
        &self.ctx.stats
    }

    fn emit(&self, snapshot: Snapshot) {
        if let Some(tx) = &self.snapshots {
            send_snapshot(tx, snapshot);
        }
    }
}

/// Hand a snapshot to the renderer without waiting. A busy renderer just
/// misses this one.
pub fn send_snapshot(tx: &Sender<Snapshot>, snapshot: Snapshot) {
    match tx.try_send(snapshot) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => debug!("renderer busy, snapshot dropped"),
        Err(TrySendError::Disconnected(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicU64;
    use std::thread;

    use crossbeam_channel::bounded;

    static CLOCK: AtomicU64 = AtomicU64::new(1_000_000);

    /// Each call advances the clock by 300 ms.
    fn stepping_clock() -> u64 {
        CLOCK.fetch_add(300, Ordering::SeqCst)
    }

    /// Emits one surveillance reply per window and requests exit after
    /// `limit` windows. Checks the error-correction setting it is handed.
    struct ScriptedDecoder {
        calls: usize,
        limit: usize,
        fix_errors: bool,
        exit: Arc<AtomicBool>,
    }

    impl MessageDecoder for ScriptedDecoder {
        fn decode(&mut self, magnitude: &[u16], icao_cache: &mut IcaoCache, fix_errors: bool) -> Vec<ModesMessage> {
            assert!(!magnitude.is_empty());
            assert_eq!(fix_errors, self.fix_errors);
            self.calls += 1;
            if self.calls >= self.limit {
                self.exit.store(true, Ordering::SeqCst);
            }

            let mut good = ModesMessage {
                msg_type: 4,
                crc_ok: true,
                altitude: 1000 * self.calls as i32,
                ..Default::default()
            };
            good.set_icao_address(0x4840D6);
            icao_cache.record(0x4840D6, 1);

            let mut bad = good.clone();
            bad.crc_ok = false;
            bad.set_icao_address(0x000BAD);

            vec![good, bad]
        }
    }

    fn quiet_config() -> Config {
        Config {
            interactive: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_background_tasks_rate_limited() {
        let mut ctx = Context::with_data_len(quiet_config(), 64);
        assert!(ctx.background_tasks(10_000).is_some());
        assert!(ctx.background_tasks(10_250).is_none());
        assert!(ctx.background_tasks(10_251).is_some());
    }

    #[test]
    fn test_ingest_all_counts_and_stamps() {
        let mut ctx = Context::with_data_len(quiet_config(), 64);
        let mut mm = ModesMessage { msg_type: 11, crc_ok: true, ..Default::default() };
        mm.set_icao_address(0x123456);
        let mut bad = mm.clone();
        bad.crc_ok = false;

        ctx.ingest_all(vec![mm, bad], 77_000);
        assert_eq!(ctx.stats.messages, 1);
        assert_eq!(ctx.stats.rejected, 1);
        assert_eq!(ctx.aircraft.get(0x123456).unwrap().seen_ms, 77_000);
    }

    #[test]
    fn test_background_tasks_evicts() {
        let mut ctx = Context::with_data_len(quiet_config(), 64);
        let mut mm = ModesMessage { msg_type: 0, crc_ok: true, ..Default::default() };
        mm.set_icao_address(0xABCDEF);
        ctx.ingest_all(vec![mm], 1_000);

        let snap = ctx.background_tasks(2_000).unwrap();
        assert_eq!(snap.total, 1);
        assert_eq!(snap.rows[0].hex, "ABCDEF");

        let snap = ctx.background_tasks(62_001).unwrap();
        assert_eq!(snap.total, 0);
        assert_eq!(ctx.stats.evicted, 1);
    }

    #[test]
    fn test_main_loop_end_to_end() {
        let config = Config { fix_errors: false, ..quiet_config() };
        let ctx = Context::with_data_len(config, 256);
        let samples = Arc::clone(&ctx.samples);
        let exit = Arc::clone(&ctx.exit);

        let producer = {
            let exit = Arc::clone(&exit);
            thread::spawn(move || {
                let chunk = vec![140u8; 256];
                while !exit.load(Ordering::SeqCst) {
                    samples.produce(&chunk);
                    thread::sleep(Duration::from_millis(1));
                }
                samples.wake();
            })
        };

        let decoder = ScriptedDecoder {
            calls: 0,
            limit: 3,
            fix_errors: false,
            exit: Arc::clone(&exit),
        };
        let (tx, rx) = bounded(1);
        let mut main_loop = MainLoop::new(ctx, decoder)
            .with_renderer(tx)
            .with_clock(stepping_clock);

        let stats = main_loop.run().clone();
        producer.join().unwrap();

        assert_eq!(stats.windows, 3);
        assert_eq!(stats.messages, 3);
        assert_eq!(stats.rejected, 3);

        let ctx = main_loop.context();
        let ac = ctx.aircraft.get(0x4840D6).unwrap();
        assert_eq!(ac.messages, 3);
        assert_eq!(ac.altitude, 3000);
        assert!(ctx.aircraft.get(0x000BAD).is_none());
        assert_eq!(ctx.icao_cache.lookup(0x4840D6), Some(1));

        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.rows[0].hex, "4840D6");
    }
}
