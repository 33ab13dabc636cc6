//! Replay of decoded messages
//!
//! Feeds a JSON-lines file of [`ModesMessage`] records straight into the
//! aircraft table, bypassing acquisition and demodulation. Each record's
//! `timestamp_ms` drives the clock, so expiry behaves as it did live.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::atomic::Ordering;

use crossbeam_channel::Sender;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::message::ModesMessage;
use crate::pipeline::{Context, Snapshot, mstime, send_snapshot};

pub fn replay_file(ctx: &mut Context, path: &str, renderer: Option<&Sender<Snapshot>>) -> Result<Snapshot> {
    let file = File::open(path)?;
    info!(path, "replaying decoded messages");
    replay(ctx, BufReader::new(file), renderer)
}

/// Ingest every record from `reader`. Blank lines and lines starting with
/// `#` are skipped. A record without a timestamp inherits the previous
/// one's. Returns the table as it stands after the last record.
pub fn replay<R: BufRead>(
    ctx: &mut Context,
    reader: R,
    renderer: Option<&Sender<Snapshot>>,
) -> Result<Snapshot> {
    let mut now_ms = mstime();
    let mut records = 0u64;

    for (idx, line) in reader.lines().enumerate() {
        if ctx.exit.load(Ordering::SeqCst) {
            break;
        }
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut mm: ModesMessage = serde_json::from_str(line)
            .map_err(|source| Error::Replay { line: idx + 1, source })?;
        if mm.timestamp_ms == 0 {
            mm.timestamp_ms = now_ms;
        }
        now_ms = mm.timestamp_ms;
        records += 1;

        ctx.ingest_all(vec![mm], now_ms);
        if let Some(snapshot) = ctx.background_tasks(now_ms) {
            if let Some(tx) = renderer {
                send_snapshot(tx, snapshot);
            }
        }
    }

    debug!(records, tracked = ctx.aircraft.len(), "replay finished");
    Ok(ctx.snapshot(now_ms))
}
