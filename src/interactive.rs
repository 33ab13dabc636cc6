//! Aircraft list rendering
//!
//! Runs on its own thread and draws whatever snapshot the decode loop last
//! handed over, so slow terminal output never stalls decoding.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::warn;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::Snapshot;

const BOLD: &str = "\x1B[1m";
const RESET: &str = "\x1B[0m";
const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Redraw a table in place
    Table,
    /// One JSON document per snapshot
    Json,
}

pub struct Renderer {
    mode: OutputMode,
    metric: bool,
    has_position: bool,
    frame: usize,
}

impl Renderer {
    pub fn new(config: &Config) -> Self {
        Self {
            mode: if config.json { OutputMode::Json } else { OutputMode::Table },
            metric: config.metric,
            has_position: config.lat != 0.0 || config.lon != 0.0,
            frame: 0,
        }
    }

    /// Draw snapshots until the decode loop drops its sender.
    pub fn spawn(mut self, rx: Receiver<Snapshot>) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("renderer".to_string())
            .spawn(move || {
                let stdout = io::stdout();
                while let Ok(snapshot) = rx.recv() {
                    let out = self.render(&snapshot);
                    let mut lock = stdout.lock();
                    if lock.write_all(out.as_bytes()).and_then(|_| lock.flush()).is_err() {
                        warn!("stdout closed, renderer stopping");
                        break;
                    }
                }
            })?;
        Ok(handle)
    }

    pub fn render(&mut self, snapshot: &Snapshot) -> String {
        self.frame = self.frame.wrapping_add(1);
        match self.mode {
            OutputMode::Table => self.render_table(snapshot),
            OutputMode::Json => match serde_json::to_string(snapshot) {
                Ok(line) => line + "\n",
                Err(e) => {
                    warn!("snapshot not serializable: {}", e);
                    String::new()
                }
            },
        }
    }

    fn render_table(&self, snapshot: &Snapshot) -> String {
        let mut out = String::new();
        let width = if self.has_position { 78 } else { 72 };

        // Cursor home, then clear screen
        out.push_str("\x1B[H\x1B[2J");
        let _ = writeln!(
            out,
            "{BOLD}{:<6} {:<8} {:>9} {:>7} {:>8} {:>9} {:>7} {:>5} {:>9} {:>4}{RESET}",
            "Hex",
            "Flight",
            "Altitude",
            "Speed",
            "Lat",
            "Lon",
            if self.has_position { "Dst" } else { "" },
            "Track",
            "Messages",
            "Seen"
        );
        let _ = writeln!(out, "{}", "-".repeat(width));

        for row in &snapshot.rows {
            let dist = if self.has_position && row.distance > 0.0 {
                format!("{:.1}", row.distance)
            } else {
                String::new()
            };
            let _ = writeln!(
                out,
                "{:<6} {:<8} {:>9} {:>7} {:>8.3} {:>9.3} {:>7} {:>5} {:>9} {:>3} sec",
                row.hex,
                row.flight,
                row.altitude,
                row.speed,
                row.lat,
                row.lon,
                dist,
                row.track,
                row.messages,
                row.seen_secs
            );
        }

        let _ = writeln!(out, "{}", "-".repeat(width));
        let _ = writeln!(
            out,
            "Aircraft: {} ({} shown) | {} | Ctrl+C to exit {}",
            snapshot.total,
            snapshot.rows.len(),
            if self.metric { "Metric" } else { "Imperial" },
            SPINNER[self.frame % SPINNER.len()]
        );
        out
    }
}
