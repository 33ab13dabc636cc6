//!   mode1090-rs:   Mode S / ADS-B aircraft tracker for RTL-SDR devices
//!
//!  One thread reads I/Q samples into a single-slot buffer, the main thread
//!  turns each window into magnitudes, decodes messages and keeps the
//!  aircraft table current.
//!

mod acquisition;
mod aircraft;
mod config;
mod cpr;
mod error;
mod icao_cache;
mod interactive;
mod magnitude;
mod message;
mod pipeline;
mod replay;
mod sample_buffer;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::acquisition::{Acquisition, SampleSource};
use crate::config::{Config, Source};
use crate::error::Result;
use crate::interactive::Renderer;
use crate::message::NullDecoder;
use crate::pipeline::{Context, MainLoop, Snapshot};
use crate::sample_buffer::{MODES_DATA_LEN, SampleBuffer};

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_args()?;

    // The table owns the terminal; keep logs to warnings unless asked.
    let default_level = if config.interactive && !config.json { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!(
        source = ?config.source,
        fix_errors = config.fix_errors,
        check_crc = config.check_crc,
        "mode1090-rs starting"
    );

    let ctx = Context::new(config.clone());
    watch_interrupt(Arc::clone(&ctx.exit), Arc::clone(&ctx.samples))?;

    let (renderer_tx, renderer) = if config.interactive || config.json {
        let (tx, rx) = bounded(1);
        (Some(tx), Some(Renderer::new(&config).spawn(rx)?))
    } else {
        (None, None)
    };

    let result = match &config.source {
        Source::Replay(path) => run_replay(ctx, path, renderer_tx),
        _ => run_live(ctx, renderer_tx),
    };

    if let Some(handle) = renderer {
        join_logged(handle, "renderer");
    }
    if let Err(e) = &result {
        error!("{}", e);
    }
    result.map_err(Into::into)
}

/// Join a helper thread, reporting a panic instead of dropping it.
fn join_logged(handle: JoinHandle<()>, name: &str) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(_) => {
            warn!("{} thread panicked", name);
            false
        }
    }
}

/// Raise the exit flag on Ctrl+C and wake whoever is waiting on samples.
fn watch_interrupt(exit: Arc<AtomicBool>, samples: Arc<SampleBuffer>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            rt.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("interrupt received, shutting down");
                        exit.store(true, Ordering::SeqCst);
                        samples.wake();
                    }
                    Err(e) => warn!("cannot listen for Ctrl+C: {}", e),
                }
            });
        })?;
    Ok(())
}

fn run_live(ctx: Context, renderer: Option<Sender<Snapshot>>) -> Result<()> {
    let source = SampleSource::open(&ctx.config)?;
    let exit = Arc::clone(&ctx.exit);
    let samples = Arc::clone(&ctx.samples);
    let acquisition = Acquisition::start(source, Arc::clone(&samples), Arc::clone(&exit), MODES_DATA_LEN)?;

    warn!("no demodulator linked in; windows are converted to magnitudes but yield no messages");

    let mut main_loop = MainLoop::new(ctx, NullDecoder);
    if let Some(tx) = renderer {
        main_loop = main_loop.with_renderer(tx);
    }
    let stats = main_loop.run().clone();
    drop(main_loop);

    exit.store(true, Ordering::SeqCst);
    samples.wake();
    let dropped = acquisition.stop();

    info!(
        windows = stats.windows,
        dropped,
        messages = stats.messages,
        "shutdown complete"
    );
    Ok(())
}

fn run_replay(mut ctx: Context, path: &str, renderer: Option<Sender<Snapshot>>) -> Result<()> {
    let snapshot = replay::replay_file(&mut ctx, path, renderer.as_ref())?;
    let tracked = snapshot.total;

    match renderer {
        // Last state is always drawn, even if the renderer was busy.
        Some(tx) => {
            let _ = tx.send(snapshot);
        }
        None => {
            for row in &snapshot.rows {
                info!(
                    hex = %row.hex,
                    flight = %row.flight,
                    altitude = row.altitude,
                    speed = row.speed,
                    lat = row.lat,
                    lon = row.lon,
                    messages = row.messages,
                    "aircraft"
                );
            }
        }
    }

    info!(
        tracked,
        messages = ctx.stats.messages,
        rejected = ctx.stats.rejected,
        "replay complete"
    );
    Ok(())
}
