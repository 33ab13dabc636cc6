//! Sample acquisition thread
//!
//! Reads fixed-size transfers from the sample source and hands each one to
//! the sample buffer, the way the receiver driver's async callback does.
//! A live receiver is never paused: if decoding falls behind, windows are
//! overwritten. File input is read in lockstep with the decoder instead.

use std::fs::File;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::config::{Config, Source};
use crate::error::{Error, Result};
use crate::sample_buffer::SampleBuffer;

const MODES_DEFAULT_RATE: u32 = 2_000_000;

/// Gain value meaning "use the highest gain the tuner offers".
const MODES_MAX_GAIN: i32 = 999999;

/// An opened sample source.
pub struct SampleSource {
    reader: Box<dyn Read + Send>,
    /// `rtl_sdr` process feeding `reader`, when capturing live
    child: Option<Child>,
    /// Whether the producer may wait for the decoder
    lockstep: bool,
}

impl SampleSource {
    /// Open the source named by the configuration. Failure here is fatal
    /// to startup.
    pub fn open(config: &Config) -> Result<Self> {
        match &config.source {
            Source::File(name) if name == "-" => Ok(Self::from_reader(io::stdin(), true)),
            Source::File(name) => {
                let file = File::open(name)
                    .map_err(|e| Error::Device(format!("cannot open '{}': {}", name, e)))?;
                Ok(Self::from_reader(file, true))
            }
            Source::RtlSdr => spawn_rtl_sdr(config),
            Source::Replay(_) => Err(Error::Device("replay input carries no samples".into())),
        }
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R, lockstep: bool) -> Self {
        Self {
            reader: Box::new(reader),
            child: None,
            lockstep,
        }
    }
}

fn spawn_rtl_sdr(config: &Config) -> Result<SampleSource> {
    let mut cmd = Command::new("rtl_sdr");
    cmd.arg("-d")
        .arg(config.dev_index.to_string())
        .arg("-f")
        .arg(config.freq.to_string())
        .arg("-s")
        .arg(MODES_DEFAULT_RATE.to_string());

    // rtl_sdr picks automatic gain when -g is absent or 0.
    if config.gain >= 0 && config.gain != MODES_MAX_GAIN {
        cmd.arg("-g").arg(format!("{:.1}", config.gain as f64 / 10.0));
    } else if config.gain == MODES_MAX_GAIN {
        cmd.arg("-g").arg("49.6");
    }

    cmd.arg("-").stdout(Stdio::piped()).stderr(Stdio::null());

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Device(format!("cannot start rtl_sdr: {}", e)))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Device("rtl_sdr stdout unavailable".into()))?;

    info!(device = config.dev_index, freq = config.freq, "rtl_sdr started");
    Ok(SampleSource {
        reader: Box::new(stdout),
        child: Some(child),
        lockstep: false,
    })
}

/// Running producer thread.
pub struct Acquisition {
    handle: JoinHandle<u64>,
    child: Option<Child>,
}

impl Acquisition {
    /// Start the producer. It delivers `transfer_len` bytes per call to
    /// [`SampleBuffer::produce`] until the source is exhausted or `exit` is
    /// set; on EOF it raises `exit` itself and wakes the consumer.
    pub fn start(
        source: SampleSource,
        samples: Arc<SampleBuffer>,
        exit: Arc<AtomicBool>,
        transfer_len: usize,
    ) -> Result<Self> {
        let SampleSource { reader, child, lockstep } = source;

        let handle = thread::Builder::new()
            .name("sample-reader".to_string())
            .spawn(move || run_reader(reader, &samples, &exit, transfer_len, lockstep))?;

        Ok(Self { handle, child })
    }

    /// Stop the receiver process (if any) and collect the producer's count
    /// of overwritten windows.
    pub fn stop(mut self) -> u64 {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
        match self.handle.join() {
            Ok(dropped) => dropped,
            Err(_) => {
                warn!("sample reader thread panicked");
                0
            }
        }
    }
}

fn run_reader(
    mut reader: Box<dyn Read + Send>,
    samples: &SampleBuffer,
    exit: &AtomicBool,
    transfer_len: usize,
    lockstep: bool,
) -> u64 {
    let mut transfer = vec![0u8; transfer_len];
    let mut dropped = 0u64;

    while !exit.load(Ordering::SeqCst) {
        if lockstep && !samples.wait_consumed(exit) {
            break;
        }

        let filled = match read_transfer(&mut reader, &mut transfer) {
            Ok(n) => n,
            Err(e) => {
                warn!("sample source read failed: {}", e);
                0
            }
        };
        if filled == 0 {
            break;
        }

        if samples.produce(&transfer[..filled]) {
            dropped += 1;
            debug!(dropped, "decoder behind, window overwritten");
        }
        if filled < transfer_len {
            break;
        }
    }

    if lockstep {
        samples.wait_consumed(exit);
    }
    info!(dropped, "sample source finished");
    exit.store(true, Ordering::SeqCst);
    samples.wake();
    dropped
}

/// Fill `buf` as far as the source allows. Returns bytes read; less than
/// `buf.len()` only at end of input.
fn read_transfer(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use crate::magnitude::MagnitudeLut;

    /// Hands out at most `step` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_read_transfer_reassembles_short_reads() {
        let mut src = Trickle { data: (0..100u8).collect(), pos: 0, step: 7 };
        let mut buf = [0u8; 40];
        assert_eq!(read_transfer(&mut src, &mut buf).unwrap(), 40);
        assert_eq!(buf[39], 39);

        let mut big = [0u8; 100];
        assert_eq!(read_transfer(&mut src, &mut big).unwrap(), 60);
        assert_eq!(read_transfer(&mut src, &mut big).unwrap(), 0);
    }

    #[test]
    fn test_file_source_delivers_every_transfer() {
        let samples = Arc::new(SampleBuffer::new(32));
        let exit = Arc::new(AtomicBool::new(false));

        // Three full transfers of increasing signal, then a partial one.
        let mut data = Vec::new();
        for n in 1..=3u8 {
            data.extend(std::iter::repeat(127 + n).take(32));
        }
        data.extend(std::iter::repeat(127 + 4).take(10));

        let source = SampleSource::from_reader(Cursor::new(data), true);
        let acq = Acquisition::start(source, Arc::clone(&samples), Arc::clone(&exit), 32).unwrap();

        let lut = MagnitudeLut::new();
        let mut mag = vec![0u16; samples.magnitude_len()];
        let mut windows = 0;
        while samples.consume(&exit, &lut, &mut mag).is_some() {
            windows += 1;
        }

        assert_eq!(acq.stop(), 0);
        assert_eq!(windows, 4);
        assert!(exit.load(Ordering::SeqCst));
    }

    #[test]
    fn test_replay_is_not_a_sample_source() {
        let config = Config {
            source: Source::Replay("x.jsonl".into()),
            ..Default::default()
        };
        assert!(matches!(SampleSource::open(&config), Err(Error::Device(_))));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let config = Config {
            source: Source::File("/nonexistent/capture.bin".into()),
            ..Default::default()
        };
        assert!(matches!(SampleSource::open(&config), Err(Error::Device(_))));
    }
}
