//! Configuration and command-line argument parsing

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Where raw I/Q samples come from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Spawn `rtl_sdr` and read its stdout
    RtlSdr,
    /// Read a capture file; "-" is stdin
    File(String),
    /// Skip acquisition and replay decoded-message fixtures
    Replay(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    // Device settings
    pub dev_index: u32,
    /// Gain in tenths of dB; negative selects automatic gain
    pub gain: i32,
    pub freq: u32,

    pub source: Source,

    // Processing
    pub fix_errors: bool,
    pub check_crc: bool,

    // Output
    pub metric: bool,
    pub interactive: bool,
    pub json: bool,
    pub interactive_rows: usize,
    pub interactive_ttl: u64,

    // Receiver position (for distance calculation)
    pub lat: f64,
    pub lon: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dev_index: 0,
            gain: 999999, // Max gain
            freq: 1_090_000_000,
            source: Source::RtlSdr,
            fix_errors: true,
            check_crc: true,
            metric: false,
            interactive: true,
            json: false,
            interactive_rows: 15,
            interactive_ttl: 60,
            lat: 0.0,
            lon: 0.0,
        }
    }
}

impl Config {
    /// Parse the process arguments. `--help` prints usage and exits.
    pub fn from_args() -> Result<Self> {
        let args: Vec<String> = env::args().skip(1).collect();
        match Self::parse(&args) {
            Ok(Some(config)) => Ok(config),
            Ok(None) => {
                print_help();
                std::process::exit(0);
            }
            Err(e) => {
                print_help();
                Err(e)
            }
        }
    }

    /// Parse an argument list (without the program name). `Ok(None)` means
    /// help was requested.
    pub fn parse(args: &[String]) -> Result<Option<Self>> {
        let mut config = Config::default();

        let mut i = 0;
        while i < args.len() {
            let opt = args[i].as_str();
            match opt {
                "--device-index" => config.dev_index = value(args, &mut i)?,
                "--gain" => {
                    let db: f64 = value(args, &mut i)?;
                    config.gain = (db * 10.0) as i32;
                }
                "--freq" => config.freq = value(args, &mut i)?,
                "--ifile" => config.source = Source::File(value(args, &mut i)?),
                "--replay" => config.source = Source::Replay(value(args, &mut i)?),
                "--no-fix" => config.fix_errors = false,
                "--no-crc-check" => config.check_crc = false,
                "--metric" => config.metric = true,
                "--imperial" => config.metric = false,
                "--interactive" => config.interactive = true,
                "--no-interactive" => config.interactive = false,
                "--json" => config.json = true,
                "--interactive-rows" => config.interactive_rows = value(args, &mut i)?,
                "--interactive-ttl" => config.interactive_ttl = value(args, &mut i)?,
                "--lat" => config.lat = value(args, &mut i)?,
                "--lon" => config.lon = value(args, &mut i)?,
                "--help" => return Ok(None),
                _ => return Err(Error::Config(format!("unknown option '{}'", opt))),
            }
            i += 1;
        }

        Ok(Some(config))
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.interactive_ttl)
    }
}

/// Consume and parse the value following the option at `args[*i]`.
fn value<T: std::str::FromStr>(args: &[String], i: &mut usize) -> Result<T> {
    let opt = &args[*i];
    *i += 1;
    let raw = args
        .get(*i)
        .ok_or_else(|| Error::Config(format!("missing value for '{}'", opt)))?;
    raw.parse()
        .map_err(|_| Error::Config(format!("invalid value '{}' for '{}'", raw, opt)))
}

fn print_help() {
    println!(
        r#"mode1090-rs - Mode S aircraft tracker for RTL-SDR devices

Usage: mode1090-rs [OPTIONS]

Options:
  --device-index <N>     Select RTL device (default: 0)
  --gain <db>            Set gain (default: max. Use -10 for auto-gain)
  --freq <hz>            Set frequency (default: 1090 MHz)
  --ifile <filename>     Read data from file (use '-' for stdin)
  --replay <filename>    Replay decoded messages (JSON lines) instead of samples
  --interactive          Refresh the aircraft table on screen (default)
  --no-interactive       Log only, no screen refresh
  --json                 Print each refresh as a JSON line
  --interactive-rows <N> Max rows in interactive mode (default: 15)
  --interactive-ttl <s>  Remove from list if idle for <s> seconds (default: 60)
  --no-fix               Disable single-bit error correction
  --no-crc-check         Disable CRC check (discouraged)
  --metric               Use metric units
  --imperial             Use imperial units (default)
  --lat <degrees>        Receiver latitude for distance calculation
  --lon <degrees>        Receiver longitude for distance calculation
  --help                 Show this help
"#
    );
}
