//! Error type shared by the binary's startup and replay paths

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The sample source could not be opened or spawned.
    #[error("acquisition device error: {0}")]
    Device(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("replay line {line}: {source}")]
    Replay {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
