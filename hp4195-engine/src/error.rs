//! Error taxonomy of the worker.
//!
//! Nothing here crosses the channel boundary: the dispatcher logs the error
//! and reduces it to a [`Failure`] kind on the acknowledgement.

use std::path::PathBuf;
use std::time::Duration;

use hp4195_messages::{Channel, Failure, InvalidSweep, LengthMismatch};
use thiserror::Error;

/// Failures of the instrument bus.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open '{resource}': {reason}")]
    Open { resource: String, reason: String },
    #[error("bus I/O error: {0}")]
    Io(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("not connected to an instrument")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("{channel} query failed: {reason}")]
    ChannelQueryFailed { channel: Channel, reason: String },
    #[error(transparent)]
    LengthMismatch(#[from] LengthMismatch),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("device identity mismatch: expected '{expected}', got '{actual}'")]
    IdentityMismatch { expected: String, actual: String },
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error("could not write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid sweep: {0}")]
    InvalidSweep(#[from] InvalidSweep),
    #[error("start frequency {start} Hz must be below stop frequency {stop} Hz")]
    InvalidFrequencyRange { start: f64, stop: f64 },
    #[error("setting value {0} is not finite")]
    NonFinite(f64),
    #[error("sweep cancelled after {completed} step(s)")]
    Cancelled { completed: usize },
}

impl WorkerError {
    /// Failure kind reported on the acknowledgement channel.
    pub fn failure(&self) -> Failure {
        match self {
            Self::Transport(TransportError::NotConnected) => Failure::NotConnected,
            Self::Transport(_) => Failure::Transport,
            Self::IdentityMismatch { .. } => Failure::IdentityMismatch,
            Self::Acquisition(AcquisitionError::ChannelQueryFailed { channel, .. }) => {
                Failure::ChannelQueryFailed(*channel)
            }
            Self::Acquisition(AcquisitionError::LengthMismatch(_)) => Failure::LengthMismatch,
            Self::Persistence { .. } => Failure::Persistence,
            Self::InvalidSweep(_) | Self::InvalidFrequencyRange { .. } | Self::NonFinite(_) => {
                Failure::InvalidParameters
            }
            Self::Cancelled { .. } => Failure::Cancelled,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
