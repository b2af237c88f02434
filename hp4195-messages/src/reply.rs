use crate::{Channel, Dbm, MachineValues, Trace};

/// Acknowledgement sent once per command, in command order.
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    Ok,
    Failed(Failure),
}

impl Ack {
    pub fn is_ok(&self) -> bool {
        matches!(self, Ack::Ok)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Ack::Ok => None,
            Ack::Failed(failure) => Some(failure),
        }
    }
}

impl From<bool> for Ack {
    fn from(ok: bool) -> Self {
        if ok { Ack::Ok } else { Ack::Failed(Failure::Unspecified) }
    }
}

impl From<Ack> for bool {
    fn from(ack: Ack) -> Self {
        ack.is_ok()
    }
}

/// Why a command failed. Detail beyond the kind stays in the worker's log.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// Open, write or query on the instrument bus failed.
    Transport,
    /// A command needed the instrument but no session is open.
    NotConnected,
    /// Connected, but the identity string did not contain the expected tag.
    IdentityMismatch,
    ChannelQueryFailed(Channel),
    LengthMismatch,
    /// Writing a sweep step to disk failed.
    Persistence,
    InvalidParameters,
    /// The sweep was stopped through the cancel token.
    Cancelled,
    /// A handler panicked.
    Internal,
    Unspecified,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => f.write_str("transport error"),
            Self::NotConnected => f.write_str("not connected"),
            Self::IdentityMismatch => f.write_str("identity mismatch"),
            Self::ChannelQueryFailed(channel) => write!(f, "{channel} query failed"),
            Self::LengthMismatch => f.write_str("channel length mismatch"),
            Self::Persistence => f.write_str("could not persist sweep step"),
            Self::InvalidParameters => f.write_str("invalid parameters"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Internal => f.write_str("internal worker error"),
            Self::Unspecified => f.write_str("failed"),
        }
    }
}

/// Payloads sent from the worker to the controller on the data channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// A complete, length-checked trace (`StartAcquisition`, `LowResSweep`).
    Trace(Trace),
    /// Instrument response to `SendRaw`, or the `"Query failed"` /
    /// `"Not connected"` sentinel.
    RawResponse(String),
    /// One completed amplitude-sweep step, for live display.
    SweepStep {
        frequency: Vec<f64>,
        magnitude: Vec<f64>,
        amplitude: Dbm,
    },
    MachineValues(MachineValues),
}

/// Sentinel sent for `SendRaw` when the query itself failed.
pub const QUERY_FAILED: &str = "Query failed";
/// Sentinel sent for `SendRaw` when no session is open.
pub const NOT_CONNECTED: &str = "Not connected";
