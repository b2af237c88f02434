//! HP4195A command grammar.
//!
//! Settings are written as `<NAME> = <value> <UNIT>`, queries end in `?`.
//! The grammar is fixed by the instrument firmware.

use std::fmt;

use hp4195_messages::{Channel, Dbm, Hertz};

/// Write-only instrument commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    /// Command: `CENTER = <hz> HZ`
    Center(Hertz),
    /// Command: `SPAN = <hz> HZ`
    Span(Hertz),
    /// Command: `START = <hz> HZ`
    Start(Hertz),
    /// Command: `STOP = <hz> HZ`
    Stop(Hertz),
    /// Resolution bandwidth. Command: `RBW = <hz> HZ`
    Rbw(Hertz),
    /// Oscillator 1 output level. Command: `OSC1 = <dbm> DBM`
    Osc1(Dbm),
    /// Single sweep mode. Command: `SWM2`
    SingleSweepMode,
    /// Start a sweep. Command: `SWTRG`
    Trigger,
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Center(hz) => write!(f, "CENTER = {} HZ", hz.0),
            Self::Span(hz) => write!(f, "SPAN = {} HZ", hz.0),
            Self::Start(hz) => write!(f, "START = {} HZ", hz.0),
            Self::Stop(hz) => write!(f, "STOP = {} HZ", hz.0),
            Self::Rbw(hz) => write!(f, "RBW = {} HZ", hz.0),
            Self::Osc1(dbm) => write!(f, "OSC1 = {} DBM", dbm.0),
            Self::SingleSweepMode => f.write_str("SWM2"),
            Self::Trigger => f.write_str("SWTRG"),
        }
    }
}

/// Instrument queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Identity,
    /// Channel A trace: magnitude.
    Magnitude,
    /// Channel B trace: phase.
    Phase,
    /// X axis: frequency.
    Frequency,
    Center,
    Span,
    Start,
    Stop,
    Rbw,
    Osc1,
}

impl Query {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "ID?",
            Self::Magnitude => "A?",
            Self::Phase => "B?",
            Self::Frequency => "X?",
            Self::Center => "CENTER?",
            Self::Span => "SPAN?",
            Self::Start => "START?",
            Self::Stop => "STOP?",
            Self::Rbw => "RBW?",
            Self::Osc1 => "OSC1?",
        }
    }

    pub fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::Magnitude => Self::Magnitude,
            Channel::Phase => Self::Phase,
            Channel::Frequency => Self::Frequency,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pull the number out of a settings reply such as `1000000`, `CENTER = 1.0E+06 HZ`
/// or ` -10 DBM`.
pub fn parse_setting_value(response: &str) -> Option<f64> {
    let value = response.rsplit('=').next()?.trim();
    value.split_whitespace().next()?.parse().ok()
}
