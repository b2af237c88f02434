use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::{Dbm, Hertz};

/// Commands sent from the controller to the worker.
///
/// Every parameterised command carries its full payload in the same message,
/// so a single dropped message can never shift the meaning of the next one.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open the instrument and verify its identity.
    Connect,
    /// Close the instrument. Safe to send while disconnected.
    Disconnect,
    /// Read magnitude, phase and frequency from the last sweep.
    StartAcquisition,
    SetCenterAndSpan { center: Hertz, span: Hertz },
    SetStartStop { start: Hertz, stop: Hertz },
    SetCenterFrequency { freq: Hertz },
    /// Send an arbitrary query and return the raw response on the data channel.
    SendRaw { text: String },
    /// Single sweep at the low-resolution bandwidth, then restore the normal one.
    LowResSweep,
    /// Step the oscillator amplitude, sweeping and persisting once per step.
    AmplitudeSweep(SweepParams),
    /// Read back the analyzer's current settings.
    QueryMachineValues,
    /// Write any subset of the editable analyzer settings.
    ApplyMachineSettings(MachineSettings),
    /// Disconnect and stop the worker loop.
    Shutdown,
}

impl Command {
    /// Short tag used in logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::StartAcquisition => "start_acquisition",
            Self::SetCenterAndSpan { .. } => "set_center_and_span",
            Self::SetStartStop { .. } => "set_start_stop",
            Self::SetCenterFrequency { .. } => "set_center_frequency",
            Self::SendRaw { .. } => "send_raw",
            Self::LowResSweep => "low_res_sweep",
            Self::AmplitudeSweep(_) => "amplitude_sweep",
            Self::QueryMachineValues => "query_machine_values",
            Self::ApplyMachineSettings(_) => "apply_machine_settings",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Parameters of an amplitude sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepParams {
    pub start: Dbm,
    pub stop: Dbm,
    pub step: Dbm,
    /// Resolution bandwidth used for every step.
    pub resolution: Hertz,
    /// Existing directory that receives one CSV file per step.
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidSweep {
    #[error("sweep bounds must be finite")]
    NotFinite,
    #[error("amplitude step must be positive, got {0}")]
    NonPositiveStep(f64),
    #[error("start amplitude {start} is above stop amplitude {stop}")]
    Reversed { start: f64, stop: f64 },
    #[error("resolution bandwidth must be positive, got {0}")]
    NonPositiveResolution(f64),
    #[error("sweep would take more than {max} steps")]
    TooManySteps { max: usize },
}

impl SweepParams {
    /// Upper bound on the number of amplitude points in one sweep.
    pub const MAX_STEPS: usize = 10_000;

    pub fn validate(&self) -> Result<(), InvalidSweep> {
        self.checked_step_count().map(drop)
    }

    /// Number of amplitude points, both ends included, or `None` when the
    /// parameters are invalid.
    pub fn step_count(&self) -> Option<usize> {
        self.checked_step_count().ok()
    }

    /// The amplitudes visited, in order.
    pub fn amplitudes(&self) -> Result<impl ExactSizeIterator<Item = Dbm> + '_, InvalidSweep> {
        let count = self.checked_step_count()?;
        Ok((0..count).map(move |i| {
            let value = self.start.0 + i as f64 * self.step.0;
            // rounding to 1e-9 absorbs accumulation noise like 0.30000000000000004
            Dbm(((value * 1e9).round() / 1e9).min(self.stop.0) + 0.0)
        }))
    }

    /// Counted up front so floating-point accumulation can neither skip nor
    /// repeat the terminal value.
    fn checked_step_count(&self) -> Result<usize, InvalidSweep> {
        const TOLERANCE: f64 = 1e-9;
        let (start, stop, step) = (self.start.0, self.stop.0, self.step.0);
        if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
            return Err(InvalidSweep::NotFinite);
        }
        if step <= 0.0 {
            return Err(InvalidSweep::NonPositiveStep(step));
        }
        if start > stop {
            return Err(InvalidSweep::Reversed { start, stop });
        }
        if self.resolution.0.is_nan() || self.resolution.0 <= 0.0 {
            return Err(InvalidSweep::NonPositiveResolution(self.resolution.0));
        }

        let intervals = ((stop - start) / step + TOLERANCE).floor();
        let too_many = InvalidSweep::TooManySteps {
            max: Self::MAX_STEPS,
        };
        if !intervals.is_finite() || intervals >= Self::MAX_STEPS as f64 {
            return Err(too_many);
        }
        (intervals as usize).checked_add(1).ok_or(too_many)
    }
}

/// Editable analyzer settings. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineSettings {
    pub center_frequency: Option<Hertz>,
    pub span: Option<Hertz>,
    pub start_frequency: Option<Hertz>,
    pub stop_frequency: Option<Hertz>,
    pub resolution_bandwidth: Option<Hertz>,
    pub oscillator_amplitude: Option<Dbm>,
}

impl MachineSettings {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{command}' is missing argument <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("'{command}': '{value}' is not a number")]
    InvalidNumber { command: &'static str, value: String },
}

/// Line grammar used by text-driven controllers, e.g. `center_span 1e6 1e4`.
impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseCommandError::Empty);
        }
        let (tag, rest) = line
            .split_once(char::is_whitespace)
            .map(|(tag, rest)| (tag, rest.trim()))
            .unwrap_or((line, ""));
        let mut args = Args::new(rest);

        let command = match tag {
            "connect" => Command::Connect,
            "disconnect" => Command::Disconnect,
            "acquire" | "start_acquisition" => Command::StartAcquisition,
            "center_span" => Command::SetCenterAndSpan {
                center: Hertz(args.number("center_span", "center")?),
                span: Hertz(args.number("center_span", "span")?),
            },
            "start_stop" => Command::SetStartStop {
                start: Hertz(args.number("start_stop", "start")?),
                stop: Hertz(args.number("start_stop", "stop")?),
            },
            "center" => Command::SetCenterFrequency {
                freq: Hertz(args.number("center", "freq")?),
            },
            "raw" => Command::SendRaw {
                text: args.remainder("raw", "text")?,
            },
            "low_res_sweep" => Command::LowResSweep,
            "amplitude_sweep" => Command::AmplitudeSweep(SweepParams {
                start: Dbm(args.number("amplitude_sweep", "start")?),
                stop: Dbm(args.number("amplitude_sweep", "stop")?),
                step: Dbm(args.number("amplitude_sweep", "step")?),
                resolution: Hertz(args.number("amplitude_sweep", "resolution")?),
                output_dir: PathBuf::from(args.remainder("amplitude_sweep", "output_dir")?),
            }),
            "machine_values" => Command::QueryMachineValues,
            "shutdown" => Command::Shutdown,
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Whitespace-separated argument cursor over the tail of a command line.
struct Args<'a> {
    rest: &'a str,
}

impl<'a> Args<'a> {
    fn new(rest: &'a str) -> Self {
        Self { rest }
    }

    fn number(
        &mut self,
        command: &'static str,
        argument: &'static str,
    ) -> Result<f64, ParseCommandError> {
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            return Err(ParseCommandError::MissingArgument { command, argument });
        }
        let (token, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        self.rest = tail;
        token
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| ParseCommandError::InvalidNumber {
                command,
                value: token.to_string(),
            })
    }

    fn remainder(
        &mut self,
        command: &'static str,
        argument: &'static str,
    ) -> Result<String, ParseCommandError> {
        let rest = std::mem::take(&mut self.rest).trim();
        if rest.is_empty() {
            return Err(ParseCommandError::MissingArgument { command, argument });
        }
        Ok(rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(start: f64, stop: f64, step: f64) -> SweepParams {
        SweepParams {
            start: Dbm(start),
            stop: Dbm(stop),
            step: Dbm(step),
            resolution: Hertz(100.0),
            output_dir: PathBuf::from("."),
        }
    }

    #[test]
    fn test_amplitudes_include_both_ends() {
        let values: Vec<f64> = sweep(-10.0, 0.0, 5.0).amplitudes().unwrap().map(f64::from).collect();
        assert_eq!(values, vec![-10.0, -5.0, 0.0]);
    }

    #[test]
    fn test_amplitudes_survive_inexact_step() {
        let params = sweep(0.0, 1.0, 0.1);
        let values: Vec<f64> = params.amplitudes().unwrap().map(f64::from).collect();
        assert_eq!(values.len(), 11);
        assert_eq!(values[3], 0.3);
        assert_eq!(*values.last().unwrap(), 1.0);
    }

    #[test]
    fn test_amplitudes_single_point_and_partial_last_step() {
        assert_eq!(sweep(-3.0, -3.0, 1.0).step_count(), Some(1));
        // 0, 4, 8 -- 10 is not reachable with step 4
        let values: Vec<f64> = sweep(0.0, 10.0, 4.0).amplitudes().unwrap().map(f64::from).collect();
        assert_eq!(values, vec![0.0, 4.0, 8.0]);
    }

    #[test]
    fn test_validate_rejects_bad_sweeps() {
        assert_eq!(
            sweep(0.0, 10.0, 0.0).validate(),
            Err(InvalidSweep::NonPositiveStep(0.0))
        );
        assert_eq!(
            sweep(5.0, 0.0, 1.0).validate(),
            Err(InvalidSweep::Reversed {
                start: 5.0,
                stop: 0.0
            })
        );
        assert_eq!(
            sweep(f64::NAN, 0.0, 1.0).validate(),
            Err(InvalidSweep::NotFinite)
        );
        assert!(sweep(-10.0, 0.0, 5.0).validate().is_ok());
    }

    #[test]
    fn test_step_count_is_bounded() {
        let zero_step = sweep(-10.0, 0.0, 0.0);
        assert_eq!(zero_step.step_count(), None);
        assert!(zero_step.amplitudes().is_err());

        let tiny_step = sweep(-10.0, 0.0, 1e-300);
        assert_eq!(
            tiny_step.validate(),
            Err(InvalidSweep::TooManySteps {
                max: SweepParams::MAX_STEPS
            })
        );
        assert_eq!(tiny_step.step_count(), None);

        let widest = sweep(0.0, (SweepParams::MAX_STEPS - 1) as f64, 1.0);
        assert_eq!(widest.step_count(), Some(SweepParams::MAX_STEPS));
        assert!(sweep(0.0, SweepParams::MAX_STEPS as f64, 1.0).validate().is_err());
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("connect".parse(), Ok(Command::Connect));
        assert_eq!(
            "center_span 1e6 10000".parse(),
            Ok(Command::SetCenterAndSpan {
                center: Hertz(1e6),
                span: Hertz(1e4)
            })
        );
        assert_eq!(
            "raw  CENTER?".parse(),
            Ok(Command::SendRaw {
                text: "CENTER?".to_string()
            })
        );
        assert_eq!(
            "amplitude_sweep -10 0 5 10 /tmp/my runs".parse(),
            Ok(Command::AmplitudeSweep(SweepParams {
                start: Dbm(-10.0),
                stop: Dbm(0.0),
                step: Dbm(5.0),
                resolution: Hertz(10.0),
                output_dir: PathBuf::from("/tmp/my runs"),
            }))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(ParseCommandError::Empty));
        assert_eq!(
            "calibrate".parse::<Command>(),
            Err(ParseCommandError::Unknown("calibrate".to_string()))
        );
        assert_eq!(
            "center".parse::<Command>(),
            Err(ParseCommandError::MissingArgument {
                command: "center",
                argument: "freq"
            })
        );
        assert_eq!(
            "start_stop 1k 2k".parse::<Command>(),
            Err(ParseCommandError::InvalidNumber {
                command: "start_stop",
                value: "1k".to_string()
            })
        );
        assert_eq!(
            "center inf".parse::<Command>(),
            Err(ParseCommandError::InvalidNumber {
                command: "center",
                value: "inf".to_string()
            })
        );
        assert!("start_stop NaN 1e6".parse::<Command>().is_err());
    }
}
