use std::path::Path;

use anyhow::Context;
use hp4195_engine::persist::write_trace_csv;
use hp4195_messages::{Ack, Command, Data, Dbm, MachineValues, Trace};
use log::{debug, info};

/// One amplitude-sweep step as received for live display.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepCurve {
    pub amplitude: Dbm,
    pub frequency: Vec<f64>,
    pub magnitude: Vec<f64>,
}

/// Controller-side view of the analyzer, folded from acknowledgements and
/// data messages.
#[derive(Debug, Default)]
pub struct ControllerState {
    pub connected: bool,
    /// Latest trace from an acquisition or low-resolution sweep.
    pub trace: Option<Trace>,
    /// Marked peak of `trace` as `(frequency, magnitude)`.
    pub peak: Option<(f64, f64)>,
    /// Curves of the current amplitude sweep, in step order.
    pub sweep: Vec<SweepCurve>,
    pub last_response: Option<String>,
    pub machine_values: Option<MachineValues>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called just before `command` is sent.
    pub fn begin(&mut self, command: &Command) {
        match command {
            Command::AmplitudeSweep(_) => self.sweep.clear(),
            Command::SendRaw { .. } => self.last_response = None,
            _ => {}
        }
    }

    pub fn handle_data(&mut self, data: Data) {
        match data {
            Data::Trace(trace) => {
                debug!("Trace of {} points", trace.len());
                self.trace = Some(trace);
                self.peak = None;
            }
            Data::RawResponse(response) => {
                self.last_response = Some(response);
            }
            Data::SweepStep {
                frequency,
                magnitude,
                amplitude,
            } => {
                self.sweep.push(SweepCurve {
                    amplitude,
                    frequency,
                    magnitude,
                });
            }
            Data::MachineValues(values) => {
                self.machine_values = Some(values);
            }
        }
    }

    pub fn handle_ack(&mut self, command: &Command, ack: &Ack) {
        match command {
            Command::Connect => self.connected = ack.is_ok(),
            Command::Disconnect | Command::Shutdown => self.connected = false,
            _ => {}
        }
    }

    /// Mark the highest-magnitude sample of the current trace.
    pub fn mark_peak(&mut self) -> Option<(f64, f64)> {
        self.peak = self.trace.as_ref().and_then(Trace::peak);
        if let Some((frequency, magnitude)) = self.peak {
            info!("Peak at {} Hz, {} dB", frequency, magnitude);
        }
        self.peak
    }

    /// Save the current trace as `Frequency,Magnitude,Phase` CSV.
    pub fn save_trace(&self, path: &Path) -> anyhow::Result<()> {
        let trace = self.trace.as_ref().context("no trace acquired yet")?;
        write_trace_csv(path, trace).with_context(|| format!("saving {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use hp4195_messages::{Failure, Hertz, SweepParams};

    use super::*;

    fn trace() -> Trace {
        Trace::new(
            vec![1000.0, 2000.0, 3000.0],
            vec![-20.0, -3.0, -15.0],
            vec![10.0, 0.0, -10.0],
        )
        .unwrap()
    }

    #[test]
    fn test_connect_tracks_ack() {
        let mut state = ControllerState::new();
        state.handle_ack(&Command::Connect, &Ack::Ok);
        assert!(state.connected);

        state.handle_ack(&Command::StartAcquisition, &Ack::Failed(Failure::Transport));
        assert!(state.connected);

        state.handle_ack(&Command::Connect, &Ack::Failed(Failure::IdentityMismatch));
        assert!(!state.connected);
    }

    #[test]
    fn test_new_trace_clears_peak() {
        let mut state = ControllerState::new();
        state.handle_data(Data::Trace(trace()));
        assert_eq!(state.mark_peak(), Some((2000.0, -3.0)));

        state.handle_data(Data::Trace(trace()));
        assert_eq!(state.peak, None);
    }

    #[test]
    fn test_sweep_restarts_on_new_run() {
        let mut state = ControllerState::new();
        let step = |amplitude| Data::SweepStep {
            frequency: vec![1.0],
            magnitude: vec![2.0],
            amplitude: Dbm(amplitude),
        };
        state.handle_data(step(-10.0));
        state.handle_data(step(-5.0));
        assert_eq!(state.sweep.len(), 2);

        state.begin(&Command::AmplitudeSweep(SweepParams {
            start: Dbm(0.0),
            stop: Dbm(0.0),
            step: Dbm(1.0),
            resolution: Hertz(100.0),
            output_dir: PathBuf::from("."),
        }));
        assert!(state.sweep.is_empty());
    }

    #[test]
    fn test_save_requires_trace() {
        let state = ControllerState::new();
        assert!(state.save_trace(Path::new("unused.csv")).is_err());
    }
}
