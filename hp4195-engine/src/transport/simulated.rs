use std::f64::consts::PI;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};

use super::{Session, Transport};
use crate::error::TransportError;
use crate::gpib::parse_setting_value;

const POINTS: usize = 401;

/// Front panel state of the simulated analyzer.
#[derive(Debug, Clone)]
struct Panel {
    center: f64,
    span: f64,
    rbw: f64,
    osc1: f64,
    single_sweep: bool,
    resonance: f64,
    quality: f64,
    /// Trace captured by the last trigger as (freq, mag, phase).
    captured: Option<(Vec<f64>, Vec<f64>, Vec<f64>)>,
}

impl Default for Panel {
    fn default() -> Self {
        Self {
            center: 1_000_000.0,
            span: 100_000.0,
            rbw: 100.0,
            osc1: 0.0,
            single_sweep: false,
            resonance: 1_012_500.0,
            quality: 250.0,
            captured: None,
        }
    }
}

impl Panel {
    fn apply(&mut self, text: &str) {
        let Some((name, _)) = text.split_once('=') else {
            match text.trim() {
                "SWM2" => self.single_sweep = true,
                "SWTRG" => {
                    if !self.single_sweep {
                        debug!("Simulated analyzer triggered outside single sweep mode");
                    }
                    self.captured = Some(self.sweep());
                }
                other => warn!("Simulated analyzer ignoring '{}'", other),
            }
            return;
        };
        let Some(value) = parse_setting_value(text) else {
            warn!("Simulated analyzer could not parse '{}'", text);
            return;
        };
        match name.trim() {
            "CENTER" => self.center = value,
            "SPAN" => self.span = value.abs(),
            "START" => {
                let stop = self.center + self.span / 2.0;
                self.center = (value + stop) / 2.0;
                self.span = (stop - value).abs();
            }
            "STOP" => {
                let start = self.center - self.span / 2.0;
                self.center = (start + value) / 2.0;
                self.span = (value - start).abs();
            }
            "RBW" => self.rbw = value,
            "OSC1" => self.osc1 = value,
            other => warn!("Simulated analyzer has no setting '{}'", other),
        }
    }

    /// Series resonator response across the current span.
    fn sweep(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let start = self.center - self.span / 2.0;
        let step = self.span / (POINTS - 1) as f64;
        let mut frequency = Vec::with_capacity(POINTS);
        let mut magnitude = Vec::with_capacity(POINTS);
        let mut phase = Vec::with_capacity(POINTS);

        for i in 0..POINTS {
            let f = (start + i as f64 * step).max(1.0);
            let detune = self.quality * (f / self.resonance - self.resonance / f);
            let gain = 1.0 / (1.0 + detune * detune).sqrt();
            frequency.push(f);
            magnitude.push(self.osc1 + 20.0 * gain.log10());
            phase.push(-detune.atan() * 180.0 / PI);
        }
        (frequency, magnitude, phase)
    }

    fn answer(&self, query: &str) -> Option<String> {
        let captured = || self.captured.clone().unwrap_or_else(|| self.sweep());
        let response = match query.trim() {
            "ID?" => "HP4195A".to_string(),
            "A?" => join(&captured().1),
            "B?" => join(&captured().2),
            "X?" => join(&captured().0),
            "CENTER?" => self.center.to_string(),
            "SPAN?" => self.span.to_string(),
            "START?" => (self.center - self.span / 2.0).to_string(),
            "STOP?" => (self.center + self.span / 2.0).to_string(),
            "RBW?" => self.rbw.to_string(),
            "OSC1?" => self.osc1.to_string(),
            _ => return None,
        };
        Some(response)
    }
}

fn join(values: &[f64]) -> String {
    let mut out = String::with_capacity(values.len() * 12);
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{value:.9E}");
    }
    out
}

/// An HP4195A that lives in memory.
///
/// Tracks written settings, answers the query grammar and produces a
/// resonance curve over the configured span. Settings survive reconnects,
/// like on the real instrument.
#[derive(Clone, Default)]
pub struct SimulatedTransport {
    panel: Arc<Mutex<Panel>>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the simulated resonance.
    pub fn with_resonance(self, frequency: f64, quality: f64) -> Self {
        {
            let mut panel = lock(&self.panel);
            panel.resonance = frequency;
            panel.quality = quality;
        }
        self
    }
}

fn lock(panel: &Mutex<Panel>) -> MutexGuard<'_, Panel> {
    panel.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for SimulatedTransport {
    type Session = SimulatedSession;

    fn open(&mut self, resource: &str, _timeout: Duration) -> Result<SimulatedSession, TransportError> {
        debug!("Simulated analyzer answering on '{}'", resource);
        Ok(SimulatedSession {
            panel: self.panel.clone(),
        })
    }
}

pub struct SimulatedSession {
    panel: Arc<Mutex<Panel>>,
}

impl Session for SimulatedSession {
    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        lock(&self.panel).apply(text);
        Ok(())
    }

    fn query(&mut self, text: &str) -> Result<String, TransportError> {
        lock(&self.panel)
            .answer(text)
            .ok_or_else(|| TransportError::Io(format!("simulated analyzer rejected '{text}'")))
    }

    fn close(self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> SimulatedSession {
        SimulatedTransport::new()
            .open("SIM", Duration::from_secs(1))
            .unwrap()
    }

    fn parse(list: &str) -> Vec<f64> {
        list.split(',').map(|v| v.parse().unwrap()).collect()
    }

    #[test]
    fn test_settings_round_trip() {
        let mut session = open();
        session.write("CENTER = 2000000 HZ").unwrap();
        session.write("SPAN = 20000 HZ").unwrap();
        session.write("OSC1 = -10 DBM").unwrap();

        assert_eq!(session.query("CENTER?").unwrap(), "2000000");
        assert_eq!(session.query("START?").unwrap(), "1990000");
        assert_eq!(session.query("OSC1?").unwrap(), "-10");
        assert!(session.query("NOPE?").is_err());
    }

    #[test]
    fn test_start_stop_update_center_and_span() {
        let mut session = open();
        session.write("START = 1000 HZ").unwrap();
        session.write("STOP = 3000 HZ").unwrap();
        assert_eq!(session.query("CENTER?").unwrap(), "2000");
        assert_eq!(session.query("SPAN?").unwrap(), "2000");
    }

    #[test]
    fn test_trace_peaks_at_resonance() {
        let mut session = SimulatedTransport::new()
            .with_resonance(1_000_000.0, 100.0)
            .open("SIM", Duration::from_secs(1))
            .unwrap();
        session.write("SWM2").unwrap();
        session.write("SWTRG").unwrap();

        let freq = parse(&session.query("X?").unwrap());
        let mag = parse(&session.query("A?").unwrap());
        let phase = parse(&session.query("B?").unwrap());
        assert_eq!(freq.len(), POINTS);
        assert_eq!(mag.len(), POINTS);
        assert_eq!(phase.len(), POINTS);

        let (peak_index, _) = mag
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert!((freq[peak_index] - 1_000_000.0).abs() <= 250.0);
        assert!(mag[peak_index].abs() < 0.01);
    }
}
