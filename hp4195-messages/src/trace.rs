/// One of the three data channels read back after a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Magnitude,
    Phase,
    Frequency,
}

impl Channel {
    /// Acquisition order: magnitude, phase, frequency.
    pub const ALL: [Channel; 3] = [Channel::Magnitude, Channel::Phase, Channel::Frequency];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Magnitude => "magnitude",
            Self::Phase => "phase",
            Self::Frequency => "frequency",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The three channel lengths of a rejected trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthMismatch {
    pub magnitude: usize,
    pub phase: usize,
    pub frequency: usize,
}

impl std::fmt::Display for LengthMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "channel lengths differ (mag={}, phase={}, freq={})",
            self.magnitude, self.phase, self.frequency
        )
    }
}

impl std::error::Error for LengthMismatch {}

/// Frequency (Hz), magnitude (dB) and phase (degrees) captured from one sweep.
///
/// All three sequences always have the same length; the only way to build a
/// `Trace` is through [`Trace::new`], which rejects anything else.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trace {
    frequency: Vec<f64>,
    magnitude: Vec<f64>,
    phase: Vec<f64>,
}

impl Trace {
    pub fn new(
        frequency: Vec<f64>,
        magnitude: Vec<f64>,
        phase: Vec<f64>,
    ) -> Result<Self, LengthMismatch> {
        if magnitude.len() != frequency.len() || phase.len() != frequency.len() {
            return Err(LengthMismatch {
                magnitude: magnitude.len(),
                phase: phase.len(),
                frequency: frequency.len(),
            });
        }
        Ok(Self {
            frequency,
            magnitude,
            phase,
        })
    }

    pub fn frequency(&self) -> &[f64] {
        &self.frequency
    }

    pub fn magnitude(&self) -> &[f64] {
        &self.magnitude
    }

    pub fn phase(&self) -> &[f64] {
        &self.phase
    }

    pub fn len(&self) -> usize {
        self.frequency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.is_empty()
    }

    /// Iterate `(frequency, magnitude, phase)` rows.
    pub fn rows(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.frequency
            .iter()
            .zip(&self.magnitude)
            .zip(&self.phase)
            .map(|((f, m), p)| (*f, *m, *p))
    }

    /// Sample with the largest magnitude as `(frequency, magnitude)`.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequency
            .iter()
            .zip(&self.magnitude)
            .filter(|(_, m)| !m.is_nan())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(f, m)| (*f, *m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_rejects_mismatched_lengths() {
        let err = Trace::new(vec![10.0, 20.0, 30.0], vec![1.0, 2.0, 3.0], vec![9.0, 8.0])
            .unwrap_err();
        assert_eq!(
            err,
            LengthMismatch {
                magnitude: 3,
                phase: 2,
                frequency: 3
            }
        );
    }

    #[test]
    fn test_trace_rows_and_peak() {
        let trace = Trace::new(
            vec![1000.0, 2000.0, 3000.0],
            vec![-30.0, -3.0, -20.0],
            vec![0.0, 45.0, 90.0],
        )
        .unwrap();

        assert_eq!(trace.len(), 3);
        assert_eq!(trace.rows().nth(1), Some((2000.0, -3.0, 45.0)));
        assert_eq!(trace.peak(), Some((2000.0, -3.0)));
    }

    #[test]
    fn test_empty_trace_has_no_peak() {
        let trace = Trace::default();
        assert!(trace.is_empty());
        assert_eq!(trace.peak(), None);
    }
}
