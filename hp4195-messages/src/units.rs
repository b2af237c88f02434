/// Frequency in Hertz.
///
/// Kept as `f64` because the analyzer reports and accepts fractional
/// frequencies (e.g. a fitted peak centre).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Hertz(pub f64);

impl std::fmt::Display for Hertz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

impl From<f64> for Hertz {
    fn from(hz: f64) -> Self {
        Self(hz)
    }
}

impl From<Hertz> for f64 {
    fn from(hz: Hertz) -> Self {
        hz.0
    }
}

/// Power level in dBm (decibels referenced to one milliwatt).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Dbm(pub f64);

impl std::fmt::Display for Dbm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} dBm", self.0)
    }
}

impl From<f64> for Dbm {
    fn from(dbm: f64) -> Self {
        Self(dbm)
    }
}

impl From<Dbm> for f64 {
    fn from(dbm: Dbm) -> Self {
        dbm.0
    }
}
