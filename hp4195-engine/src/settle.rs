//! Waiting for a triggered sweep to finish.
//!
//! The analyzer never reports sweep completion, so the worker sleeps for a
//! duration looked up from the resolution bandwidth. Narrower filters settle
//! more slowly and therefore get longer waits.

use std::thread;
use std::time::Duration;

use hp4195_messages::Hertz;
use log::debug;
use serde::Deserialize;

/// Something that blocks until a sweep at `rbw` has completed.
pub trait Settle {
    fn wait_for_settle(&mut self, rbw: Hertz);
}

/// One row of the settle table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SettleEntry {
    pub rbw_hz: f64,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

/// Resolution bandwidth to settle duration lookup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Vec<SettleEntry>")]
pub struct SettleTable {
    entries: Vec<SettleEntry>,
}

impl From<Vec<SettleEntry>> for SettleTable {
    fn from(entries: Vec<SettleEntry>) -> Self {
        Self::new(entries)
    }
}

impl Default for SettleTable {
    fn default() -> Self {
        Self::new(vec![
            SettleEntry {
                rbw_hz: 10.0,
                duration: Duration::from_secs(218),
            },
            SettleEntry {
                rbw_hz: 100.0,
                duration: Duration::from_secs(41),
            },
        ])
    }
}

impl SettleTable {
    pub fn new(mut entries: Vec<SettleEntry>) -> Self {
        entries.sort_by(|a, b| a.rbw_hz.total_cmp(&b.rbw_hz));
        Self { entries }
    }

    pub fn entries(&self) -> &[SettleEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Duration for the widest tabulated bandwidth not above `rbw`.
    ///
    /// Bandwidths narrower than every entry use the narrowest entry. An empty
    /// table yields zero.
    pub fn lookup(&self, rbw: Hertz) -> Duration {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.rbw_hz <= rbw.0)
            .or_else(|| self.entries.first())
            .map(|entry| entry.duration)
            .unwrap_or_default()
    }

    /// Worst case wait for `steps` sweeps at `rbw`.
    pub fn total(&self, rbw: Hertz, steps: usize) -> Duration {
        let steps = u32::try_from(steps).unwrap_or(u32::MAX);
        self.lookup(rbw).saturating_mul(steps)
    }
}

/// Sleeps the calling thread for the tabulated duration.
#[derive(Debug, Clone, Default)]
pub struct SleepSettle {
    table: SettleTable,
}

impl SleepSettle {
    pub fn new(table: SettleTable) -> Self {
        Self { table }
    }
}

impl Settle for SleepSettle {
    fn wait_for_settle(&mut self, rbw: Hertz) {
        let duration = self.table.lookup(rbw);
        debug!("Waiting {:?} for sweep at {} to settle", duration, rbw);
        thread::sleep(duration);
    }
}

/// Returns immediately. For simulated instruments.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSettle;

impl Settle for NoSettle {
    fn wait_for_settle(&mut self, _rbw: Hertz) {}
}
