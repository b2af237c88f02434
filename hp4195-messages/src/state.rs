use crate::{Dbm, Hertz};

/// Analyzer settings as read back from the instrument.
///
/// Numeric fields the instrument answered with something unparseable stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineValues {
    pub device_id: String,
    pub center_frequency: Option<Hertz>,
    pub span: Option<Hertz>,
    pub start_frequency: Option<Hertz>,
    pub stop_frequency: Option<Hertz>,
    pub resolution_bandwidth: Option<Hertz>,
    pub oscillator_amplitude: Option<Dbm>,
}
