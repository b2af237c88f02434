//! Reading back and writing the analyzer's editable settings.

use hp4195_messages::{Dbm, Hertz, MachineSettings, MachineValues};
use log::warn;

use crate::connection::{query, write};
use crate::error::{TransportError, WorkerError};
use crate::gpib::{Query, Setting, parse_setting_value};
use crate::transport::Session;

fn read_number<S: Session>(session: &mut S, q: Query) -> Result<Option<f64>, TransportError> {
    let response = query(session, q.as_str())?;
    let value = parse_setting_value(&response);
    if value.is_none() {
        warn!("Could not parse {} response '{}'", q, response);
    }
    Ok(value)
}

/// Query identity and current settings. A setting the instrument answers with
/// something unparseable is left as `None`; a failed query fails the read.
pub fn read_machine_values<S: Session>(session: &mut S) -> Result<MachineValues, TransportError> {
    let identity = query(session, Query::Identity.as_str())?;
    let hz = |value: Option<f64>| value.map(Hertz);

    Ok(MachineValues {
        device_id: identity.lines().next().unwrap_or_default().trim().to_string(),
        center_frequency: hz(read_number(session, Query::Center)?),
        span: hz(read_number(session, Query::Span)?),
        start_frequency: hz(read_number(session, Query::Start)?),
        stop_frequency: hz(read_number(session, Query::Stop)?),
        resolution_bandwidth: hz(read_number(session, Query::Rbw)?),
        oscillator_amplitude: read_number(session, Query::Osc1)?.map(Dbm),
    })
}

/// Rejects `inf` and `NaN` before they reach the bus.
pub(crate) fn check_finite(value: f64) -> Result<(), WorkerError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(WorkerError::NonFinite(value))
    }
}

/// Write each present field, in panel order.
pub fn apply_machine_settings<S: Session>(
    session: &mut S,
    settings: &MachineSettings,
) -> Result<(), WorkerError> {
    let frequencies = [
        settings.center_frequency,
        settings.span,
        settings.start_frequency,
        settings.stop_frequency,
        settings.resolution_bandwidth,
    ];
    for value in frequencies.into_iter().flatten() {
        check_finite(value.0)?;
    }
    if let Some(amplitude) = settings.oscillator_amplitude {
        check_finite(amplitude.0)?;
    }
    if let (Some(start), Some(stop)) = (settings.start_frequency, settings.stop_frequency) {
        if start.0 >= stop.0 {
            return Err(WorkerError::InvalidFrequencyRange {
                start: start.0,
                stop: stop.0,
            });
        }
    }

    let writes = [
        settings.center_frequency.map(Setting::Center),
        settings.span.map(Setting::Span),
        settings.start_frequency.map(Setting::Start),
        settings.stop_frequency.map(Setting::Stop),
        settings.resolution_bandwidth.map(Setting::Rbw),
        settings.oscillator_amplitude.map(Setting::Osc1),
    ];
    for setting in writes.into_iter().flatten() {
        write(session, setting)?;
    }
    Ok(())
}
