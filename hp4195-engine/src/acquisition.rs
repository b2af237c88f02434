//! Acquisition engine: read the three trace channels and check they agree.

use hp4195_messages::{Channel, Trace};
use log::{info, warn};

use crate::connection::query;
use crate::error::AcquisitionError;
use crate::gpib::Query;
use crate::transport::Session;

/// Parse a comma-delimited list of numbers as sent by `A?`, `B?` and `X?`.
///
/// Whitespace around values is ignored. An empty list or any token that is
/// not a number rejects the whole response.
pub fn parse_values(response: &str) -> Result<Vec<f64>, String> {
    let response = response.trim();
    if response.is_empty() {
        return Err("empty response".to_string());
    }
    response
        .split(',')
        .map(str::trim)
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| format!("'{token}' is not a number"))
        })
        .collect()
}

fn read_channel<S: Session>(session: &mut S, channel: Channel) -> Result<Vec<f64>, AcquisitionError> {
    let failed = |reason: String| AcquisitionError::ChannelQueryFailed { channel, reason };

    let response = query(session, Query::for_channel(channel).as_str())
        .map_err(|e| failed(e.to_string()))?;
    let values = parse_values(&response).map_err(|reason| {
        warn!("Error acquiring {} data: {}", channel, reason);
        failed(reason)
    })?;
    Ok(values)
}

/// Query magnitude, phase and frequency in that order and build a trace.
///
/// Stops at the first channel that fails. A trace whose channels differ in
/// length is never returned.
pub fn acquire_trace<S: Session>(session: &mut S) -> Result<Trace, AcquisitionError> {
    let magnitude = read_channel(session, Channel::Magnitude)?;
    let phase = read_channel(session, Channel::Phase)?;
    let frequency = read_channel(session, Channel::Frequency)?;

    let trace = Trace::new(frequency, magnitude, phase).inspect_err(|e| {
        warn!("Data length check failed: {}", e);
    })?;
    info!("Acquired trace of {} points", trace.len());
    Ok(trace)
}
