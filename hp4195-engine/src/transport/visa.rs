use std::ffi::CString;
use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use log::debug;
use visa_rs::attribute::AttrTmoValue;
use visa_rs::prelude::*;

use super::{Session, Transport};
use crate::error::TransportError;

/// GPIB/USB/LAN instruments through the system VISA library.
#[derive(Default)]
pub struct VisaTransport {
    rm: Option<DefaultRM>,
}

impl VisaTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for VisaTransport {
    type Session = VisaSession;

    fn open(&mut self, resource: &str, timeout: Duration) -> Result<VisaSession, TransportError> {
        let open_error = |reason: String| TransportError::Open {
            resource: resource.to_string(),
            reason,
        };

        if self.rm.is_none() {
            let rm = DefaultRM::new().map_err(|e| open_error(format!("{e:?}")))?;
            self.rm = Some(rm);
        }
        let rm = self
            .rm
            .as_ref()
            .ok_or_else(|| open_error("resource manager unavailable".into()))?;

        let name = CString::new(resource).map_err(|e| open_error(e.to_string()))?;
        let instrument = rm
            .open(&name.into(), AccessMode::NO_LOCK, timeout)
            .map_err(|e| open_error(format!("{e:?}")))?;

        // the open timeout above does not carry over to reads and writes
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let io_timeout = AttrTmoValue::new_checked(timeout_ms)
            .ok_or_else(|| open_error(format!("invalid I/O timeout {timeout_ms} ms")))?;
        instrument
            .set_attr(io_timeout)
            .map_err(|e| open_error(format!("failed to set I/O timeout: {e:?}")))?;
        debug!("VISA resource '{}' opened, I/O timeout {} ms", resource, timeout_ms);

        Ok(VisaSession { instrument })
    }

    fn release(&mut self) {
        if self.rm.take().is_some() {
            debug!("VISA resource manager released");
        }
    }
}

pub struct VisaSession {
    instrument: Instrument,
}

impl Session for VisaSession {
    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        (&self.instrument)
            .write_all(format!("{text}\n").as_bytes())
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn query(&mut self, text: &str) -> Result<String, TransportError> {
        self.write(text)?;
        let mut response = String::new();
        BufReader::new(&self.instrument)
            .read_line(&mut response)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(response.trim_end().to_string())
    }

    fn close(self) -> Result<(), TransportError> {
        drop(self.instrument);
        Ok(())
    }
}
