//! The instrument bus seam.
//!
//! The worker never talks to VISA directly. It opens a [`Session`] through a
//! [`Transport`] and issues blocking writes and queries on it. Implementations:
//!
//! - [`MockTransport`]: scripted responses and call recording, for tests
//! - [`SimulatedTransport`]: an in-process stand-in for the analyzer
//! - `VisaTransport` (feature `visa`): the system VISA library

mod mock;
mod simulated;
#[cfg(feature = "visa")]
mod visa;

use std::time::Duration;

use crate::error::TransportError;

pub use mock::{MockSession, MockTransport, TransportCall};
pub use simulated::{SimulatedSession, SimulatedTransport};
#[cfg(feature = "visa")]
pub use visa::{VisaSession, VisaTransport};

/// Opens sessions to instruments. Plays the role of a VISA resource manager.
pub trait Transport {
    type Session: Session;

    /// Open `resource` with `timeout` applied to every later query.
    fn open(&mut self, resource: &str, timeout: Duration) -> Result<Self::Session, TransportError>;

    /// Release the resource manager itself. Called on disconnect.
    fn release(&mut self) {}
}

/// An open connection to one instrument.
pub trait Session {
    fn write(&mut self, text: &str) -> Result<(), TransportError>;

    /// Write `text` and read one response, with trailing whitespace removed.
    fn query(&mut self, text: &str) -> Result<String, TransportError>;

    fn close(self) -> Result<(), TransportError>
    where
        Self: Sized;
}
