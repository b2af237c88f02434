//! Messages exchanged between the analyzer worker and its controller.
mod command;
mod link;
mod reply;
mod state;
mod trace;
mod units;

pub use command::{Command, InvalidSweep, MachineSettings, ParseCommandError, SweepParams};
pub use link::{ControllerLink, LogLine, WorkerLink, channel};
pub use reply::{Ack, Data, Failure, NOT_CONNECTED, QUERY_FAILED};
pub use state::MachineValues;
pub use trace::{Channel, LengthMismatch, Trace};
pub use units::{Dbm, Hertz};
