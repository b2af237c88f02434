mod state;

use std::path::PathBuf;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError};
use hp4195_engine::{SettleTable, WorkerConfig};
use hp4195_messages::{
    Ack, Command, ControllerLink, Data, Hertz, LogLine, ParseCommandError, Trace,
};
use log::{debug, info, warn};
use thiserror::Error;

pub use state::{ControllerState, SweepCurve};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("worker has stopped")]
    WorkerGone,
    /// The worker may still acknowledge later, so later acks can no longer be
    /// matched to their commands.
    #[error("no acknowledgement for \"{command}\" within {timeout:?}")]
    AckTimeout {
        command: &'static str,
        timeout: Duration,
    },
    #[error(transparent)]
    Parse(#[from] ParseCommandError),
    #[error("no trace acquired yet")]
    NoTrace,
}

/// How long to wait for each acknowledgement.
///
/// The worker blocks for the whole of a sweep, so sweep timeouts grow with
/// the settle table.
#[derive(Debug, Clone)]
pub struct AckTimeouts {
    base: Duration,
    settle: SettleTable,
    low_res_rbw: Hertz,
}

impl AckTimeouts {
    /// Queries per command, each bounded by the bus timeout.
    const QUERIES_PER_COMMAND: u32 = 8;

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            base: config.timeout * Self::QUERIES_PER_COMMAND,
            settle: config.settle.clone(),
            low_res_rbw: config.low_res_rbw(),
        }
    }

    pub fn for_command(&self, command: &Command) -> Duration {
        match command {
            Command::LowResSweep => self.base + self.settle.lookup(self.low_res_rbw),
            // invalid parameters are rejected by the worker before any I/O
            Command::AmplitudeSweep(params) => match params.step_count() {
                Some(steps) => {
                    let queries = u32::try_from(steps).unwrap_or(u32::MAX).saturating_add(1);
                    self.base
                        .saturating_mul(queries)
                        .saturating_add(self.settle.total(params.resolution, steps))
                }
                None => self.base,
            },
            _ => self.base,
        }
    }
}

/// Blocking handle on the controller half of the link.
///
/// Every request waits for its acknowledgement before returning, so there is
/// never more than one command in flight.
pub struct Controller {
    link: ControllerLink,
    timeouts: AckTimeouts,
    state: ControllerState,
    output_dir: Option<PathBuf>,
}

impl Controller {
    pub fn new(link: ControllerLink, timeouts: AckTimeouts) -> Self {
        Self {
            link,
            timeouts,
            state: ControllerState::new(),
            output_dir: None,
        }
    }

    /// Resolve relative sweep directories in text commands against `dir`.
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ControllerState {
        &mut self.state
    }

    /// Log lines forwarded from the worker side.
    pub fn logs(&self) -> &Receiver<LogLine> {
        &self.link.log_rx
    }

    /// Send `command`, wait for its acknowledgement and fold any data it
    /// produced into the state.
    pub fn request(&mut self, command: Command) -> Result<Ack, ControllerError> {
        let tag = command.tag();
        let timeout = self.timeouts.for_command(&command);
        debug!("Sending \"{}\" (ack timeout {:?})", tag, timeout);

        self.state.begin(&command);
        self.link
            .cmd_tx
            .send(command.clone())
            .map_err(|_| ControllerError::WorkerGone)?;

        let ack = match self.link.ack_rx.recv_timeout(timeout) {
            Ok(ack) => ack,
            Err(RecvTimeoutError::Timeout) => {
                return Err(ControllerError::AckTimeout {
                    command: tag,
                    timeout,
                });
            }
            Err(RecvTimeoutError::Disconnected) => return Err(ControllerError::WorkerGone),
        };

        // data always precedes its ack
        self.drain_data();
        self.state.handle_ack(&command, &ack);
        match &ack {
            Ack::Ok => info!("\"{}\" succeeded", tag),
            Ack::Failed(failure) => warn!("\"{}\" failed: {}", tag, failure),
        }
        Ok(ack)
    }

    /// Parse one text command and run it.
    ///
    /// Unknown commands are logged and dropped without reaching the worker,
    /// so no acknowledgement is expected and `Ok(None)` is returned.
    pub fn submit_line(&mut self, line: &str) -> Result<Option<Ack>, ControllerError> {
        match line.parse::<Command>() {
            Ok(Command::AmplitudeSweep(mut params)) => {
                if let Some(base) = &self.output_dir {
                    if params.output_dir.is_relative() {
                        params.output_dir = base.join(&params.output_dir);
                    }
                }
                self.request(Command::AmplitudeSweep(params)).map(Some)
            }
            Ok(command) => self.request(command).map(Some),
            Err(ParseCommandError::Unknown(tag)) => {
                warn!("Unknown command \"{}\" dropped", tag);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn connect(&mut self) -> Result<Ack, ControllerError> {
        self.request(Command::Connect)
    }

    pub fn disconnect(&mut self) -> Result<Ack, ControllerError> {
        self.request(Command::Disconnect)
    }

    pub fn acquire(&mut self) -> Result<Ack, ControllerError> {
        self.request(Command::StartAcquisition)
    }

    /// Centre on `center` with `span`, then acquire.
    pub fn peak_scan(&mut self, center: Hertz, span: Hertz) -> Result<Ack, ControllerError> {
        self.then_acquire(Command::SetCenterAndSpan { center, span })
    }

    /// Sweep `start..stop`, then acquire.
    pub fn range_scan(&mut self, start: Hertz, stop: Hertz) -> Result<Ack, ControllerError> {
        self.then_acquire(Command::SetStartStop { start, stop })
    }

    /// Move the centre frequency onto the peak of the current trace and
    /// acquire again.
    pub fn center_on_peak(&mut self) -> Result<Ack, ControllerError> {
        let trace = self.state.trace.as_ref().ok_or(ControllerError::NoTrace)?;
        let (frequency, _) = trace.peak().ok_or(ControllerError::NoTrace)?;
        self.then_acquire(Command::SetCenterFrequency {
            freq: Hertz(frequency),
        })
    }

    /// Query `text` and return whatever the worker sent back, sentinels included.
    pub fn send_raw(&mut self, text: &str) -> Result<Option<String>, ControllerError> {
        self.request(Command::SendRaw {
            text: text.to_string(),
        })?;
        Ok(self.state.last_response.clone())
    }

    pub fn trace(&self) -> Option<&Trace> {
        self.state.trace.as_ref()
    }

    /// Stop the worker and wait for its acknowledgement.
    pub fn shutdown(mut self) -> Result<Ack, ControllerError> {
        self.request(Command::Shutdown)
    }

    fn then_acquire(&mut self, command: Command) -> Result<Ack, ControllerError> {
        match self.request(command)? {
            Ack::Ok => self.acquire(),
            failed => Ok(failed),
        }
    }

    fn drain_data(&mut self) {
        let pending: Vec<Data> = self.link.data_rx.try_iter().collect();
        for data in pending {
            self.state.handle_data(data);
        }
    }
}
