pub mod acquisition;
pub mod config;
pub mod connection;
pub mod error;
pub mod gpib;
pub mod logging;
pub mod machine;
pub mod persist;
pub mod settle;
pub mod sweep;
pub mod transport;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use anyhow::{Context, Result};
use flume::{Receiver, Sender};
use hp4195_messages::{
    Ack, Command, Data, Failure, MachineSettings, NOT_CONNECTED, QUERY_FAILED, WorkerLink,
};
use log::{debug, error, info, warn};

pub use config::WorkerConfig;
pub use connection::Connection;
pub use error::{AcquisitionError, ConfigError, TransportError, WorkerError};
pub use logging::{ChannelLogger, forward};
pub use settle::{NoSettle, Settle, SettleEntry, SettleTable, SleepSettle};
pub use sweep::{CancelToken, SweepRun};
pub use transport::{Session, Transport};

use crate::gpib::Setting;

/// The analyzer worker.
/// Owns the instrument session and executes commands from the controller one
/// at a time, answering each with exactly one acknowledgement.
pub struct Worker<T: Transport, W: Settle> {
    cmd_rx: Receiver<Command>,
    ack_tx: Sender<Ack>,
    data_tx: Sender<Data>,
    transport: T,
    settle: W,
    config: WorkerConfig,
    connection: Connection<T::Session>,
    cancel: CancelToken,
    should_exit: bool,
}

impl<T: Transport, W: Settle> Worker<T, W> {
    /// Create a new worker on the worker half of the link.
    ///
    /// The log queue is not used here; hand it to a [`ChannelLogger`].
    pub fn new(link: WorkerLink, transport: T, settle: W, config: WorkerConfig) -> Self {
        debug!("Constructing a new worker for {}", config.resource_id);
        let WorkerLink {
            cmd_rx,
            ack_tx,
            data_tx,
            ..
        } = link;
        Self {
            cmd_rx,
            ack_tx,
            data_tx,
            transport,
            settle,
            config,
            connection: Connection::default(),
            cancel: CancelToken::new(),
            should_exit: false,
        }
    }

    /// Token that stops a running amplitude sweep before its next step.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the worker (blocking).
    /// Returns after `Shutdown`, or once every command sender is dropped.
    /// The instrument is always released on the way out.
    pub fn run(mut self) -> Result<()> {
        info!("Worker started");
        let result = self.serve();
        if self.connection.is_connected() {
            self.connection.disconnect(&mut self.transport);
        }
        info!("Worker stopped");
        result
    }

    fn serve(&mut self) -> Result<()> {
        while !self.should_exit {
            match self.cmd_rx.recv() {
                Ok(command) => self.dispatch(command)?,
                Err(flume::RecvError::Disconnected) => {
                    debug!("Command queue closed");
                    break;
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        let tag = command.tag();
        info!("Received \"{}\" from controller", tag);

        let ack = match panic::catch_unwind(AssertUnwindSafe(|| self.handle(command))) {
            Ok(Ok(())) => Ack::Ok,
            Ok(Err(e)) => {
                error!("\"{}\" failed: {}", tag, e);
                Ack::Failed(e.failure())
            }
            Err(payload) => {
                error!("\"{}\" panicked: {}", tag, panic_message(payload.as_ref()));
                Ack::Failed(Failure::Internal)
            }
        };
        debug!("Acknowledging \"{}\" with {:?}", tag, ack);
        self.ack_tx
            .send(ack)
            .context("controller dropped the acknowledgement queue")
    }

    fn handle(&mut self, command: Command) -> Result<(), WorkerError> {
        match command {
            Command::Connect => self.connection.connect(&mut self.transport, &self.config),
            Command::Disconnect => {
                self.connection.disconnect(&mut self.transport);
                Ok(())
            }
            Command::StartAcquisition => {
                let trace = acquisition::acquire_trace(self.connection.session_mut()?)?;
                send_data(&self.data_tx, Data::Trace(trace));
                Ok(())
            }
            Command::SetCenterAndSpan { center, span } => {
                machine::check_finite(center.0)?;
                machine::check_finite(span.0)?;
                self.connection.write(Setting::Center(center))?;
                self.connection.write(Setting::Span(span))?;
                Ok(())
            }
            Command::SetStartStop { start, stop } => {
                machine::check_finite(start.0)?;
                machine::check_finite(stop.0)?;
                if start.0 >= stop.0 {
                    return Err(WorkerError::InvalidFrequencyRange {
                        start: start.0,
                        stop: stop.0,
                    });
                }
                self.connection.write(Setting::Start(start))?;
                self.connection.write(Setting::Stop(stop))?;
                Ok(())
            }
            Command::SetCenterFrequency { freq } => {
                machine::check_finite(freq.0)?;
                self.connection.write(Setting::Center(freq))?;
                Ok(())
            }
            Command::SendRaw { text } => self.send_raw(&text),
            Command::LowResSweep => {
                let trace = sweep::low_res_sweep(
                    self.connection.session_mut()?,
                    &mut self.settle,
                    self.config.low_res_rbw(),
                    self.config.normal_rbw(),
                )?;
                send_data(&self.data_tx, Data::Trace(trace));
                Ok(())
            }
            Command::AmplitudeSweep(params) => {
                let data_tx = &self.data_tx;
                let run = sweep::amplitude_sweep(
                    self.connection.session_mut()?,
                    &mut self.settle,
                    &params,
                    &self.cancel,
                    |amplitude, trace| {
                        send_data(
                            data_tx,
                            Data::SweepStep {
                                frequency: trace.frequency().to_vec(),
                                magnitude: trace.magnitude().to_vec(),
                                amplitude,
                            },
                        )
                    },
                )?;
                debug!(
                    "Sweep run in {} complete with {} traces",
                    run.output_dir.display(),
                    run.len()
                );
                Ok(())
            }
            Command::QueryMachineValues => {
                let values = machine::read_machine_values(self.connection.session_mut()?)?;
                send_data(&self.data_tx, Data::MachineValues(values));
                Ok(())
            }
            Command::ApplyMachineSettings(settings) => self.apply_machine_settings(&settings),
            Command::Shutdown => {
                self.connection.disconnect(&mut self.transport);
                self.should_exit = true;
                Ok(())
            }
        }
    }

    /// Always puts exactly one string on the data queue: the response or a
    /// sentinel.
    fn send_raw(&mut self, text: &str) -> Result<(), WorkerError> {
        let (response, result) = match self.connection.query(text) {
            Ok(response) => (response, Ok(())),
            Err(TransportError::NotConnected) => (
                NOT_CONNECTED.to_string(),
                Err(TransportError::NotConnected.into()),
            ),
            Err(e) => (QUERY_FAILED.to_string(), Err(e.into())),
        };
        send_data(&self.data_tx, Data::RawResponse(response));
        result
    }

    fn apply_machine_settings(&mut self, settings: &MachineSettings) -> Result<(), WorkerError> {
        if settings.is_empty() {
            debug!("No machine settings to apply");
            return Ok(());
        }
        machine::apply_machine_settings(self.connection.session_mut()?, settings)
    }
}

fn send_data(tx: &Sender<Data>, data: Data) {
    if tx.send(data).is_err() {
        warn!("Controller dropped the data queue");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
