use flume::{Receiver, Sender};

use crate::{Ack, Command, Data};

/// A log record forwarded from the worker side over the log channel.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub level: log::Level,
    pub target: String,
    pub message: String,
}

/// Controller half of the four-queue link.
pub struct ControllerLink {
    pub cmd_tx: Sender<Command>,
    pub ack_rx: Receiver<Ack>,
    pub data_rx: Receiver<Data>,
    pub log_rx: Receiver<LogLine>,
}

/// Worker half of the four-queue link.
pub struct WorkerLink {
    pub cmd_rx: Receiver<Command>,
    pub ack_tx: Sender<Ack>,
    pub data_tx: Sender<Data>,
    pub log_tx: Sender<LogLine>,
}

/// Build the command, acknowledgement, data and log queues.
pub fn channel() -> (ControllerLink, WorkerLink) {
    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (ack_tx, ack_rx) = flume::unbounded();
    let (data_tx, data_rx) = flume::unbounded();
    let (log_tx, log_rx) = flume::unbounded();

    (
        ControllerLink {
            cmd_tx,
            ack_rx,
            data_rx,
            log_rx,
        },
        WorkerLink {
            cmd_rx,
            ack_tx,
            data_tx,
            log_tx,
        },
    )
}
