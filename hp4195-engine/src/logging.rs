//! Log forwarding over the log queue.
//!
//! The worker side installs a [`ChannelLogger`] so every `log` record becomes
//! a [`LogLine`]. The receiving side replays them into its own logger with
//! [`forward`].

use flume::Sender;
use hp4195_messages::LogLine;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct ChannelLogger {
    tx: Sender<LogLine>,
    level: LevelFilter,
}

impl ChannelLogger {
    pub fn new(tx: Sender<LogLine>, level: LevelFilter) -> Self {
        Self { tx, level }
    }

    /// Make this the process-wide logger.
    pub fn install(self) -> Result<(), SetLoggerError> {
        log::set_max_level(self.level);
        log::set_boxed_logger(Box::new(self))
    }
}

impl Log for ChannelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // nowhere left to report to once the receiver is gone
        let _ = self.tx.send(LogLine {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

/// Replay a forwarded line into `sink`.
pub fn forward(line: &LogLine, sink: &dyn Log) {
    sink.log(
        &Record::builder()
            .level(line.level)
            .target(&line.target)
            .args(format_args!("{}", line.message))
            .build(),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use log::Level;

    use super::*;

    #[derive(Default)]
    struct Capture(Mutex<Vec<(Level, String, String)>>);

    impl Log for Capture {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.0.lock().unwrap().push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_records_become_log_lines() {
        let (tx, rx) = flume::unbounded();
        let logger = ChannelLogger::new(tx, LevelFilter::Info);

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .target("hp4195_engine::connection")
                .args(format_args!("Device ID mismatch"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("hp4195_engine")
                .args(format_args!("filtered"))
                .build(),
        );

        let lines: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            lines,
            vec![LogLine {
                level: Level::Warn,
                target: "hp4195_engine::connection".into(),
                message: "Device ID mismatch".into(),
            }]
        );
    }

    #[test]
    fn test_forward_replays_line() {
        let sink = Capture::default();
        let line = LogLine {
            level: Level::Error,
            target: "hp4195_engine::acquisition".into(),
            message: "Error acquiring phase data".into(),
        };

        forward(&line, &sink);

        assert_eq!(
            sink.0.lock().unwrap().as_slice(),
            &[(
                Level::Error,
                "hp4195_engine::acquisition".to_string(),
                "Error acquiring phase data".to_string()
            )]
        );
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (tx, rx) = flume::unbounded();
        drop(rx);
        let logger = ChannelLogger::new(tx, LevelFilter::Trace);
        logger.log(&Record::builder().args(format_args!("dropped")).build());
    }
}
