use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clap::Parser;
use log::{LevelFilter, Log, info, warn};

use hp4195_controller::{AckTimeouts, Controller, ControllerError};
use hp4195_engine::transport::SimulatedTransport;
use hp4195_engine::{
    CancelToken, ChannelLogger, NoSettle, SleepSettle, Transport, Worker, WorkerConfig, forward,
};
use hp4195_messages::{Ack, LogLine, WorkerLink};

/// Remote control for the HP4195A network/spectrum analyzer
#[derive(Parser, Debug)]
#[command(name = "hp4195")]
#[command(about = "Drive an HP4195A analyzer from line commands on stdin")]
struct Args {
    /// TOML worker configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// VISA resource string, overrides the config file
    #[arg(long)]
    resource: Option<String>,

    /// Talk to an in-memory analyzer instead of the instrument
    #[arg(long)]
    simulate: bool,

    /// Do not wait for sweeps to settle
    #[arg(long)]
    no_settle: bool,

    /// Base directory for relative amplitude sweep directories
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Maximum log level
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

const HELP: &str = "\
commands:
  connect | disconnect | acquire | low_res_sweep | machine_values
  center <hz> | center_span <hz> <hz> | start_stop <hz> <hz>
  raw <query>
  amplitude_sweep <start dBm> <stop dBm> <step dB> <rbw hz> <dir>
  peak | center_on_peak | save <file.csv> | help | quit
  cancel  (stops a running amplitude sweep before its next step)";

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let sink = env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<5} - target | {} | args: |{}|",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter_level(args.log_level)
        .filter_module("hp4195_engine::sweep", LevelFilter::Info)
        .build();

    let mut config = match &args.config {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    if let Some(resource) = &args.resource {
        config.resource_id = resource.clone();
        config.validate()?;
    }

    // Create the four queues between controller and worker
    let (controller_link, worker_link) = hp4195_messages::channel();

    ChannelLogger::new(worker_link.log_tx.clone(), args.log_level)
        .install()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let stop_logging = Arc::new(AtomicBool::new(false));
    let log_handle = spawn_log_drain(controller_link.log_rx.clone(), sink, stop_logging.clone());

    let timeouts = AckTimeouts::from_config(&config);
    let (worker_handle, cancel) = if args.simulate {
        spawn_worker(worker_link, SimulatedTransport::new(), config, args.no_settle)
    } else {
        spawn_hardware_worker(worker_link, config, args.no_settle)?
    };

    let mut controller = Controller::new(controller_link, timeouts).with_output_dir(args.output_dir);
    println!("{HELP}");
    let lines = spawn_line_reader(io::BufReader::new(io::stdin()), cancel);
    let result = command_loop(&mut controller, &lines);

    // Controller has exited - stop the worker
    match controller.shutdown() {
        Ok(_) | Err(ControllerError::WorkerGone) => {}
        Err(e) => warn!("Shutdown failed: {}", e),
    }
    worker_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Worker thread panicked"))??;

    stop_logging.store(true, Ordering::SeqCst);
    let _ = log_handle.join();
    result
}

/// Read command lines on their own thread so `cancel` still gets through
/// while the controller is blocked on a sweep.
fn spawn_line_reader<R>(input: R, cancel: CancelToken) -> flume::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = flume::unbounded();
    thread::spawn(move || {
        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Could not read stdin: {}", e);
                    break;
                }
            };
            if line.trim() == "cancel" {
                info!("Cancel requested");
                cancel.cancel();
            } else if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn command_loop(
    controller: &mut Controller,
    lines: &flume::Receiver<String>,
) -> anyhow::Result<()> {
    for line in lines.iter() {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));

        match verb {
            "" => continue,
            "quit" | "exit" | "shutdown" => break,
            "help" => println!("{HELP}"),
            "peak" => match controller.state_mut().mark_peak() {
                Some((frequency, magnitude)) => println!("peak: {frequency} Hz, {magnitude} dB"),
                None => println!("no trace"),
            },
            "center_on_peak" => match controller.center_on_peak() {
                Ok(ack) => report(controller, verb, ack),
                Err(ControllerError::NoTrace) => println!("no trace"),
                Err(e) => return Err(e.into()),
            },
            "save" => match controller.state().save_trace(&PathBuf::from(rest.trim())) {
                Ok(()) => println!("saved {}", rest.trim()),
                Err(e) => println!("error: {e:#}"),
            },
            _ => match controller.submit_line(line) {
                Ok(Some(ack)) => report(controller, verb, ack),
                Ok(None) => println!("unknown command '{verb}', try 'help'"),
                Err(ControllerError::Parse(e)) => println!("error: {e}"),
                Err(e) => return Err(e.into()),
            },
        }
    }
    Ok(())
}

fn report(controller: &Controller, verb: &str, ack: Ack) {
    let state = controller.state();
    match &ack {
        Ack::Ok => println!("ok"),
        Ack::Failed(failure) => println!("failed: {failure}"),
    }
    match verb {
        "raw" => {
            if let Some(response) = &state.last_response {
                println!("response: {response}");
            }
        }
        "acquire" | "start_acquisition" | "low_res_sweep" | "center_on_peak" if ack.is_ok() => {
            if let Some(trace) = &state.trace {
                println!("trace: {} points", trace.len());
            }
        }
        "amplitude_sweep" => println!("sweep: {} steps received", state.sweep.len()),
        "machine_values" if ack.is_ok() => {
            if let Some(values) = &state.machine_values {
                println!("{values:#?}");
            }
        }
        _ => {}
    }
}

fn spawn_log_drain(
    log_rx: flume::Receiver<LogLine>,
    sink: env_logger::Logger,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            match log_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(line) => forward(&line, &sink),
                Err(flume::RecvTimeoutError::Timeout) if !stop.load(Ordering::SeqCst) => {}
                Err(_) => break,
            }
        }
        sink.flush();
    })
}

type WorkerHandle = (JoinHandle<anyhow::Result<()>>, CancelToken);

fn spawn_worker<T>(link: WorkerLink, transport: T, config: WorkerConfig, no_settle: bool) -> WorkerHandle
where
    T: Transport + Send + 'static,
    T::Session: Send,
{
    info!("Starting worker for {}", config.resource_id);
    if no_settle {
        let worker = Worker::new(link, transport, NoSettle, config);
        let cancel = worker.cancel_token();
        (thread::spawn(move || worker.run()), cancel)
    } else {
        let settle = SleepSettle::new(config.settle.clone());
        let worker = Worker::new(link, transport, settle, config);
        let cancel = worker.cancel_token();
        (thread::spawn(move || worker.run()), cancel)
    }
}

#[cfg(feature = "visa")]
fn spawn_hardware_worker(
    link: WorkerLink,
    config: WorkerConfig,
    no_settle: bool,
) -> anyhow::Result<WorkerHandle> {
    use hp4195_engine::transport::VisaTransport;
    Ok(spawn_worker(link, VisaTransport::new(), config, no_settle))
}

#[cfg(not(feature = "visa"))]
fn spawn_hardware_worker(
    _link: WorkerLink,
    _config: WorkerConfig,
    _no_settle: bool,
) -> anyhow::Result<WorkerHandle> {
    anyhow::bail!("built without VISA support; rebuild with `--features visa` or pass --simulate")
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_cancel_bypasses_command_queue() {
        let cancel = CancelToken::new();
        let input = Cursor::new("acquire\n  cancel \nquit\n");

        let lines: Vec<String> = spawn_line_reader(input, cancel.clone()).iter().collect();

        assert_eq!(lines, vec!["acquire", "quit"]);
        assert!(cancel.is_cancelled());
    }
}
