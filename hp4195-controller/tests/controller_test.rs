use std::thread::{self, JoinHandle};

use tempfile::TempDir;

use hp4195_controller::{AckTimeouts, Controller, ControllerError};
use hp4195_engine::persist::read_trace_csv;
use hp4195_engine::transport::{MockTransport, SimulatedTransport, TransportCall};
use hp4195_engine::{NoSettle, Transport, Worker, WorkerConfig};
use hp4195_messages::{Ack, Command, Failure, Hertz, NOT_CONNECTED};

// Test helpers to reduce boilerplate

fn setup<T>(transport: T) -> (Controller, JoinHandle<anyhow::Result<()>>)
where
    T: Transport + Send + 'static,
    T::Session: Send,
{
    let config = WorkerConfig::default();
    let (controller_link, worker_link) = hp4195_messages::channel();
    let worker = Worker::new(worker_link, transport, NoSettle, config.clone());
    let handle = thread::spawn(move || worker.run());
    (
        Controller::new(controller_link, AckTimeouts::from_config(&config)),
        handle,
    )
}

fn teardown(controller: Controller, handle: JoinHandle<anyhow::Result<()>>) {
    assert_eq!(controller.shutdown().unwrap(), Ack::Ok);
    handle
        .join()
        .expect("Worker thread should not panic")
        .expect("Worker should stop cleanly");
}

#[test]
fn test_connect_and_acquire_against_simulator() {
    let (mut controller, handle) = setup(SimulatedTransport::new().with_resonance(1_010_000.0, 200.0));

    assert_eq!(controller.connect().unwrap(), Ack::Ok);
    assert!(controller.state().connected);

    assert_eq!(
        controller
            .peak_scan(Hertz(1_000_000.0), Hertz(50_000.0))
            .unwrap(),
        Ack::Ok
    );
    let trace = controller.trace().expect("Acquisition should store a trace");
    assert_eq!(trace.len(), 401);

    let (peak, _) = controller.state_mut().mark_peak().unwrap();
    assert!((peak - 1_010_000.0).abs() < 500.0, "peak at {peak}");

    teardown(controller, handle);
}

#[test]
fn test_center_on_peak_moves_center() {
    let transport = MockTransport::hp4195a();
    let log = transport.clone();
    let (mut controller, handle) = setup(transport);

    assert!(matches!(
        controller.center_on_peak(),
        Err(ControllerError::NoTrace)
    ));

    controller.connect().unwrap();
    controller.acquire().unwrap();
    log.clear_calls();
    assert_eq!(controller.center_on_peak().unwrap(), Ack::Ok);

    // the mock trace peaks at -3.25 dB, 1005000 Hz
    assert_eq!(
        log.calls().first(),
        Some(&TransportCall::Write("CENTER = 1005000 HZ".into()))
    );

    teardown(controller, handle);
}

#[test]
fn test_range_scan_skips_acquire_on_failure() {
    let transport = MockTransport::hp4195a();
    let log = transport.clone();
    let (mut controller, handle) = setup(transport);
    controller.connect().unwrap();
    log.clear_calls();

    assert_eq!(
        controller
            .range_scan(Hertz(2_000.0), Hertz(1_000.0))
            .unwrap(),
        Ack::Failed(Failure::InvalidParameters)
    );
    assert!(log.calls().is_empty());
    assert!(controller.trace().is_none());

    teardown(controller, handle);
}

#[test]
fn test_unknown_line_is_dropped() {
    let (mut controller, handle) = setup(MockTransport::hp4195a());

    assert_eq!(controller.submit_line("frobnicate 12").unwrap(), None);
    // the next acknowledgement still belongs to the next command
    assert_eq!(controller.submit_line("connect").unwrap(), Some(Ack::Ok));
    assert!(matches!(
        controller.submit_line("center"),
        Err(ControllerError::Parse(_))
    ));

    teardown(controller, handle);
}

#[test]
fn test_send_raw_returns_sentinel() {
    let (mut controller, handle) = setup(MockTransport::hp4195a());

    assert_eq!(
        controller.send_raw("ID?").unwrap().as_deref(),
        Some(NOT_CONNECTED)
    );
    controller.connect().unwrap();
    assert_eq!(
        controller.send_raw("ID?").unwrap().as_deref(),
        Some("HP4195A")
    );

    teardown(controller, handle);
}

#[test]
fn test_amplitude_sweep_from_text_and_save() {
    let dir = TempDir::new().unwrap();
    let (mut controller, handle) = setup(SimulatedTransport::new());
    controller.connect().unwrap();

    let line = format!("amplitude_sweep -20 -10 5 100 {}", dir.path().display());
    assert_eq!(controller.submit_line(&line).unwrap(), Some(Ack::Ok));

    let amplitudes: Vec<f64> = controller
        .state()
        .sweep
        .iter()
        .map(|curve| curve.amplitude.0)
        .collect();
    assert_eq!(amplitudes, vec![-20.0, -15.0, -10.0]);

    let saved = read_trace_csv(&dir.path().join("amplitude_sweep_-15dBm.csv")).unwrap();
    assert_eq!(saved.frequency(), controller.state().sweep[1].frequency.as_slice());

    controller.acquire().unwrap();
    let path = dir.path().join("snapshot.csv");
    controller.state().save_trace(&path).unwrap();
    assert_eq!(read_trace_csv(&path).unwrap().len(), 401);

    teardown(controller, handle);
}

#[test]
fn test_sweep_timeout_covers_settle_time() {
    let timeouts = AckTimeouts::from_config(&WorkerConfig::default());
    let params = "amplitude_sweep -10 0 5 10 /tmp".parse::<Command>().unwrap();

    // three steps at 10 Hz settle for 218 s each
    assert!(timeouts.for_command(&params).as_secs() >= 3 * 218);
    assert!(timeouts.for_command(&Command::LowResSweep).as_secs() >= 218);
    assert!(timeouts.for_command(&Command::Connect).as_secs() < 218);
}

#[test]
fn test_unbounded_sweep_is_rejected_not_fatal() {
    let dir = TempDir::new().unwrap();
    let transport = MockTransport::hp4195a();
    let log = transport.clone();
    let (mut controller, handle) = setup(transport);
    controller.connect().unwrap();
    log.clear_calls();

    let timeouts = AckTimeouts::from_config(&WorkerConfig::default());
    let connect = timeouts.for_command(&Command::Connect);
    for step in ["0", "1e-300"] {
        let line = format!("amplitude_sweep -10 0 {step} 100 {}", dir.path().display());
        let command = line.parse::<Command>().unwrap();
        assert_eq!(timeouts.for_command(&command), connect);

        assert_eq!(
            controller.submit_line(&line).unwrap(),
            Some(Ack::Failed(Failure::InvalidParameters))
        );
    }
    assert!(log.calls().is_empty());
    assert!(controller.state().sweep.is_empty());

    teardown(controller, handle);
}

#[test]
fn test_non_finite_frequency_is_a_parse_error() {
    let (mut controller, handle) = setup(MockTransport::hp4195a());

    assert!(matches!(
        controller.submit_line("center inf"),
        Err(ControllerError::Parse(_))
    ));
    assert!(matches!(
        controller.submit_line("start_stop NaN 1e6"),
        Err(ControllerError::Parse(_))
    ));

    teardown(controller, handle);
}
