//! Sweep orchestrator: the low-resolution sweep and the stepped amplitude sweep.
//!
//! Both workflows move through the same stages:
//! `SettingParameters -> Triggered -> Settling -> Acquiring`, followed by
//! `Persisting` for amplitude steps, and end in either `Done` or `Aborted`.
//! There is no retry; the first failure aborts the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hp4195_messages::{Dbm, Hertz, SweepParams, Trace};
use log::{debug, info, warn};

use crate::acquisition::acquire_trace;
use crate::connection::write;
use crate::error::WorkerError;
use crate::gpib::Setting;
use crate::persist::{sweep_file_path, write_trace_csv};
use crate::settle::Settle;
use crate::transport::Session;

/// Shared flag that stops an amplitude sweep between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    SettingParameters,
    Triggered,
    Settling,
    Acquiring,
    Persisting,
}

fn enter(stage: Stage) {
    debug!("Sweep stage: {:?}", stage);
}

/// Traces collected by a completed amplitude sweep, in step order.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRun {
    pub output_dir: PathBuf,
    pub steps: Vec<(Dbm, Trace)>,
}

impl SweepRun {
    fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            steps: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// Trigger one single sweep, wait for it and read it back.
fn capture<S: Session, W: Settle>(
    session: &mut S,
    settle: &mut W,
    rbw: Hertz,
) -> Result<Trace, WorkerError> {
    write(session, Setting::SingleSweepMode)?;
    write(session, Setting::Trigger)?;
    enter(Stage::Triggered);

    enter(Stage::Settling);
    settle.wait_for_settle(rbw);

    enter(Stage::Acquiring);
    Ok(acquire_trace(session)?)
}

/// Sweep once at the coarse bandwidth `low`, then put `normal` back.
///
/// The normal bandwidth is restored whether or not the sweep succeeded. A
/// failed restore is logged but does not fail an otherwise good sweep.
pub fn low_res_sweep<S: Session, W: Settle>(
    session: &mut S,
    settle: &mut W,
    low: Hertz,
    normal: Hertz,
) -> Result<Trace, WorkerError> {
    info!("Low resolution sweep at {}", low);
    enter(Stage::SettingParameters);
    let result = write(session, Setting::Rbw(low))
        .map_err(WorkerError::from)
        .and_then(|()| capture(session, settle, low));

    if let Err(e) = write(session, Setting::Rbw(normal)) {
        warn!("Could not restore resolution bandwidth to {}: {}", normal, e);
    }
    result
}

/// Step the oscillator amplitude from `params.start` to `params.stop`.
///
/// Every step writes `OSC1`, sweeps, hands the trace to `on_step` and saves
/// it under `params.output_dir`. The first failing step aborts the run, and
/// `cancel` is checked before each step after the first.
pub fn amplitude_sweep<S, W, F>(
    session: &mut S,
    settle: &mut W,
    params: &SweepParams,
    cancel: &CancelToken,
    mut on_step: F,
) -> Result<SweepRun, WorkerError>
where
    S: Session,
    W: Settle,
    F: FnMut(Dbm, &Trace),
{
    let amplitudes = params.amplitudes()?;
    cancel.reset();

    let steps = amplitudes.len();
    info!(
        "Amplitude sweep from {} to {} in steps of {} ({} steps at {})",
        params.start, params.stop, params.step, steps, params.resolution
    );

    enter(Stage::SettingParameters);
    write(session, Setting::Rbw(params.resolution))?;

    let mut run = SweepRun::new(params.output_dir.clone());
    for (index, amplitude) in amplitudes.enumerate() {
        if index > 0 && cancel.is_cancelled() {
            info!("Amplitude sweep cancelled after {} of {} steps", index, steps);
            return Err(WorkerError::Cancelled { completed: index });
        }
        info!("Sweeping at {} ({}/{})", amplitude, index + 1, steps);

        enter(Stage::SettingParameters);
        write(session, Setting::Osc1(amplitude))?;
        let trace = capture(session, settle, params.resolution)?;
        on_step(amplitude, &trace);

        enter(Stage::Persisting);
        let path = sweep_file_path(&params.output_dir, amplitude);
        write_trace_csv(&path, &trace)
            .map_err(|source| WorkerError::Persistence { path, source })?;

        run.steps.push((amplitude, trace));
    }

    info!("Amplitude sweep finished, {} steps saved", run.len());
    Ok(run)
}
