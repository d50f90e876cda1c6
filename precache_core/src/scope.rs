//! Capture and setup scopes
//!
//! A [`Precompiler`] ties one unit to the phase oracle, the mode flags, the
//! dispatch monitor, the host execution engine and a directive sink.
//!
//! - [`Precompiler::compile_workload`] gates, forces compilation, records
//!   every dynamic dispatch made by the body and emits the recorded
//!   signatures, on success and on failure alike.
//! - [`Precompiler::setup_workload`] only gates. Use it to build fixtures for
//!   a nested capture without recording the fixture code itself.
//!
//! Only one capture may be armed per process. Nested captures on the same
//! thread flow into the outermost one, which is the only one that emits.

use crate::error::{PrecacheError, Result};
use crate::flags::{FlagSnapshot, ModeFlags};
use crate::lockout::{ExecutionEngine, InterpreterLockout};
use crate::monitor::{DispatchBus, DispatchMonitor, Nesting};
use crate::phase::PhaseOracle;
use crate::sink::DirectiveSink;
use crate::types::CallSignature;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Summary of one finished outermost capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub unit: String,
    pub artifact: String,
    /// Distinct signatures handed to the sink
    pub signatures: usize,
    pub elapsed: Duration,
}

/// Runs workloads for one unit under the capture gate
#[derive(Clone)]
pub struct Precompiler {
    unit: String,
    artifact: String,
    oracle: Arc<dyn PhaseOracle>,
    flags: Arc<ModeFlags>,
    monitor: Arc<DispatchMonitor>,
    engine: Arc<dyn ExecutionEngine>,
    sink: Arc<dyn DirectiveSink>,
}

impl Precompiler {
    /// Create a precompiler whose host provides both the dispatch hook point
    /// and the execution-mode switch
    pub fn new<H>(
        unit: impl Into<String>,
        oracle: Arc<dyn PhaseOracle>,
        flags: Arc<ModeFlags>,
        host: Arc<H>,
        sink: Arc<dyn DirectiveSink>,
    ) -> Self
    where
        H: DispatchBus + ExecutionEngine + 'static,
    {
        let monitor = Arc::new(DispatchMonitor::new(host.clone()));
        Self::with_parts(unit, oracle, flags, monitor, host, sink)
    }

    /// Create a precompiler from individually supplied collaborators
    pub fn with_parts(
        unit: impl Into<String>,
        oracle: Arc<dyn PhaseOracle>,
        flags: Arc<ModeFlags>,
        monitor: Arc<DispatchMonitor>,
        engine: Arc<dyn ExecutionEngine>,
        sink: Arc<dyn DirectiveSink>,
    ) -> Self {
        let unit = unit.into();
        Self {
            artifact: unit.clone(),
            unit,
            oracle,
            flags,
            monitor,
            engine,
            sink,
        }
    }

    /// Emit under a different artifact identifier (defaults to the unit name)
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = artifact.into();
        self
    }

    /// Another unit sharing this process's monitor, flags and sink
    pub fn for_unit(&self, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        Self {
            artifact: unit.clone(),
            unit,
            ..self.clone()
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn flags(&self) -> &ModeFlags {
        &self.flags
    }

    pub fn monitor(&self) -> &DispatchMonitor {
        &self.monitor
    }

    /// Whether workloads for this unit run in this process
    pub fn workload_enabled(&self) -> bool {
        self.gate().is_some()
    }

    /// Sample the phase and the flags once and decide
    fn gate(&self) -> Option<FlagSnapshot> {
        let phase = match self.oracle.phase() {
            Ok(phase) => phase,
            Err(e) => {
                tracing::warn!("{}; not running workloads for unit {}", e, self.unit);
                return None;
            }
        };

        let flags = self.flags.snapshot();
        if flags.should_run(&self.unit, phase) {
            Some(flags)
        } else {
            tracing::debug!("Workloads for unit {} gated off in {} phase", self.unit, phase);
            None
        }
    }

    /// Run fixture code under the gate without capturing it.
    ///
    /// Returns `Ok(None)` without calling `body` when the gate is closed.
    pub fn setup_workload<T, E, F>(&self, body: F) -> std::result::Result<Option<T>, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
    {
        if self.gate().is_none() {
            return Ok(None);
        }
        body().map(Some)
    }

    /// Run a workload and capture every dynamic dispatch it reaches.
    ///
    /// Returns `Ok(None)` without calling `body` when the gate is closed. A
    /// failing body still has its partial capture emitted before its error is
    /// returned. If emission fails as well, the body's error wins and the
    /// emission error is logged.
    pub fn compile_workload<T, E, F>(&self, body: F) -> std::result::Result<Option<T>, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<PrecacheError>,
    {
        let Some(guard) = self.begin_capture()? else {
            return Ok(None);
        };

        let outcome = body();
        let emitted = guard.finish();

        match (outcome, emitted) {
            (Ok(value), Ok(_)) => Ok(Some(value)),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(_)) => {
                tracing::warn!(
                    "Workload for unit {} failed; partial capture was emitted",
                    self.unit
                );
                Err(e)
            }
            (Err(e), Err(emit_err)) => {
                tracing::error!(
                    "Emission for unit {} failed after workload failure: {}",
                    self.unit,
                    emit_err
                );
                Err(e)
            }
        }
    }

    /// Arm a capture and hand back the guard that disarms it.
    ///
    /// `Ok(None)` means the gate is closed and nothing was armed. The monitor
    /// is claimed before the lockout, so a capture rejected for reentrancy
    /// never touches the host's compile mode.
    pub fn begin_capture(&self) -> Result<Option<CaptureGuard<'_>>> {
        let Some(flags) = self.gate() else {
            return Ok(None);
        };

        let nesting = self.monitor.begin(&self.unit, flags.verbose)?;
        let lockout = InterpreterLockout::enable(self.engine.clone());

        Ok(Some(CaptureGuard {
            precompiler: self,
            lockout: Some(lockout),
            nesting,
            started: Instant::now(),
            finished: false,
        }))
    }

    fn emit(&self, signatures: &[CallSignature]) -> Result<()> {
        tracing::debug!(
            "Emitting {} signatures for unit {} to artifact {}",
            signatures.len(),
            self.unit,
            self.artifact
        );
        self.sink.emit(&self.artifact, signatures)
    }
}

/// An armed capture.
///
/// [`CaptureGuard::finish`] disarms and emits. Dropping an unfinished guard,
/// e.g. while unwinding, does the same and logs emission failures.
#[must_use = "the capture is disarmed as soon as the guard is dropped"]
pub struct CaptureGuard<'a> {
    precompiler: &'a Precompiler,
    lockout: Option<InterpreterLockout>,
    nesting: Nesting,
    started: Instant,
    finished: bool,
}

impl CaptureGuard<'_> {
    /// Whether this guard installed the host hook
    pub fn is_outermost(&self) -> bool {
        self.nesting == Nesting::Outermost
    }

    /// Disarm and emit.
    ///
    /// Returns a report for the outermost capture, `None` for nested ones
    /// whose signatures went to the enclosing capture.
    pub fn finish(mut self) -> Result<Option<CaptureReport>> {
        self.finished = true;
        self.disarm()
    }

    fn disarm(&mut self) -> Result<Option<CaptureReport>> {
        let set = self.precompiler.monitor.end();
        if let Some(lockout) = self.lockout.take() {
            lockout.disable();
        }

        let Some(mut set) = set else {
            return Ok(None);
        };

        let signatures = set.drain();
        self.precompiler.emit(&signatures)?;

        let report = CaptureReport {
            unit: self.precompiler.unit.clone(),
            artifact: self.precompiler.artifact.clone(),
            signatures: signatures.len(),
            elapsed: self.started.elapsed(),
        };
        tracing::debug!(
            "Captured {} signatures for unit {} in {:?}",
            report.signatures,
            report.unit,
            report.elapsed
        );
        Ok(Some(report))
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.disarm() {
            tracing::error!(
                "Emission for unit {} failed while unwinding: {}",
                self.precompiler.unit,
                e
            );
        }
    }
}
