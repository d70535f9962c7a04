//! Scripted collaborators shared by the driver integration tests
//!
//! Every collaborator records what it was asked to do into an `Rc<RefCell<_>>`
//! handle the test keeps, so the driver can own the boxed collaborator while
//! the test inspects the calls afterwards.

#![allow(dead_code)]

use inflation_lattice_core_rs::{
    CheckpointArtifact, CheckpointSink, CurvaturePerturbationResult, DiagnosticsOptions, Domain,
    EngineError, EvolutionEngine, Exporter, FlushKind, FlushSeries, PostProcessError,
    PostProcessor, RunConfig, SimulationState, StorageError,
};
use std::cell::RefCell;
use std::rc::Rc;

// ============================================================================
// Configuration
// ============================================================================

/// Eight non-linear steps of 0.125 up to t = 1, checkpoint every 4 steps
pub fn base_config() -> RunConfig {
    RunConfig::from_json_str(
        r#"{
            "nonlinear": { "final_time": 1.0, "cadence": 4 },
            "lattice": { "time_step": 0.125, "homogeneous_time_step": 0.25 },
            "initial": { "scale_factor": 1.0, "fields": [1.0, 0.5], "rates": [-0.1, 0.0] }
        }"#,
    )
    .unwrap()
}

// ============================================================================
// Engine
// ============================================================================

/// One call into the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    HomogeneousStep { order: u8, dt: f64, scale_factor: f64 },
    Step { order: u8, dt: f64 },
    HomogeneousDiagnostics,
    Diagnostics { log: bool },
    Refresh,
    AdjustFields,
    AdjustMomenta,
    ToFourier,
    ToPosition,
    LinearStep,
    SyncLinearBackground,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// Engine whose Hubble rate follows a script
///
/// `adjust_momenta` sets H to `hubble[0]`; after the k-th lattice step of a
/// member H becomes `hubble[k]`, holding the last value once the script runs
/// out. An empty script keeps H at 1. Lattice steps advance time by `dt` and
/// the scale factor by a factor `1 + dt`.
pub struct ScriptedEngine {
    calls: CallLog,
    hubble: Vec<f64>,
    member: usize,
    steps_in_member: usize,
    fail_at: Option<(usize, usize)>,
    collapse_homogeneous: bool,
    linear_growth: f64,
}

impl ScriptedEngine {
    pub fn new() -> (Self, CallLog) {
        let calls: CallLog = Rc::new(RefCell::new(Vec::new()));
        let engine = Self {
            calls: Rc::clone(&calls),
            hubble: Vec::new(),
            member: 0,
            steps_in_member: 0,
            fail_at: None,
            collapse_homogeneous: false,
            linear_growth: 1.5,
        };
        (engine, calls)
    }

    pub fn with_hubble(mut self, hubble: &[f64]) -> Self {
        self.hubble = hubble.to_vec();
        self
    }

    /// Fail the `step`-th lattice step (0-based) of member `member`
    pub fn failing_at(mut self, member: usize, step: usize) -> Self {
        self.fail_at = Some((member, step));
        self
    }

    /// Drop the homogeneous scale factor to zero after the first step
    pub fn collapsing_homogeneous(mut self) -> Self {
        self.collapse_homogeneous = true;
        self
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn hubble_at(&self, k: usize) -> f64 {
        match self.hubble.len() {
            0 => 1.0,
            n => self.hubble[k.min(n - 1)],
        }
    }

    fn homogeneous(&mut self, order: u8, state: &mut SimulationState, dt: f64) {
        self.record(Call::HomogeneousStep {
            order,
            dt,
            scale_factor: state.homogeneous.scale_factor,
        });
        state.homogeneous.time += dt;
        state.homogeneous.scale_factor = if self.collapse_homogeneous {
            0.0
        } else {
            state.homogeneous.scale_factor + dt
        };
    }

    fn lattice(&mut self, order: u8, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        if self.fail_at == Some((self.member, self.steps_in_member)) {
            return Err(EngineError::new(format!(
                "scripted failure in member {} at step {}",
                self.member, self.steps_in_member
            )));
        }
        self.record(Call::Step { order, dt });
        self.steps_in_member += 1;
        state.lattice.time += dt;
        state.lattice.scale_factor *= 1.0 + dt;
        state.lattice.hubble = self.hubble_at(self.steps_in_member);
        for field in &mut state.fields {
            field.value += field.rate * dt;
        }
        Ok(())
    }
}

impl EvolutionEngine for ScriptedEngine {
    fn homogeneous_step_2(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.homogeneous(2, state, dt);
        Ok(())
    }

    fn homogeneous_step_4(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.homogeneous(4, state, dt);
        Ok(())
    }

    fn homogeneous_step_6(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.homogeneous(6, state, dt);
        Ok(())
    }

    fn homogeneous_step_8(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.homogeneous(8, state, dt);
        Ok(())
    }

    fn step_2(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.lattice(2, state, dt)
    }

    fn step_4(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.lattice(4, state, dt)
    }

    fn step_6(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.lattice(6, state, dt)
    }

    fn step_8(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.lattice(8, state, dt)
    }

    fn homogeneous_diagnostics(
        &mut self,
        state: &mut SimulationState,
        _options: DiagnosticsOptions,
    ) -> Result<(), EngineError> {
        self.record(Call::HomogeneousDiagnostics);
        state.homogeneous.rho = 3.0 * state.homogeneous.hubble.powi(2);
        Ok(())
    }

    fn diagnostics(
        &mut self,
        state: &mut SimulationState,
        options: DiagnosticsOptions,
    ) -> Result<(), EngineError> {
        self.record(Call::Diagnostics { log: options.log });
        state.lattice.rho = 3.0 * state.lattice.hubble.powi(2);
        // Energy ratio falls as H falls, so the curvature interpolation has
        // something to work with.
        let n = state.fields.len() as f64;
        for field in &mut state.fields {
            field.omega = state.lattice.hubble / (n * 100.0);
        }
        Ok(())
    }

    fn refresh(&mut self, _state: &mut SimulationState) -> Result<(), EngineError> {
        self.record(Call::Refresh);
        Ok(())
    }

    fn adjust_fields(&mut self, _state: &mut SimulationState) -> Result<(), EngineError> {
        self.record(Call::AdjustFields);
        Ok(())
    }

    fn adjust_momenta(&mut self, state: &mut SimulationState) -> Result<(), EngineError> {
        self.record(Call::AdjustMomenta);
        self.member += 1;
        self.steps_in_member = 0;
        state.lattice.hubble = self.hubble_at(0);
        Ok(())
    }

    fn to_fourier(&mut self, state: &mut SimulationState) -> Result<(), EngineError> {
        self.record(Call::ToFourier);
        state.domain = Domain::Fourier;
        Ok(())
    }

    fn to_position(&mut self, state: &mut SimulationState) -> Result<(), EngineError> {
        self.record(Call::ToPosition);
        state.domain = Domain::Position;
        Ok(())
    }

    fn linear_step(&mut self, state: &mut SimulationState) -> Result<u64, EngineError> {
        if state.domain != Domain::Fourier {
            return Err(EngineError::new("linear step outside Fourier domain"));
        }
        self.record(Call::LinearStep);
        state.lattice.scale_factor *= self.linear_growth;
        state.lattice.time += 0.01;
        Ok(3)
    }

    fn sync_linear_background(&mut self, _state: &mut SimulationState) -> Result<(), EngineError> {
        self.record(Call::SyncLinearBackground);
        Ok(())
    }
}

/// Lattice steps recorded so far, as (order, dt)
pub fn lattice_steps(calls: &CallLog) -> Vec<(u8, f64)> {
    calls
        .borrow()
        .iter()
        .filter_map(|c| match c {
            Call::Step { order, dt } => Some((*order, *dt)),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Sink, post-processor, exporter
// ============================================================================

/// One flush seen by the sink
#[derive(Debug, Clone, PartialEq)]
pub struct Flush {
    pub member: Option<usize>,
    pub step: u64,
    pub kind: FlushKind,
}

pub type FlushLog = Rc<RefCell<Vec<Flush>>>;

#[derive(Default)]
pub struct RecordingSink {
    flushes: FlushLog,
    next: u64,
}

impl RecordingSink {
    pub fn new() -> (Self, FlushLog) {
        let flushes: FlushLog = Rc::new(RefCell::new(Vec::new()));
        let sink = Self {
            flushes: Rc::clone(&flushes),
            next: 0,
        };
        (sink, flushes)
    }
}

impl CheckpointSink for RecordingSink {
    fn flush(
        &mut self,
        state: &SimulationState,
        member: usize,
        kind: FlushKind,
    ) -> Result<CheckpointArtifact, StorageError> {
        self.flushes.borrow_mut().push(Flush {
            member: Some(member),
            step: state.lattice.step,
            kind,
        });
        let sequence = self.next;
        self.next += 1;
        Ok(CheckpointArtifact::new(sequence, format!("memory/{}", sequence)))
    }

    fn flush_homogeneous(&mut self, state: &SimulationState) -> Result<(), StorageError> {
        self.flushes.borrow_mut().push(Flush {
            member: None,
            step: state.homogeneous.step,
            kind: FlushKind::Evolution,
        });
        Ok(())
    }
}

/// Artifact sequences handed to the post-processor
pub type ProcessedLog = Rc<RefCell<Vec<u64>>>;

pub struct RecordingPostProcessor {
    processed: ProcessedLog,
    fail_on: Option<u64>,
}

impl RecordingPostProcessor {
    pub fn new() -> (Self, ProcessedLog) {
        let processed: ProcessedLog = Rc::new(RefCell::new(Vec::new()));
        let post = Self {
            processed: Rc::clone(&processed),
            fail_on: None,
        };
        (post, processed)
    }

    pub fn failing_on(mut self, sequence: u64) -> Self {
        self.fail_on = Some(sequence);
        self
    }
}

impl PostProcessor for RecordingPostProcessor {
    fn process(
        &mut self,
        _state: &SimulationState,
        artifact: &CheckpointArtifact,
    ) -> Result<(), PostProcessError> {
        if self.fail_on == Some(artifact.sequence()) {
            return Err(PostProcessError::new("scripted spectra failure"));
        }
        self.processed.borrow_mut().push(artifact.sequence());
        Ok(())
    }
}

/// Everything the exporter was handed
#[derive(Debug, Default)]
pub struct Exports {
    pub homogeneous: Vec<usize>,
    pub members: Vec<(usize, usize)>,
    pub curvature: Vec<CurvaturePerturbationResult>,
}

pub type ExportLog = Rc<RefCell<Exports>>;

pub struct RecordingExporter {
    exports: ExportLog,
}

impl RecordingExporter {
    pub fn new() -> (Self, ExportLog) {
        let exports: ExportLog = Rc::new(RefCell::new(Exports::default()));
        let exporter = Self {
            exports: Rc::clone(&exports),
        };
        (exporter, exports)
    }
}

impl Exporter for RecordingExporter {
    fn export_homogeneous(&mut self, series: &FlushSeries) -> Result<(), StorageError> {
        self.exports.borrow_mut().homogeneous.push(series.len());
        Ok(())
    }

    /// Records (member, number of samples)
    fn export_member(&mut self, member: usize, series: &FlushSeries) -> Result<(), StorageError> {
        self.exports.borrow_mut().members.push((member, series.len()));
        Ok(())
    }

    fn append_curvature(&mut self, result: &CurvaturePerturbationResult) -> Result<(), StorageError> {
        self.exports.borrow_mut().curvature.push(*result);
        Ok(())
    }
}
