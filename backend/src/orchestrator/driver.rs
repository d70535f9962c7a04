//! Driver - Simulation orchestration
//!
//! Sequences the collaborators into a complete run:
//!
//! ```text
//! timer.start()
//! [homogeneous solve]                    (once, if enabled)
//! for member in 1..=ensemble_size:
//!     re-initialize from initial conditions
//!     [linearized pre-phase]             (if enabled)
//!     non-linear loop: checkpoint when step % cadence == 0, then step
//!     final diagnostics + flush + post-process
//!     [curvature interpolation]          (if enabled)
//! timer.stop()
//! [CSV export of every member]           (if enabled)
//! ```
//!
//! Everything runs synchronously on the calling thread. Parallelism, if
//! any, lives inside the engine.
//!
//! The phase loops are implemented in `homogeneous.rs`, `member.rs` and
//! `ensemble.rs` as further `impl Driver` blocks.

use crate::core::config::{ConfigError, RunConfig};
use crate::core::timing::{ScopedTimer, StepTally, TimerError, TimingSummary, WallClockTimer};
use crate::curvature::{CurvatureError, CurvaturePerturbationResult};
use crate::engine::{
    CheckpointSink, DiagnosticsOptions, EngineError, EvolutionEngine, NoPostProcessing, Phase,
    PostProcessError, PostProcessor, StorageError,
};
use crate::export::{Exporter, NullExporter};
use crate::models::event::{DriverEvent, EventLog};
use crate::models::series::FlushSeries;
use crate::models::state::SimulationState;
use serde::Serialize;
use tracing::info;

// ============================================================================
// Errors
// ============================================================================

/// Reasons a run stops early
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{phase} engine call failed: {source}")]
    Engine {
        phase: Phase,
        #[source]
        source: EngineError,
    },

    #[error("checkpoint flush failed: {0}")]
    Checkpoint(#[source] StorageError),

    #[error("post-processing failed at step {step}: {source}")]
    PostProcess {
        step: u64,
        #[source]
        source: PostProcessError,
    },

    #[error("export failed: {0}")]
    Export(#[source] StorageError),

    #[error("homogeneous step size is not positive at step {step} (a = {scale_factor}, dt = {dt})")]
    NonPositiveStep { step: u64, scale_factor: f64, dt: f64 },

    #[error("{phase} loop exceeded its budget of {budget} steps")]
    StepBudgetExceeded { phase: Phase, budget: u64 },

    #[error(transparent)]
    Curvature(#[from] CurvatureError),

    #[error(transparent)]
    Timer(#[from] TimerError),
}

impl DriverError {
    pub(crate) fn engine(phase: Phase) -> impl Fn(EngineError) -> DriverError {
        move |source| DriverError::Engine { phase, source }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of the homogeneous solve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomogeneousReport {
    pub steps: u64,
    pub checkpoints: usize,
    pub final_time: f64,
    pub final_scale_factor: f64,
    pub final_hubble: f64,
}

/// How a member ended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MemberStatus {
    Completed,
    Failed { reason: String },
}

/// Outcome of one ensemble member
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberReport {
    /// Member number, starting at 1
    pub member: usize,
    pub status: MemberStatus,
    /// Sub-steps taken by the linearized pre-phase
    pub linear_substeps: u64,
    /// Steps taken by the non-linear loop
    pub nonlinear_steps: u64,
    /// Flushes, including the final one
    pub checkpoints: usize,
    pub post_processed: usize,
    /// Step at which the cadence was densified, if it was
    pub densified_at: Option<u64>,
    pub final_time: f64,
    pub final_scale_factor: f64,
    pub final_hubble: f64,
    pub curvature: Option<CurvaturePerturbationResult>,
    /// Flushed series of this member
    pub series: FlushSeries,
}

impl MemberReport {
    pub fn is_completed(&self) -> bool {
        self.status == MemberStatus::Completed
    }

    pub(crate) fn failed(
        member: usize,
        reason: String,
        linear_substeps: u64,
        state: &mut SimulationState,
    ) -> Self {
        Self {
            member,
            status: MemberStatus::Failed { reason },
            linear_substeps,
            nonlinear_steps: state.lattice.step,
            checkpoints: 0,
            post_processed: 0,
            densified_at: None,
            final_time: state.lattice.time,
            final_scale_factor: state.lattice.scale_factor,
            final_hubble: state.lattice.hubble,
            curvature: None,
            series: state.take_series(),
        }
    }
}

/// A member that stopped early
#[derive(Debug)]
pub struct MemberFailure {
    pub error: DriverError,
    /// Linear sub-steps taken before the failure
    pub linear_substeps: u64,
    /// Incoming tally plus every step the member took
    pub tally: StepTally,
}

/// Outcome of a complete run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub homogeneous: Option<HomogeneousReport>,
    pub members: Vec<MemberReport>,
    /// Grand step total over every phase and member
    pub tally: StepTally,
    pub timing: TimingSummary,
    /// SHA256 of the configuration that produced this run
    pub config_fingerprint: String,
}

impl RunReport {
    /// Curvature results of every member that produced one
    pub fn curvature_results(&self) -> Vec<CurvaturePerturbationResult> {
        self.members.iter().filter_map(|m| m.curvature).collect()
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Owns the collaborators and sequences a run
///
/// # Example
///
/// ```rust
/// use inflation_lattice_core_rs::{
///     Driver, JsonCheckpointSink, RunConfig, SimulationState, ZeroModeEngine, ZeroModeParams,
/// };
///
/// let config = RunConfig::from_json_str(r#"{
///     "nonlinear": { "final_time": 0.5, "cadence": 10 },
///     "lattice": { "time_step": 0.01, "homogeneous_time_step": 0.01 },
///     "initial": { "scale_factor": 1.0, "fields": [3.0], "rates": [0.0] }
/// }"#).unwrap();
///
/// let engine = ZeroModeEngine::new(ZeroModeParams {
///     masses_squared: vec![1.0],
///     coupling_squared: 0.0,
///     linear_time_step: 0.01,
///     linear_substeps: 4,
/// }).unwrap();
///
/// let dir = std::env::temp_dir().join("inflation-lattice-doctest");
/// let sink = JsonCheckpointSink::new(&dir, config.fingerprint().unwrap());
///
/// let mut state = SimulationState::new(&config.initial);
/// let mut driver = Driver::new(config, Box::new(engine), Box::new(sink)).unwrap();
/// let report = driver.run(&mut state).unwrap();
///
/// assert_eq!(report.members.len(), 1);
/// assert!(report.tally.total() > 0);
/// ```
pub struct Driver {
    config: RunConfig,
    fingerprint: String,
    pub(crate) engine: Box<dyn EvolutionEngine>,
    pub(crate) sink: Box<dyn CheckpointSink>,
    pub(crate) post_processor: Box<dyn PostProcessor>,
    pub(crate) exporter: Box<dyn Exporter>,
    timer: Box<dyn ScopedTimer>,
    diagnostics: DiagnosticsOptions,
    event_log: EventLog,
}

impl Driver {
    /// Create a driver for a validated configuration
    ///
    /// Post-processing defaults to [`NoPostProcessing`], export to
    /// [`NullExporter`] and timing to [`WallClockTimer`].
    pub fn new(
        config: RunConfig,
        engine: Box<dyn EvolutionEngine>,
        sink: Box<dyn CheckpointSink>,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        let fingerprint = config.fingerprint()?;

        Ok(Self {
            config,
            fingerprint,
            engine,
            sink,
            post_processor: Box::new(NoPostProcessing),
            exporter: Box::new(NullExporter),
            timer: Box::new(WallClockTimer::new()),
            diagnostics: DiagnosticsOptions::logged(),
            event_log: EventLog::new(),
        })
    }

    pub fn with_post_processor(mut self, post_processor: Box<dyn PostProcessor>) -> Self {
        self.post_processor = post_processor;
        self
    }

    pub fn with_exporter(mut self, exporter: Box<dyn Exporter>) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn with_timer(mut self, timer: Box<dyn ScopedTimer>) -> Self {
        self.timer = timer;
        self
    }

    /// Flags passed to diagnostics recomputed at checkpoints
    pub fn with_diagnostics(mut self, options: DiagnosticsOptions) -> Self {
        self.diagnostics = options;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// SHA256 of the configuration
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub(crate) fn diagnostics(&self) -> DiagnosticsOptions {
        self.diagnostics
    }

    pub(crate) fn log_event(&mut self, event: DriverEvent) {
        self.event_log.log(event);
    }

    /// Fail once a loop has used up the configured step budget
    pub(crate) fn check_budget(&self, phase: Phase, steps_taken: u64) -> Result<(), DriverError> {
        match self.config.max_steps {
            Some(budget) if steps_taken >= budget => {
                Err(DriverError::StepBudgetExceeded { phase, budget })
            }
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Run
    // ========================================================================

    /// Run the homogeneous solve and the ensemble inside one timer region
    ///
    /// `state` must have been built from `config().initial`; each member is
    /// re-initialized from those initial conditions before it starts.
    pub fn run(&mut self, state: &mut SimulationState) -> Result<RunReport, DriverError> {
        self.timer.start()?;
        let mut tally = StepTally::new();

        let homogeneous = if self.config.homogeneous.enabled {
            let (report, updated) = self.run_homogeneous(state, tally)?;
            tally = updated;
            self.exporter
                .export_homogeneous(&state.homogeneous_series)
                .map_err(DriverError::Export)?;
            Some(report)
        } else {
            None
        };

        let members = if self.config.nonlinear.enabled {
            let (members, updated) = self.run_ensemble(state, tally)?;
            tally = updated;
            members
        } else {
            Vec::new()
        };

        self.timer.stop()?;
        let timing = TimingSummary::new(self.timer.elapsed()?, &tally);

        info!(
            "Run finished: {} steps in {:.3} s ({} per step)",
            timing.total_steps,
            timing.elapsed.as_secs_f64(),
            timing
                .seconds_per_step
                .map(|s| format!("{:.3e} s", s))
                .unwrap_or_else(|| "n/a".to_string())
        );

        if self.config.csv_export {
            self.export_members(&members)?;
        }

        Ok(RunReport {
            homogeneous,
            members,
            tally,
            timing,
            config_fingerprint: self.fingerprint.clone(),
        })
    }
}
