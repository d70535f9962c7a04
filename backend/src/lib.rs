//! Inflation Lattice Core - Rust Engine
//!
//! Drives lattice simulations of early-universe scalar fields through a
//! homogeneous background solve, an optional linearized pre-phase and a
//! non-linear evolution, over an ensemble of independent runs.
//!
//! # Architecture
//!
//! - **core**: Run configuration, checkpoint scheduling, timing
//! - **models**: Simulation state, flushed series, driver event log
//! - **engine**: Collaborator contracts, order dispatch, zero-mode engine
//! - **orchestrator**: Phase loops, termination, checkpoint sink
//! - **curvature**: Curvature perturbation interpolation
//! - **export**: CSV export of flushed series
//!
//! # Critical Invariants
//!
//! 1. The integrator order is fixed per phase before the loop starts
//! 2. Checkpoints fire when `step % cadence == 0`, evaluated before stepping
//! 3. A densified cadence never reverts within a member
//! 4. Every member starts from the same initial conditions

// Module declarations
pub mod core;
pub mod curvature;
pub mod engine;
pub mod export;
pub mod models;
pub mod orchestrator;

// Re-exports for convenience
pub use crate::core::config::{
    ConfigError, FailurePolicy, HomogeneousConfig, InitialConditions, IntegratorOrder,
    LatticeConfig, LinearPhaseConfig, NonLinearConfig, RunConfig, TerminationMode,
};
pub use crate::core::schedule::CheckpointSchedule;
pub use crate::core::timing::{ScopedTimer, StepTally, TimerError, TimingSummary, WallClockTimer};
pub use curvature::{CurvatureError, CurvaturePerturbationResult};
pub use engine::{
    CheckpointArtifact, CheckpointSink, DiagnosticsOptions, EngineError, EvolutionEngine,
    FlushKind, NoPostProcessing, Phase, PostProcessError, PostProcessor, StorageError, Stepper,
    ZeroModeEngine, ZeroModeParams,
};
pub use export::{CsvExporter, Exporter, NullExporter};
pub use models::{
    event::{DriverEvent, EventLog},
    series::{FlushSample, FlushSeries},
    state::{Clock, Domain, FieldState, SimulationState},
};
pub use orchestrator::{
    CheckpointSnapshot, Driver, DriverError, HomogeneousReport, JsonCheckpointSink, MemberFailure,
    MemberReport, MemberStatus, RunReport,
};
