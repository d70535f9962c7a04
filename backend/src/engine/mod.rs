//! Collaborator contracts
//!
//! The driver never does field arithmetic itself. It sequences calls into
//! three collaborators:
//!
//! - [`EvolutionEngine`]: one stepping operation per (phase, order) pair,
//!   diagnostics, domain transforms and post-reinit adjustments
//! - [`CheckpointSink`]: serializes state and hands back an opaque
//!   [`CheckpointArtifact`]
//! - [`PostProcessor`]: consumes an artifact synchronously
//!
//! Every call is fallible; the driver decides what a failure means for the
//! ensemble.

pub mod dispatch;
pub mod zero_mode;

use crate::models::state::SimulationState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use dispatch::{StepFn, Stepper};
pub use zero_mode::{ZeroModeEngine, ZeroModeParams};

/// Integration phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Zero-mode background only
    Homogeneous,
    /// Linearized perturbations in Fourier space
    Linear,
    /// Full lattice evolution
    NonLinear,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Homogeneous => write!(f, "homogeneous"),
            Phase::Linear => write!(f, "linear"),
            Phase::NonLinear => write!(f, "non-linear"),
        }
    }
}

/// Failure inside the evolution engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Failure writing a checkpoint or an export
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl StorageError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Failure inside the post-processor
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct PostProcessError(String);

impl PostProcessError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Flags for a diagnostics recomputation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticsOptions {
    /// Log the recomputed energy density and Hubble rate
    pub log: bool,
    /// Also log the equation of state
    pub log_equation_of_state: bool,
}

impl DiagnosticsOptions {
    pub fn quiet() -> Self {
        Self::default()
    }

    pub fn logged() -> Self {
        Self {
            log: true,
            log_equation_of_state: false,
        }
    }
}

/// Time-stepping engine for the coupled field system
///
/// Step methods advance the relevant clock (time, scale factor, Hubble rate)
/// and fields by exactly one step of size `dt`; the driver owns the step
/// counters. `homogeneous_*` methods act on `state.homogeneous` and
/// `state.homogeneous_fields`, all others on `state.lattice` and
/// `state.fields`.
pub trait EvolutionEngine {
    fn homogeneous_step_2(&mut self, state: &mut SimulationState, dt: f64)
        -> Result<(), EngineError>;
    fn homogeneous_step_4(&mut self, state: &mut SimulationState, dt: f64)
        -> Result<(), EngineError>;
    fn homogeneous_step_6(&mut self, state: &mut SimulationState, dt: f64)
        -> Result<(), EngineError>;
    fn homogeneous_step_8(&mut self, state: &mut SimulationState, dt: f64)
        -> Result<(), EngineError>;

    fn step_2(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError>;
    fn step_4(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError>;
    fn step_6(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError>;
    fn step_8(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError>;

    /// Recompute homogeneous energy density and pressure
    fn homogeneous_diagnostics(
        &mut self,
        state: &mut SimulationState,
        options: DiagnosticsOptions,
    ) -> Result<(), EngineError>;

    /// Recompute lattice energy density, pressure and per-field ratios
    fn diagnostics(
        &mut self,
        state: &mut SimulationState,
        options: DiagnosticsOptions,
    ) -> Result<(), EngineError>;

    /// Rebuild engine-internal caches from the current state
    fn refresh(&mut self, state: &mut SimulationState) -> Result<(), EngineError>;

    /// Post-reinit field adjustment
    fn adjust_fields(&mut self, state: &mut SimulationState) -> Result<(), EngineError>;

    /// Post-reinit momentum adjustment, after diagnostics
    fn adjust_momenta(&mut self, state: &mut SimulationState) -> Result<(), EngineError>;

    /// Move the perturbations into Fourier-mode representation
    fn to_fourier(&mut self, state: &mut SimulationState) -> Result<(), EngineError>;

    /// Move the perturbations back to position space
    fn to_position(&mut self, state: &mut SimulationState) -> Result<(), EngineError>;

    /// Advance every mode by one linearized step; returns sub-steps taken
    fn linear_step(&mut self, state: &mut SimulationState) -> Result<u64, EngineError>;

    /// Re-derive background energy and pressure from the evolved modes
    fn sync_linear_background(&mut self, state: &mut SimulationState)
        -> Result<(), EngineError>;
}

/// Handle to a flushed checkpoint
///
/// The driver only passes it on to the post-processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointArtifact {
    sequence: u64,
    location: PathBuf,
}

impl CheckpointArtifact {
    pub fn new(sequence: u64, location: impl Into<PathBuf>) -> Self {
        Self {
            sequence,
            location: location.into(),
        }
    }

    /// Flush number within the sink
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Where the sink stored the checkpoint
    pub fn location(&self) -> &Path {
        &self.location
    }
}

/// Whether a flush belongs to the evolution history or is the terminal one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushKind {
    Evolution,
    Final,
}

/// Durable storage for checkpoints
pub trait CheckpointSink {
    /// Write the lattice state of `member` and return a handle to it
    fn flush(
        &mut self,
        state: &SimulationState,
        member: usize,
        kind: FlushKind,
    ) -> Result<CheckpointArtifact, StorageError>;

    /// Write the homogeneous state
    fn flush_homogeneous(&mut self, state: &SimulationState) -> Result<(), StorageError>;
}

/// Spectra and statistics computed from a checkpoint
pub trait PostProcessor {
    fn process(
        &mut self,
        state: &SimulationState,
        artifact: &CheckpointArtifact,
    ) -> Result<(), PostProcessError>;
}

/// Post-processor that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPostProcessing;

impl PostProcessor for NoPostProcessing {
    fn process(
        &mut self,
        _state: &SimulationState,
        _artifact: &CheckpointArtifact,
    ) -> Result<(), PostProcessError> {
        Ok(())
    }
}
