//! Simulation State
//!
//! Mutable state of one ensemble member: the lattice clock, the separate
//! homogeneous clock, spatially-averaged field values, and the flushed time
//! series used afterwards for curvature interpolation and CSV export.
//!
//! The full lattice field arrays belong to the evolution engine; this struct
//! only mirrors the averages the driver and exporters need.
//!
//! # Critical Invariants
//!
//! 1. **Separate counters**: `lattice.step` and `homogeneous.step` never merge
//! 2. **Monotonic steps**: step counters only increase within a member
//! 3. **Clean re-initialization**: `reinitialize()` starts from the ensemble's
//!    initial conditions, never from previously evolved values

use crate::core::config::InitialConditions;
use crate::models::series::{FlushSample, FlushSeries};
use serde::{Deserialize, Serialize};

/// Evolution clock and background quantities for one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    /// Simulated time
    pub time: f64,
    /// Steps completed in this phase
    pub step: u64,
    /// Scale factor a
    pub scale_factor: f64,
    /// Hubble rate H = ȧ/a
    pub hubble: f64,
    /// Mean energy density
    pub rho: f64,
    /// Mean pressure
    pub pressure: f64,
}

impl Clock {
    fn at(time: f64, scale_factor: f64) -> Self {
        Self {
            time,
            step: 0,
            scale_factor,
            hubble: 0.0,
            rho: 0.0,
            pressure: 0.0,
        }
    }

    /// Equation-of-state parameter w = p/ρ
    pub fn equation_of_state(&self) -> Option<f64> {
        if self.rho != 0.0 {
            Some(self.pressure / self.rho)
        } else {
            None
        }
    }
}

/// Spatially-averaged value of one scalar field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    /// Field value φ
    pub value: f64,
    /// Time derivative dφ/dt
    pub rate: f64,
    /// Share of the total energy density carried by this field
    pub omega: f64,
    /// Value this field started the member with
    pub initial: f64,
}

impl FieldState {
    fn new(value: f64, rate: f64) -> Self {
        Self {
            value,
            rate,
            omega: 0.0,
            initial: value,
        }
    }
}

/// Representation the lattice fields are currently held in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Domain {
    #[default]
    Position,
    Fourier,
}

/// Complete state of one ensemble member
///
/// # Example
///
/// ```rust
/// use inflation_lattice_core_rs::{InitialConditions, SimulationState};
///
/// let initial = InitialConditions {
///     time: 0.0,
///     scale_factor: 1.0,
///     fields: vec![1.0, 0.0],
///     rates: vec![-0.7, 0.0],
/// };
///
/// let state = SimulationState::new(&initial);
/// assert_eq!(state.num_fields(), 2);
/// assert_eq!(state.lattice.step, 0);
/// assert!(state.series.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Non-linear (lattice) clock
    pub lattice: Clock,
    /// Homogeneous clock, evolved independently of the lattice
    pub homogeneous: Clock,
    /// Lattice field averages
    pub fields: Vec<FieldState>,
    /// Homogeneous field values
    pub homogeneous_fields: Vec<FieldState>,
    pub domain: Domain,
    /// Samples recorded at every non-linear flush
    pub series: FlushSeries,
    /// Samples recorded at every homogeneous flush
    pub homogeneous_series: FlushSeries,
}

impl SimulationState {
    /// Build a fresh state at the given initial conditions
    pub fn new(initial: &InitialConditions) -> Self {
        Self {
            lattice: Clock::at(initial.time, initial.scale_factor),
            homogeneous: Clock::at(initial.time, initial.scale_factor),
            fields: fields_from(initial),
            homogeneous_fields: fields_from(initial),
            domain: Domain::Position,
            series: FlushSeries::new(),
            homogeneous_series: FlushSeries::new(),
        }
    }

    /// Reset the lattice part of the state to the initial conditions
    ///
    /// Step counter back to zero, fields back to their canonical values,
    /// flush history cleared. The homogeneous clock is left alone.
    pub fn reinitialize(&mut self, initial: &InitialConditions) {
        self.lattice = Clock::at(initial.time, initial.scale_factor);
        self.fields = fields_from(initial);
        self.domain = Domain::Position;
        self.series.clear();
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Append the current lattice background to the flush series
    pub fn record_sample(&mut self) {
        let sample = FlushSample::capture(&self.lattice, &self.fields);
        self.series.push(sample);
    }

    /// Append the current homogeneous background to its flush series
    pub fn record_homogeneous_sample(&mut self) {
        let sample = FlushSample::capture(&self.homogeneous, &self.homogeneous_fields);
        self.homogeneous_series.push(sample);
    }

    /// Move the flushed lattice series out, leaving an empty one behind
    pub fn take_series(&mut self) -> FlushSeries {
        std::mem::take(&mut self.series)
    }
}

fn fields_from(initial: &InitialConditions) -> Vec<FieldState> {
    initial
        .fields
        .iter()
        .zip(&initial.rates)
        .map(|(&value, &rate)| FieldState::new(value, rate))
        .collect()
}
