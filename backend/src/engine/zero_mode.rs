//! Zero-mode reference engine
//!
//! CPU engine that evolves only the spatially-averaged mode of N scalar
//! fields in a flat FRW background (reduced Planck units, M_pl = 1):
//!
//! ```text
//! V(φ)  = Σ ½ m_i² φ_i²  +  ½ g² φ_0² φ_1²
//! ρ     = Σ ½ φ̇_i² + V        p = Σ ½ φ̇_i² − V
//! H     = sqrt(ρ / 3)
//! ```
//!
//! Order 2 is a symmetric Strang splitting of three exactly solvable flows
//! (expansion, kick, drift) in canonical variables; orders 4, 6 and 8 are
//! built from it by triple-jump composition. With a single mode the Fourier
//! transforms are identity maps and the lattice and homogeneous phases
//! evolve the same equations on their own clocks.
//!
//! Useful for driving the orchestration end to end without a lattice engine.

use crate::engine::{DiagnosticsOptions, EngineError, EvolutionEngine};
use crate::models::state::{Clock, Domain, FieldState, SimulationState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Model parameters for [`ZeroModeEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroModeParams {
    /// m_i² for every field
    pub masses_squared: Vec<f64>,
    /// g² of the φ_0² φ_1² interaction (ignored with a single field)
    #[serde(default)]
    pub coupling_squared: f64,
    /// Time step of the linearized evolution
    pub linear_time_step: f64,
    /// Sub-steps per linearized step
    #[serde(default = "default_linear_substeps")]
    pub linear_substeps: u64,
}

fn default_linear_substeps() -> u64 {
    16
}

/// Reference engine for the spatially-averaged mode
#[derive(Debug, Clone)]
pub struct ZeroModeEngine {
    params: ZeroModeParams,
}

/// Phase-space point in canonical variables
///
/// Momenta are π = v φ̇ with v = (a / a_0)³ measured from the start of the
/// step, which removes the Hubble friction from the momentum equation.
#[derive(Debug)]
struct Canonical {
    values: Vec<f64>,
    momenta: Vec<f64>,
    volume: f64,
}

impl Canonical {
    fn from_fields(fields: &[FieldState]) -> Self {
        Self {
            values: fields.iter().map(|f| f.value).collect(),
            momenta: fields.iter().map(|f| f.rate).collect(),
            volume: 1.0,
        }
    }

    fn write_back(self, clock: &mut Clock, fields: &mut [FieldState]) {
        let volume = self.volume;
        for ((field, value), momentum) in fields.iter_mut().zip(self.values).zip(self.momenta) {
            field.value = value;
            field.rate = momentum / volume;
        }
        clock.scale_factor *= volume.cbrt();
    }
}

impl ZeroModeEngine {
    pub fn new(params: ZeroModeParams) -> Result<Self, EngineError> {
        if params.masses_squared.is_empty() {
            return Err(EngineError::new("at least one field mass is required"));
        }
        if !(params.linear_time_step > 0.0) {
            return Err(EngineError::new("linear_time_step must be > 0"));
        }
        if params.linear_substeps == 0 {
            return Err(EngineError::new("linear_substeps must be > 0"));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &ZeroModeParams {
        &self.params
    }

    fn check_fields(&self, fields: &[FieldState]) -> Result<(), EngineError> {
        if fields.len() != self.params.masses_squared.len() {
            return Err(EngineError::new(format!(
                "state has {} fields but the model defines {}",
                fields.len(),
                self.params.masses_squared.len()
            )));
        }
        Ok(())
    }

    fn potential(&self, fields: &[FieldState]) -> f64 {
        let values: Vec<f64> = fields.iter().map(|f| f.value).collect();
        self.potential_at(&values)
    }

    fn potential_at(&self, values: &[f64]) -> f64 {
        let mass_terms: f64 = values
            .iter()
            .zip(&self.params.masses_squared)
            .map(|(v, m2)| 0.5 * m2 * v * v)
            .sum();
        mass_terms + self.interaction_at(values)
    }

    fn interaction_at(&self, values: &[f64]) -> f64 {
        match values {
            [a, b, ..] => 0.5 * self.params.coupling_squared * a * a * b * b,
            _ => 0.0,
        }
    }

    /// ∂V/∂φ_i
    fn gradient_at(&self, values: &[f64], i: usize) -> f64 {
        let g2 = self.params.coupling_squared;
        let own = self.params.masses_squared[i] * values[i];
        let coupled = match (i, values) {
            (0, [a, b, ..]) => g2 * a * b * b,
            (1, [a, b, ..]) => g2 * b * a * a,
            _ => 0.0,
        };
        own + coupled
    }

    fn kinetic(fields: &[FieldState]) -> f64 {
        fields.iter().map(|f| 0.5 * f.rate * f.rate).sum()
    }

    fn hubble(&self, fields: &[FieldState]) -> f64 {
        let rho = Self::kinetic(fields) + self.potential(fields);
        (rho.max(0.0) / 3.0).sqrt()
    }

    /// Recompute ρ, p, H and the per-field energy ratios
    fn update_background(&self, clock: &mut Clock, fields: &mut [FieldState]) {
        let kinetic = Self::kinetic(fields);
        let potential = self.potential(fields);
        let values: Vec<f64> = fields.iter().map(|f| f.value).collect();
        let interaction = self.interaction_at(&values);
        clock.rho = kinetic + potential;
        clock.pressure = kinetic - potential;
        clock.hubble = (clock.rho.max(0.0) / 3.0).sqrt();

        let rho = clock.rho;
        let shared = if fields.len() > 1 {
            interaction / fields.len() as f64
        } else {
            0.0
        };
        for (field, m2) in fields.iter_mut().zip(&self.params.masses_squared) {
            let own = 0.5 * field.rate * field.rate + 0.5 * m2 * field.value * field.value;
            field.omega = if rho > 0.0 { (own + shared) / rho } else { 0.0 };
        }
    }

    /// Exact flow of the field values at fixed momenta and volume
    fn drift(canonical: &mut Canonical, h: f64) {
        let volume = canonical.volume;
        for (value, momentum) in canonical.values.iter_mut().zip(&canonical.momenta) {
            *value += h * momentum / volume;
        }
    }

    /// Exact flow of the momenta at fixed field values and volume
    fn kick(&self, canonical: &mut Canonical, h: f64) {
        let forces: Vec<f64> = (0..canonical.values.len())
            .map(|i| self.gradient_at(&canonical.values, i))
            .collect();
        let volume = canonical.volume;
        for (momentum, force) in canonical.momenta.iter_mut().zip(forces) {
            *momentum -= h * volume * force;
        }
    }

    /// Exact flow of the volume v = (a / a_0)³ at fixed fields and momenta
    ///
    /// With K = Σ ½ π² the Friedmann equation reads v' = sqrt(3 (K + V v²)).
    fn expand(&self, canonical: &mut Canonical, h: f64) {
        let kinetic: f64 = canonical.momenta.iter().map(|p| 0.5 * p * p).sum();
        let potential = self.potential_at(&canonical.values);
        let volume = canonical.volume;

        canonical.volume = if potential > 0.0 {
            let rate = (3.0 * potential).sqrt();
            if kinetic > 0.0 {
                let scale = (kinetic / potential).sqrt();
                scale * ((volume / scale).asinh() + rate * h).sinh()
            } else {
                volume * (rate * h).exp()
            }
        } else if potential < 0.0 && kinetic > 0.0 {
            let scale = (kinetic / -potential).sqrt();
            let rate = (-3.0 * potential).sqrt();
            scale * ((volume / scale).min(1.0).asin() + rate * h).sin()
        } else {
            volume + (3.0 * kinetic).sqrt() * h
        };
    }

    /// Symmetric second-order splitting of exact sub-flows
    fn strang(&self, canonical: &mut Canonical, h: f64) {
        self.expand(canonical, 0.5 * h);
        self.kick(canonical, 0.5 * h);
        Self::drift(canonical, h);
        self.kick(canonical, 0.5 * h);
        self.expand(canonical, 0.5 * h);
    }

    /// Triple-jump composition up to the requested order
    fn compose(&self, canonical: &mut Canonical, h: f64, order: u8) {
        if order <= 2 {
            self.strang(canonical, h);
            return;
        }
        let outer = 1.0 / (2.0 - 2f64.powf(1.0 / f64::from(order - 1)));
        let inner = 1.0 - 2.0 * outer;
        self.compose(canonical, outer * h, order - 2);
        self.compose(canonical, inner * h, order - 2);
        self.compose(canonical, outer * h, order - 2);
    }

    fn advance(
        &self,
        clock: &mut Clock,
        fields: &mut [FieldState],
        dt: f64,
        order: u8,
    ) -> Result<(), EngineError> {
        self.check_fields(fields)?;
        let mut canonical = Canonical::from_fields(fields);
        self.compose(&mut canonical, dt, order);
        canonical.write_back(clock, fields);
        clock.time += dt;
        self.update_background(clock, fields);

        if !clock.scale_factor.is_finite() || fields.iter().any(|f| !f.value.is_finite()) {
            return Err(EngineError::new(format!(
                "non-finite state after step at t = {}",
                clock.time
            )));
        }
        Ok(())
    }

    fn log_background(label: &str, clock: &Clock, options: DiagnosticsOptions) {
        if options.log {
            info!(
                "{} t = {:.6e}, a = {:.6e}, H = {:.6e}, rho = {:.6e}",
                label, clock.time, clock.scale_factor, clock.hubble, clock.rho
            );
        }
        if options.log_equation_of_state {
            if let Some(w) = clock.equation_of_state() {
                info!("{} w = {:.6}", label, w);
            }
        }
    }
}

impl EvolutionEngine for ZeroModeEngine {
    fn homogeneous_step_2(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.advance(&mut state.homogeneous, &mut state.homogeneous_fields, dt, 2)
    }

    fn homogeneous_step_4(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.advance(&mut state.homogeneous, &mut state.homogeneous_fields, dt, 4)
    }

    fn homogeneous_step_6(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.advance(&mut state.homogeneous, &mut state.homogeneous_fields, dt, 6)
    }

    fn homogeneous_step_8(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.advance(&mut state.homogeneous, &mut state.homogeneous_fields, dt, 8)
    }

    fn step_2(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.advance(&mut state.lattice, &mut state.fields, dt, 2)
    }

    fn step_4(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.advance(&mut state.lattice, &mut state.fields, dt, 4)
    }

    fn step_6(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.advance(&mut state.lattice, &mut state.fields, dt, 6)
    }

    fn step_8(&mut self, state: &mut SimulationState, dt: f64) -> Result<(), EngineError> {
        self.advance(&mut state.lattice, &mut state.fields, dt, 8)
    }

    fn homogeneous_diagnostics(
        &mut self,
        state: &mut SimulationState,
        options: DiagnosticsOptions,
    ) -> Result<(), EngineError> {
        self.check_fields(&state.homogeneous_fields)?;
        self.update_background(&mut state.homogeneous, &mut state.homogeneous_fields);
        Self::log_background("homogeneous", &state.homogeneous, options);
        Ok(())
    }

    fn diagnostics(
        &mut self,
        state: &mut SimulationState,
        options: DiagnosticsOptions,
    ) -> Result<(), EngineError> {
        self.check_fields(&state.fields)?;
        self.update_background(&mut state.lattice, &mut state.fields);
        Self::log_background("lattice", &state.lattice, options);
        Ok(())
    }

    fn refresh(&mut self, state: &mut SimulationState) -> Result<(), EngineError> {
        self.check_fields(&state.fields)?;
        self.update_background(&mut state.lattice, &mut state.fields);
        Ok(())
    }

    fn adjust_fields(&mut self, state: &mut SimulationState) -> Result<(), EngineError> {
        // A single mode carries no fluctuations to remove.
        self.check_fields(&state.fields)
    }

    fn adjust_momenta(&mut self, state: &mut SimulationState) -> Result<(), EngineError> {
        self.check_fields(&state.fields)?;
        state.lattice.hubble = self.hubble(&state.fields);
        Ok(())
    }

    fn to_fourier(&mut self, state: &mut SimulationState) -> Result<(), EngineError> {
        state.domain = Domain::Fourier;
        Ok(())
    }

    fn to_position(&mut self, state: &mut SimulationState) -> Result<(), EngineError> {
        state.domain = Domain::Position;
        Ok(())
    }

    fn linear_step(&mut self, state: &mut SimulationState) -> Result<u64, EngineError> {
        if state.domain != Domain::Fourier {
            return Err(EngineError::new("linear step requires Fourier representation"));
        }
        let dt = self.params.linear_time_step;
        for _ in 0..self.params.linear_substeps {
            self.advance(&mut state.lattice, &mut state.fields, dt, 2)?;
        }
        debug!(
            "linear step: a = {:.6e}, H = {:.6e}",
            state.lattice.scale_factor, state.lattice.hubble
        );
        Ok(self.params.linear_substeps)
    }

    fn sync_linear_background(&mut self, state: &mut SimulationState) -> Result<(), EngineError> {
        self.check_fields(&state.fields)?;
        self.update_background(&mut state.lattice, &mut state.fields);
        Ok(())
    }
}
