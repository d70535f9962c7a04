//! Integrator order dispatch
//!
//! The stepping operation is looked up once per phase from the configured
//! order; the phase loop then calls the same function pointer every step.

use crate::core::config::IntegratorOrder;
use crate::engine::{EngineError, EvolutionEngine, Phase};
use crate::models::state::SimulationState;

/// One step of a given order on a given phase
pub type StepFn = fn(&mut dyn EvolutionEngine, &mut SimulationState, f64) -> Result<(), EngineError>;

/// Step function selected for a phase loop
#[derive(Debug, Clone, Copy)]
pub struct Stepper {
    phase: Phase,
    order: IntegratorOrder,
    step: StepFn,
}

impl Stepper {
    /// Stepper for the homogeneous background
    pub fn homogeneous(order: IntegratorOrder) -> Self {
        let step: StepFn = match order {
            IntegratorOrder::Second => |e, s, dt| e.homogeneous_step_2(s, dt),
            IntegratorOrder::Fourth => |e, s, dt| e.homogeneous_step_4(s, dt),
            IntegratorOrder::Sixth => |e, s, dt| e.homogeneous_step_6(s, dt),
            IntegratorOrder::Eighth => |e, s, dt| e.homogeneous_step_8(s, dt),
        };
        Self {
            phase: Phase::Homogeneous,
            order,
            step,
        }
    }

    /// Stepper for the full lattice
    pub fn nonlinear(order: IntegratorOrder) -> Self {
        let step: StepFn = match order {
            IntegratorOrder::Second => |e, s, dt| e.step_2(s, dt),
            IntegratorOrder::Fourth => |e, s, dt| e.step_4(s, dt),
            IntegratorOrder::Sixth => |e, s, dt| e.step_6(s, dt),
            IntegratorOrder::Eighth => |e, s, dt| e.step_8(s, dt),
        };
        Self {
            phase: Phase::NonLinear,
            order,
            step,
        }
    }

    /// Advance `state` by one step of size `dt`
    pub fn apply(
        &self,
        engine: &mut dyn EvolutionEngine,
        state: &mut SimulationState,
        dt: f64,
    ) -> Result<(), EngineError> {
        (self.step)(engine, state, dt)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn order(&self) -> IntegratorOrder {
        self.order
    }
}
