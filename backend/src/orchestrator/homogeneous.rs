//! Homogeneous background solve
//!
//! Fixed final time only. The step size is the homogeneous time step divided
//! by the current scale factor, so a scale factor that reaches zero would
//! stall the loop; that is reported as an error instead.
//! No post-processing runs in this phase.

use crate::core::schedule::CheckpointSchedule;
use crate::core::timing::StepTally;
use crate::engine::{Phase, Stepper};
use crate::models::event::DriverEvent;
use crate::models::state::SimulationState;
use crate::orchestrator::driver::{Driver, DriverError, HomogeneousReport};
use tracing::{debug, info};

impl Driver {
    /// Evolve the homogeneous background up to `homogeneous.final_time`
    pub fn run_homogeneous(
        &mut self,
        state: &mut SimulationState,
        tally: StepTally,
    ) -> Result<(HomogeneousReport, StepTally), DriverError> {
        let stepper = Stepper::homogeneous(self.config().order);
        let schedule = CheckpointSchedule::from_cadence(self.config().homogeneous.cadence)?;
        let final_time = self.config().homogeneous.final_time;
        let base_dt = self.config().lattice.homogeneous_time_step;
        let diagnostics = self.diagnostics();
        let as_engine_error = DriverError::engine(Phase::Homogeneous);

        info!(
            "Homogeneous evolution ({}) until t = {:.6e}",
            stepper.order(),
            final_time
        );
        self.log_event(DriverEvent::PhaseStarted {
            member: None,
            phase: Phase::Homogeneous,
        });

        let start_step = state.homogeneous.step;
        let mut checkpoints = 0;

        while state.homogeneous.time < final_time {
            let step = state.homogeneous.step;
            self.check_budget(Phase::Homogeneous, step - start_step)?;

            if schedule.is_due(step) {
                self.engine
                    .homogeneous_diagnostics(state, diagnostics)
                    .map_err(&as_engine_error)?;
                state.record_homogeneous_sample();
                self.sink
                    .flush_homogeneous(state)
                    .map_err(DriverError::Checkpoint)?;
                checkpoints += 1;

                debug!(
                    "Homogeneous checkpoint at step {} (t = {:.6e})",
                    step, state.homogeneous.time
                );
                self.log_event(DriverEvent::Checkpoint {
                    member: None,
                    phase: Phase::Homogeneous,
                    step,
                    time: state.homogeneous.time,
                    hubble: state.homogeneous.hubble,
                });
            }

            let scale_factor = state.homogeneous.scale_factor;
            let dt = base_dt / scale_factor;
            if !(scale_factor > 0.0 && dt.is_finite() && dt > 0.0) {
                return Err(DriverError::NonPositiveStep {
                    step,
                    scale_factor,
                    dt,
                });
            }

            stepper
                .apply(self.engine.as_mut(), state, dt)
                .map_err(&as_engine_error)?;
            state.homogeneous.step += 1;
        }

        let steps = state.homogeneous.step - start_step;
        info!(
            "Homogeneous evolution done: {} steps, a = {:.6e}, H = {:.6e}",
            steps, state.homogeneous.scale_factor, state.homogeneous.hubble
        );

        let report = HomogeneousReport {
            steps,
            checkpoints,
            final_time: state.homogeneous.time,
            final_scale_factor: state.homogeneous.scale_factor,
            final_hubble: state.homogeneous.hubble,
        };
        Ok((report, tally.with_homogeneous(steps)))
    }
}
