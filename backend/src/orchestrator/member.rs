//! One ensemble member
//!
//! ```text
//! 1. re-initialize from the ensemble's initial conditions
//! 2. linearized pre-phase until a >= linear.scale_factor_limit (optional)
//! 3. non-linear loop:
//!        [densify near the Hubble target]
//!        if step % cadence == 0: diagnostics, flush, post-process
//!        step, step += 1
//! 4. final diagnostics, final flush, post-process
//! 5. curvature interpolation at the reference Hubble rate (optional)
//! ```
//!
//! The checkpoint schedule is created fresh for every member, so a
//! densified cadence never leaks into the next member.

use crate::core::schedule::CheckpointSchedule;
use crate::core::timing::StepTally;
use crate::curvature;
use crate::engine::{CheckpointArtifact, DiagnosticsOptions, FlushKind, Phase, Stepper};
use crate::models::event::DriverEvent;
use crate::models::state::SimulationState;
use crate::orchestrator::driver::{Driver, DriverError, MemberFailure, MemberReport, MemberStatus};
use crate::orchestrator::termination;
use tracing::{debug, info};

/// Counters gathered by the non-linear loop
#[derive(Debug, Default)]
struct LoopOutcome {
    checkpoints: usize,
    post_processed: usize,
}

impl Driver {
    /// Run member `member` (numbered from 1) to completion
    ///
    /// On failure the returned [`MemberFailure`] still carries the steps the
    /// member got through, so the tally stays consistent with elapsed time.
    pub fn run_member(
        &mut self,
        member: usize,
        state: &mut SimulationState,
        tally: StepTally,
    ) -> Result<(MemberReport, StepTally), MemberFailure> {
        let mut linear_substeps = 0;
        match self.evolve_member(member, state, &mut linear_substeps) {
            Ok(report) => {
                let tally = tally
                    .with_linear(report.linear_substeps)
                    .with_nonlinear(report.nonlinear_steps);
                Ok((report, tally))
            }
            Err(error) => Err(MemberFailure {
                error,
                linear_substeps,
                tally: tally
                    .with_linear(linear_substeps)
                    .with_nonlinear(state.lattice.step),
            }),
        }
    }

    fn evolve_member(
        &mut self,
        member: usize,
        state: &mut SimulationState,
        linear_substeps: &mut u64,
    ) -> Result<MemberReport, DriverError> {
        info!("Simulation run: {}", member);

        self.reinitialize(member, state)?;
        let mut schedule = CheckpointSchedule::from_cadence(self.config().nonlinear.cadence)?;

        if self.config().linear.enabled {
            self.run_linear_phase(member, state, linear_substeps)?;
        }

        info!("Non-linear simulation ({})", self.config().order);
        let mut outcome = self.run_nonlinear_loop(member, state, &mut schedule)?;

        let artifact = self.checkpoint(member, state, FlushKind::Final)?;
        outcome.checkpoints += 1;
        if self.post_process(member, state, &artifact)? {
            outcome.post_processed += 1;
        }

        let nonlinear_steps = state.lattice.step;

        let curvature = if self.config().curvature_export {
            let field = self.config().curvature_field;
            let result = curvature::interpolate(
                &state.series,
                field,
                state.fields[field].initial,
                self.config().hubble_reference,
            )?;
            self.exporter
                .append_curvature(&result)
                .map_err(DriverError::Export)?;
            Some(result)
        } else {
            None
        };

        self.log_event(DriverEvent::MemberCompleted {
            member,
            steps: nonlinear_steps,
            final_time: state.lattice.time,
            final_hubble: state.lattice.hubble,
        });
        info!(
            "Run {} done: {} steps, t = {:.6e}, a = {:.6e}, H = {:.6e}",
            member,
            nonlinear_steps,
            state.lattice.time,
            state.lattice.scale_factor,
            state.lattice.hubble
        );

        Ok(MemberReport {
            member,
            status: MemberStatus::Completed,
            linear_substeps: *linear_substeps,
            nonlinear_steps,
            checkpoints: outcome.checkpoints,
            post_processed: outcome.post_processed,
            densified_at: schedule.densified_at(),
            final_time: state.lattice.time,
            final_scale_factor: state.lattice.scale_factor,
            final_hubble: state.lattice.hubble,
            curvature,
            series: state.take_series(),
        })
    }

    /// Reset `state` to the ensemble's initial conditions
    ///
    /// Order matters: engine caches are rebuilt before the field adjustment,
    /// and the momentum adjustment needs freshly computed diagnostics.
    pub fn reinitialize(
        &mut self,
        member: usize,
        state: &mut SimulationState,
    ) -> Result<(), DriverError> {
        let as_engine_error = DriverError::engine(Phase::NonLinear);

        state.reinitialize(&self.config().initial);
        self.engine.refresh(state).map_err(&as_engine_error)?;
        self.engine.adjust_fields(state).map_err(&as_engine_error)?;
        self.engine
            .diagnostics(state, DiagnosticsOptions::quiet())
            .map_err(&as_engine_error)?;
        self.engine.adjust_momenta(state).map_err(&as_engine_error)?;

        self.log_event(DriverEvent::MemberReinitialized { member });
        Ok(())
    }

    /// Evolve linearized perturbations until the scale factor limit
    ///
    /// Sub-steps the engine reports are added to `substeps` as they happen.
    fn run_linear_phase(
        &mut self,
        member: usize,
        state: &mut SimulationState,
        substeps: &mut u64,
    ) -> Result<(), DriverError> {
        let limit = self.config().linear.scale_factor_limit;
        let diagnostics = self.diagnostics();
        let as_engine_error = DriverError::engine(Phase::Linear);

        info!("Linearized simulation until a = {}", limit);
        self.log_event(DriverEvent::PhaseStarted {
            member: Some(member),
            phase: Phase::Linear,
        });

        self.engine
            .diagnostics(state, diagnostics)
            .map_err(&as_engine_error)?;
        state.record_sample();
        self.log_event(DriverEvent::Checkpoint {
            member: Some(member),
            phase: Phase::Linear,
            step: state.lattice.step,
            time: state.lattice.time,
            hubble: state.lattice.hubble,
        });

        self.engine.to_fourier(state).map_err(&as_engine_error)?;
        self.engine.refresh(state).map_err(&as_engine_error)?;

        let mut iterations = 0;
        while state.lattice.scale_factor < limit {
            self.check_budget(Phase::Linear, iterations)?;
            *substeps += self.engine.linear_step(state).map_err(&as_engine_error)?;
            self.engine
                .sync_linear_background(state)
                .map_err(&as_engine_error)?;
            iterations += 1;
        }

        self.engine.to_position(state).map_err(&as_engine_error)?;
        self.engine.adjust_fields(state).map_err(&as_engine_error)?;

        info!(
            "Linearized simulation done: {} sub-steps, a = {:.6e}",
            *substeps, state.lattice.scale_factor
        );
        self.log_event(DriverEvent::LinearPhaseCompleted {
            member,
            substeps: *substeps,
            scale_factor: state.lattice.scale_factor,
        });
        Ok(())
    }

    /// Main stepping loop, shared by both termination modes and all orders
    fn run_nonlinear_loop(
        &mut self,
        member: usize,
        state: &mut SimulationState,
        schedule: &mut CheckpointSchedule,
    ) -> Result<LoopOutcome, DriverError> {
        let stepper = Stepper::nonlinear(self.config().order);
        let termination = termination::for_config(self.config());
        let dt = self.config().lattice.time_step;
        let as_engine_error = DriverError::engine(Phase::NonLinear);

        self.log_event(DriverEvent::PhaseStarted {
            member: Some(member),
            phase: Phase::NonLinear,
        });

        let start_step = state.lattice.step;
        let mut outcome = LoopOutcome::default();

        while termination.should_continue(&state.lattice) {
            let step = state.lattice.step;
            self.check_budget(Phase::NonLinear, step - start_step)?;

            if termination.before_iteration(&state.lattice, schedule) {
                info!(
                    "H = {:.6e} within 1% of target: checkpoint cadence {} -> {} from step {}",
                    state.lattice.hubble,
                    schedule.default_cadence(),
                    schedule.cadence(),
                    step
                );
                self.log_event(DriverEvent::CadenceDensified {
                    member,
                    step,
                    hubble: state.lattice.hubble,
                });
            }

            if schedule.is_due(step) {
                let artifact = self.checkpoint(member, state, FlushKind::Evolution)?;
                outcome.checkpoints += 1;
                if self.post_process(member, state, &artifact)? {
                    outcome.post_processed += 1;
                }
            }

            stepper
                .apply(self.engine.as_mut(), state, dt)
                .map_err(&as_engine_error)?;
            state.lattice.step += 1;
        }

        Ok(outcome)
    }

    /// Recompute diagnostics, record a sample and flush
    fn checkpoint(
        &mut self,
        member: usize,
        state: &mut SimulationState,
        kind: FlushKind,
    ) -> Result<CheckpointArtifact, DriverError> {
        let diagnostics = self.diagnostics();
        self.engine
            .diagnostics(state, diagnostics)
            .map_err(DriverError::engine(Phase::NonLinear))?;
        state.record_sample();
        let artifact = self
            .sink
            .flush(state, member, kind)
            .map_err(DriverError::Checkpoint)?;

        debug!(
            "Checkpoint {} for run {} at step {} (t = {:.6e}, H = {:.6e})",
            artifact.sequence(),
            member,
            state.lattice.step,
            state.lattice.time,
            state.lattice.hubble
        );
        self.log_event(DriverEvent::Checkpoint {
            member: Some(member),
            phase: Phase::NonLinear,
            step: state.lattice.step,
            time: state.lattice.time,
            hubble: state.lattice.hubble,
        });
        Ok(artifact)
    }

    /// Hand an artifact to the post-processor if the lattice asks for it
    fn post_process(
        &mut self,
        member: usize,
        state: &SimulationState,
        artifact: &CheckpointArtifact,
    ) -> Result<bool, DriverError> {
        if !self.config().lattice.post_process {
            return Ok(false);
        }
        let step = state.lattice.step;
        self.post_processor
            .process(state, artifact)
            .map_err(|source| DriverError::PostProcess { step, source })?;
        self.log_event(DriverEvent::PostProcessed { member, step });
        Ok(true)
    }
}
