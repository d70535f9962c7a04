//! Non-linear phase: checkpoint cadence, termination, order dispatch,
//! densification, post-processing and the linearized pre-phase

mod common;

use common::{
    base_config, lattice_steps, Call, RecordingPostProcessor, RecordingSink, ScriptedEngine,
};
use inflation_lattice_core_rs::{
    Domain, Driver, DriverError, DriverEvent, FlushKind, IntegratorOrder, Phase, RunConfig,
    RunReport, SimulationState, TerminationMode,
};

fn run(config: RunConfig, engine: ScriptedEngine) -> (Driver, SimulationState, Result<RunReport, DriverError>) {
    let (sink, _) = RecordingSink::new();
    let mut state = SimulationState::new(&config.initial);
    let mut driver = Driver::new(config, Box::new(engine), Box::new(sink)).unwrap();
    let result = driver.run(&mut state);
    (driver, state, result)
}

fn hubble_config(cadence: u64) -> RunConfig {
    let mut config = base_config();
    config.termination = TerminationMode::HubbleTarget;
    config.hubble_reference = 10.0;
    config.nonlinear.cadence = cadence;
    config
}

// ============================================================================
// Fixed time
// ============================================================================

#[test]
fn test_fixed_time_checkpoints_on_cadence_plus_final() {
    let config = base_config();
    let (engine, calls) = ScriptedEngine::new();
    let (sink, flushes) = RecordingSink::new();
    let mut state = SimulationState::new(&config.initial);

    let mut driver = Driver::new(config, Box::new(engine), Box::new(sink)).unwrap();
    let report = driver.run(&mut state).unwrap();

    let member = &report.members[0];
    assert!(member.is_completed());
    assert_eq!(member.nonlinear_steps, 8);
    assert_eq!(member.final_time, 1.0);
    assert_eq!(member.checkpoints, 3);
    assert_eq!(
        driver.event_log().checkpoint_steps(Some(1), Phase::NonLinear),
        vec![0, 4, 8]
    );

    let kinds: Vec<FlushKind> = flushes.borrow().iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FlushKind::Evolution, FlushKind::Evolution, FlushKind::Final]);
    assert_eq!(lattice_steps(&calls).len(), 8);

    // One sample per flush, in step order
    let steps: Vec<u64> = member.series.samples().iter().map(|s| s.step).collect();
    assert_eq!(steps, vec![0, 4, 8]);
}

#[test]
fn test_lattice_time_step_is_not_scaled() {
    let config = base_config();
    let (engine, calls) = ScriptedEngine::new();
    let (_, state, result) = run(config, engine);
    result.unwrap();

    // The scale factor grows every step but dt does not follow it
    assert!(state.lattice.scale_factor > 2.0);
    assert!(lattice_steps(&calls).iter().all(|&(_, dt)| dt == 0.125));
}

#[test]
fn test_checkpoint_diagnostics_are_logged() {
    let config = base_config();
    let (engine, calls) = ScriptedEngine::new();
    let (_, _, result) = run(config, engine);
    let report = result.unwrap();

    let logged = calls
        .borrow()
        .iter()
        .filter(|c| **c == Call::Diagnostics { log: true })
        .count();
    assert_eq!(logged, report.members[0].checkpoints);
}

#[test]
fn test_reinitialization_sequence() {
    let config = base_config();
    let (engine, calls) = ScriptedEngine::new();
    let (_, _, result) = run(config, engine);
    result.unwrap();

    let calls = calls.borrow();
    assert_eq!(
        &calls[..4],
        &[
            Call::Refresh,
            Call::AdjustFields,
            Call::Diagnostics { log: false },
            Call::AdjustMomenta,
        ]
    );
}

// ============================================================================
// Order dispatch
// ============================================================================

#[test]
fn test_every_order_and_mode_routes_to_matching_step() {
    for order in IntegratorOrder::all() {
        for termination in [TerminationMode::FixedTime, TerminationMode::HubbleTarget] {
            let mut config = hubble_config(4);
            config.termination = termination;
            config.order = order;
            let (engine, calls) = ScriptedEngine::new();
            let engine = engine.with_hubble(&[50.0, 30.0, 20.0, 9.0]);

            let (_, _, result) = run(config, engine);
            result.unwrap();

            let steps = lattice_steps(&calls);
            assert!(!steps.is_empty(), "{} / {:?}", order, termination);
            assert!(
                steps.iter().all(|&(o, _)| o == order.as_u8()),
                "{} / {:?}",
                order,
                termination
            );
        }
    }
}

// ============================================================================
// Hubble target
// ============================================================================

#[test]
fn test_hubble_target_densifies_near_reference() {
    let (engine, _) = ScriptedEngine::new();
    let engine = engine.with_hubble(&[50.0, 30.0, 20.0, 10.05, 10.0, 9.8]);
    let (driver, _, result) = run(hubble_config(4), engine);
    let report = result.unwrap();

    let member = &report.members[0];
    assert_eq!(member.nonlinear_steps, 5);
    assert_eq!(member.densified_at, Some(3));
    assert_eq!(member.final_hubble, 9.8);
    assert_eq!(
        driver.event_log().checkpoint_steps(Some(1), Phase::NonLinear),
        vec![0, 4, 5]
    );
    assert_eq!(driver.event_log().events_of_type("CadenceDensified").len(), 1);
}

#[test]
fn test_densified_cadence_holds_when_hubble_rises_again() {
    let (engine, _) = ScriptedEngine::new();
    let engine = engine.with_hubble(&[50.0, 10.05, 12.0, 15.0, 20.0, 9.0]);
    let (driver, _, result) = run(hubble_config(4), engine);
    let report = result.unwrap();

    assert_eq!(report.members[0].densified_at, Some(1));
    // Step 2 is only due under the dense cadence
    assert_eq!(
        driver.event_log().checkpoint_steps(Some(1), Phase::NonLinear),
        vec![0, 2, 4, 5]
    );
    assert_eq!(driver.event_log().events_of_type("CadenceDensified").len(), 1);
}

#[test]
fn test_hubble_target_can_exit_without_densifying() {
    // 10.5 is above the densify threshold and 9.8 already below the exit one
    let (engine, _) = ScriptedEngine::new();
    let engine = engine.with_hubble(&[50.0, 20.0, 10.5, 9.8, 9.5]);
    let (driver, _, result) = run(hubble_config(4), engine);
    let report = result.unwrap();

    let member = &report.members[0];
    assert_eq!(member.nonlinear_steps, 3);
    assert_eq!(member.final_hubble, 9.8);
    assert_eq!(member.densified_at, None);
    assert_eq!(
        driver.event_log().checkpoint_steps(Some(1), Phase::NonLinear),
        vec![0, 3]
    );
}

#[test]
fn test_hubble_already_below_target_takes_no_steps() {
    let (engine, calls) = ScriptedEngine::new();
    let engine = engine.with_hubble(&[5.0]);
    let (_, _, result) = run(hubble_config(4), engine);
    let report = result.unwrap();

    assert_eq!(report.members[0].nonlinear_steps, 0);
    assert_eq!(report.members[0].checkpoints, 1);
    assert!(lattice_steps(&calls).is_empty());
}

// ============================================================================
// Post-processing
// ============================================================================

#[test]
fn test_post_processor_sees_every_flush() {
    let mut config = base_config();
    config.lattice.post_process = true;
    let (engine, _) = ScriptedEngine::new();
    let (sink, _) = RecordingSink::new();
    let (post, processed) = RecordingPostProcessor::new();
    let mut state = SimulationState::new(&config.initial);

    let mut driver = Driver::new(config, Box::new(engine), Box::new(sink))
        .unwrap()
        .with_post_processor(Box::new(post));
    let report = driver.run(&mut state).unwrap();

    assert_eq!(*processed.borrow(), vec![0, 1, 2]);
    assert_eq!(report.members[0].post_processed, 3);
}

#[test]
fn test_post_processing_disabled_skips_processor() {
    let config = base_config();
    let (engine, _) = ScriptedEngine::new();
    let (sink, _) = RecordingSink::new();
    let (post, processed) = RecordingPostProcessor::new();
    let mut state = SimulationState::new(&config.initial);

    let mut driver = Driver::new(config, Box::new(engine), Box::new(sink))
        .unwrap()
        .with_post_processor(Box::new(post));
    let report = driver.run(&mut state).unwrap();

    assert!(processed.borrow().is_empty());
    assert_eq!(report.members[0].post_processed, 0);
    assert!(driver.event_log().events_of_type("PostProcessed").is_empty());
}

#[test]
fn test_post_processing_failure_is_propagated() {
    let mut config = base_config();
    config.lattice.post_process = true;
    let (engine, _) = ScriptedEngine::new();
    let (sink, _) = RecordingSink::new();
    let (post, _) = RecordingPostProcessor::new();
    let mut state = SimulationState::new(&config.initial);

    let mut driver = Driver::new(config, Box::new(engine), Box::new(sink))
        .unwrap()
        .with_post_processor(Box::new(post.failing_on(1)));
    let err = driver.run(&mut state).unwrap_err();

    assert!(matches!(err, DriverError::PostProcess { step: 4, .. }));
}

// ============================================================================
// Linearized pre-phase
// ============================================================================

#[test]
fn test_linear_phase_runs_until_scale_factor_limit() {
    let mut config = base_config();
    config.linear.enabled = true;
    config.linear.scale_factor_limit = 2.0;
    let (engine, calls) = ScriptedEngine::new();
    let (driver, state, result) = run(config, engine);
    let report = result.unwrap();

    // 1 -> 1.5 -> 2.25, three sub-steps each
    assert_eq!(report.members[0].linear_substeps, 6);
    assert_eq!(report.tally.linear, 6);
    assert_eq!(state.domain, Domain::Position);

    let calls = calls.borrow();
    let fourier = calls.iter().position(|c| *c == Call::ToFourier).unwrap();
    assert_eq!(
        &calls[fourier..fourier + 8],
        &[
            Call::ToFourier,
            Call::Refresh,
            Call::LinearStep,
            Call::SyncLinearBackground,
            Call::LinearStep,
            Call::SyncLinearBackground,
            Call::ToPosition,
            Call::AdjustFields,
        ]
    );

    assert_eq!(driver.event_log().checkpoint_steps(Some(1), Phase::Linear), vec![0]);
    let completed = driver.event_log().events_of_type("LinearPhaseCompleted");
    assert!(matches!(
        completed[0],
        DriverEvent::LinearPhaseCompleted { substeps: 6, .. }
    ));
}

#[test]
fn test_linear_phase_past_limit_takes_no_substeps() {
    let mut config = base_config();
    config.linear.enabled = true;
    config.linear.scale_factor_limit = 0.5;
    let (engine, calls) = ScriptedEngine::new();
    let (_, _, result) = run(config, engine);
    let report = result.unwrap();

    assert_eq!(report.members[0].linear_substeps, 0);
    assert!(!calls.borrow().contains(&Call::LinearStep));
    assert!(calls.borrow().contains(&Call::ToPosition));
}

// ============================================================================
// Disabled phase, budget
// ============================================================================

#[test]
fn test_nonlinear_disabled_runs_no_members() {
    let mut config = base_config();
    config.nonlinear.enabled = false;
    let (engine, calls) = ScriptedEngine::new();
    let (_, _, result) = run(config, engine);
    let report = result.unwrap();

    assert!(report.members.is_empty());
    assert_eq!(report.tally.total(), 0);
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_nonlinear_step_budget() {
    let mut config = base_config();
    config.max_steps = Some(3);
    let (engine, _) = ScriptedEngine::new();
    let (_, _, result) = run(config, engine);

    assert!(matches!(
        result.unwrap_err(),
        DriverError::StepBudgetExceeded {
            phase: Phase::NonLinear,
            budget: 3
        }
    ));
}
