//! Checkpoint schedule properties
//!
//! The schedule decides checkpoints purely from the step counter, and
//! densification is a ratchet that only `reset()` undoes.

use inflation_lattice_core_rs::core::schedule::DENSE_CADENCE;
use inflation_lattice_core_rs::CheckpointSchedule;
use proptest::prelude::*;

fn schedule(cadence: u64) -> CheckpointSchedule {
    CheckpointSchedule::from_cadence(cadence).unwrap()
}

#[test]
fn test_step_zero_is_always_due() {
    for cadence in [1, 2, 7, 256, 1024] {
        assert!(schedule(cadence).is_due(0));
    }
}

#[test]
fn test_cadence_one_checkpoints_every_step() {
    let schedule = schedule(1);
    assert!((0..50).all(|step| schedule.is_due(step)));
}

#[test]
fn test_densify_below_dense_cadence_still_switches() {
    // A configured cadence of 1 is denser than the dense cadence; densifying
    // still moves to the dense value.
    let mut schedule = schedule(1);
    schedule.densify(3);
    assert_eq!(schedule.cadence(), DENSE_CADENCE);
}

#[test]
fn test_zero_cadence_is_a_config_error() {
    let err = CheckpointSchedule::from_cadence(0).unwrap_err();
    assert_eq!(err.to_string(), "invalid config: checkpoint cadence must be > 0");
}

proptest! {
    #[test]
    fn prop_due_exactly_on_multiples(cadence in 1u64..500, step in 0u64..100_000) {
        let schedule = schedule(cadence);
        prop_assert_eq!(schedule.is_due(step), step % cadence == 0);
    }

    #[test]
    fn prop_densified_cadence_never_reverts(
        cadence in 3u64..500,
        first in 0u64..10_000,
        later in prop::collection::vec(0u64..10_000, 0..20),
    ) {
        let mut schedule = schedule(cadence);
        prop_assert!(schedule.densify(first));
        for step in later {
            prop_assert!(!schedule.densify(step));
            prop_assert_eq!(schedule.cadence(), DENSE_CADENCE);
        }
        prop_assert_eq!(schedule.densified_at(), Some(first));
    }

    #[test]
    fn prop_reset_restores_configured_cadence(cadence in 1u64..500, step in 0u64..10_000) {
        let mut schedule = schedule(cadence);
        schedule.densify(step);
        schedule.reset();
        prop_assert_eq!(schedule.cadence(), cadence);
        prop_assert_eq!(schedule.densified_at(), None);
    }
}
