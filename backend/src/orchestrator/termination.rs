//! Termination predicates for the non-linear loop
//!
//! Both termination modes share one loop; the difference lives entirely in
//! the predicate object. `HubbleTarget` also densifies the checkpoint
//! schedule once the Hubble rate is within 1% of the reference.
//!
//! The densify (1.01×) and exit (0.99×) factors are asymmetric. Keep both.

use crate::core::config::{RunConfig, TerminationMode};
use crate::core::schedule::CheckpointSchedule;
use crate::models::state::Clock;

/// Densify once H < DENSIFY_FACTOR × H_ref
pub const DENSIFY_FACTOR: f64 = 1.01;

/// Keep stepping while H > EXIT_FACTOR × H_ref
pub const EXIT_FACTOR: f64 = 0.99;

/// "Should the loop continue" plus an optional per-iteration hook
pub trait Termination {
    fn should_continue(&self, clock: &Clock) -> bool;

    /// Runs at the top of every iteration, before the checkpoint check
    ///
    /// Returns `true` when the schedule was densified for the first time.
    fn before_iteration(&self, _clock: &Clock, _schedule: &mut CheckpointSchedule) -> bool {
        false
    }
}

/// Run until the simulated time reaches `final_time`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTime {
    pub final_time: f64,
}

impl Termination for FixedTime {
    fn should_continue(&self, clock: &Clock) -> bool {
        clock.time < self.final_time
    }
}

/// Run until the Hubble rate drops to the target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HubbleTarget {
    pub reference: f64,
}

impl Termination for HubbleTarget {
    fn should_continue(&self, clock: &Clock) -> bool {
        clock.hubble > EXIT_FACTOR * self.reference
    }

    fn before_iteration(&self, clock: &Clock, schedule: &mut CheckpointSchedule) -> bool {
        if clock.hubble < DENSIFY_FACTOR * self.reference {
            schedule.densify(clock.step)
        } else {
            false
        }
    }
}

/// Predicate for the configured termination mode
pub fn for_config(config: &RunConfig) -> Box<dyn Termination> {
    match config.termination {
        TerminationMode::FixedTime => Box::new(FixedTime {
            final_time: config.nonlinear.final_time,
        }),
        TerminationMode::HubbleTarget => Box::new(HubbleTarget {
            reference: config.hubble_reference,
        }),
    }
}
