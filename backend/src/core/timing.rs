//! Timing instrumentation
//!
//! One timer region wraps the whole run (homogeneous solve plus every
//! ensemble member). Throughput is only computed after the region closes,
//! from the grand step total.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Errors from reading a timer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimerError {
    #[error("timer was never started")]
    NotStarted,
    #[error("timer has not been stopped")]
    NotStopped,
    #[error("timer device error: {0}")]
    Device(String),
}

/// Start/stop marker pair around asynchronous work
///
/// `stop()` must not return until all work issued before it has completed;
/// `elapsed()` is only meaningful after `stop()`.
pub trait ScopedTimer {
    fn start(&mut self) -> Result<(), TimerError>;
    fn stop(&mut self) -> Result<(), TimerError>;
    fn elapsed(&self) -> Result<Duration, TimerError>;
}

/// Host wall-clock timer
///
/// All work the driver issues is synchronous, so `stop()` has nothing to drain.
#[derive(Debug, Default)]
pub struct WallClockTimer {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

impl WallClockTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScopedTimer for WallClockTimer {
    fn start(&mut self) -> Result<(), TimerError> {
        self.started = Some(Instant::now());
        self.elapsed = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), TimerError> {
        let started = self.started.ok_or(TimerError::NotStarted)?;
        self.elapsed = Some(started.elapsed());
        Ok(())
    }

    fn elapsed(&self) -> Result<Duration, TimerError> {
        match (self.started, self.elapsed) {
            (None, _) => Err(TimerError::NotStarted),
            (Some(_), None) => Err(TimerError::NotStopped),
            (Some(_), Some(elapsed)) => Ok(elapsed),
        }
    }
}

/// Steps taken, split by phase
///
/// Threaded through each phase run and returned from it, so the ensemble
/// driver composes the grand total explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTally {
    pub homogeneous: u64,
    pub linear: u64,
    pub nonlinear: u64,
}

impl StepTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grand total over all phases
    pub fn total(&self) -> u64 {
        self.homogeneous + self.linear + self.nonlinear
    }

    pub fn with_homogeneous(mut self, steps: u64) -> Self {
        self.homogeneous += steps;
        self
    }

    pub fn with_linear(mut self, steps: u64) -> Self {
        self.linear += steps;
        self
    }

    pub fn with_nonlinear(mut self, steps: u64) -> Self {
        self.nonlinear += steps;
        self
    }
}

/// Aggregate throughput of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub elapsed: Duration,
    pub total_steps: u64,
    /// Average seconds per step; None when no step was taken
    pub seconds_per_step: Option<f64>,
}

impl TimingSummary {
    pub fn new(elapsed: Duration, tally: &StepTally) -> Self {
        let total_steps = tally.total();
        let seconds_per_step = if total_steps > 0 {
            Some(elapsed.as_secs_f64() / total_steps as f64)
        } else {
            None
        };
        Self {
            elapsed,
            total_steps,
            seconds_per_step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_before_stop_is_error() {
        let mut timer = WallClockTimer::new();
        assert_eq!(timer.elapsed(), Err(TimerError::NotStarted));
        timer.start().unwrap();
        assert_eq!(timer.elapsed(), Err(TimerError::NotStopped));
        timer.stop().unwrap();
        assert!(timer.elapsed().is_ok());
    }

    #[test]
    fn test_stop_without_start_is_error() {
        let mut timer = WallClockTimer::new();
        assert_eq!(timer.stop(), Err(TimerError::NotStarted));
    }

    #[test]
    fn test_tally_total() {
        let tally = StepTally::new()
            .with_homogeneous(10)
            .with_linear(5)
            .with_nonlinear(100)
            .with_nonlinear(50);
        assert_eq!(tally.total(), 165);
    }

    #[test]
    fn test_summary_divides_by_total_steps() {
        let tally = StepTally::new().with_nonlinear(4);
        let summary = TimingSummary::new(Duration::from_secs(2), &tally);
        assert_eq!(summary.total_steps, 4);
        assert_eq!(summary.seconds_per_step, Some(0.5));
    }

    #[test]
    fn test_summary_without_steps() {
        let summary = TimingSummary::new(Duration::from_secs(1), &StepTally::new());
        assert_eq!(summary.seconds_per_step, None);
    }
}
