//! Checkpoint cadence for a single run
//!
//! The cadence is seeded from configuration and owned by the run that uses
//! it. Densification near a Hubble target is a one-way ratchet: once the
//! cadence drops to [`DENSE_CADENCE`] it stays there until `reset()`, which
//! only happens when the next ensemble member is re-initialized.

use crate::core::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;

/// Cadence used once the Hubble rate is close to its target
pub const DENSE_CADENCE: u64 = 2;

/// Per-run checkpoint schedule
///
/// # Example
/// ```
/// use inflation_lattice_core_rs::CheckpointSchedule;
///
/// let mut schedule = CheckpointSchedule::from_cadence(256).unwrap();
/// assert!(schedule.is_due(0));
/// assert!(!schedule.is_due(2));
///
/// schedule.densify(300);
/// assert!(schedule.is_due(302));
/// assert_eq!(schedule.densified_at(), Some(300));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSchedule {
    /// Configured cadence, restored by `reset()`
    default: u64,
    /// Cadence in force
    current: u64,
    /// Step at which densification first happened
    densified_at: Option<u64>,
}

impl CheckpointSchedule {
    /// Create a schedule with the configured cadence
    pub fn new(cadence: NonZeroU64) -> Self {
        Self {
            default: cadence.get(),
            current: cadence.get(),
            densified_at: None,
        }
    }

    /// Create a schedule from a raw configured cadence, rejecting zero
    pub fn from_cadence(cadence: u64) -> Result<Self, ConfigError> {
        NonZeroU64::new(cadence)
            .map(Self::new)
            .ok_or_else(|| ConfigError::Invalid("checkpoint cadence must be > 0".to_string()))
    }

    /// Whether a checkpoint is due before taking step `step`
    pub fn is_due(&self, step: u64) -> bool {
        step % self.current == 0
    }

    /// Switch to the dense cadence for the rest of the run
    ///
    /// Returns `true` only the first time, so callers can log the switch once.
    pub fn densify(&mut self, step: u64) -> bool {
        self.current = DENSE_CADENCE;
        if self.densified_at.is_none() {
            self.densified_at = Some(step);
            true
        } else {
            false
        }
    }

    /// Restore the configured cadence
    pub fn reset(&mut self) {
        self.current = self.default;
        self.densified_at = None;
    }

    /// Cadence in force
    pub fn cadence(&self) -> u64 {
        self.current
    }

    /// Configured cadence
    pub fn default_cadence(&self) -> u64 {
        self.default
    }

    pub fn is_densified(&self) -> bool {
        self.densified_at.is_some()
    }

    pub fn densified_at(&self) -> Option<u64> {
        self.densified_at
    }
}
