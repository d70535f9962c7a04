//! Flushed time series
//!
//! Every checkpoint appends one sample of the background. The series is later
//! interpolated against the Hubble rate and exported as a flat table.

use crate::models::state::{Clock, FieldState};
use serde::{Deserialize, Serialize};

/// Background quantities at one flush
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlushSample {
    pub step: u64,
    pub time: f64,
    pub scale_factor: f64,
    pub hubble: f64,
    pub rho: f64,
    pub pressure: f64,
    /// Per-field energy ratios
    pub omegas: Vec<f64>,
    /// Per-field mean values
    pub field_values: Vec<f64>,
}

impl FlushSample {
    pub(crate) fn capture(clock: &Clock, fields: &[FieldState]) -> Self {
        Self {
            step: clock.step,
            time: clock.time,
            scale_factor: clock.scale_factor,
            hubble: clock.hubble,
            rho: clock.rho,
            pressure: clock.pressure,
            omegas: fields.iter().map(|f| f.omega).collect(),
            field_values: fields.iter().map(|f| f.value).collect(),
        }
    }
}

/// Ordered flush history of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlushSeries {
    samples: Vec<FlushSample>,
}

impl FlushSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: FlushSample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[FlushSample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&FlushSample> {
        self.samples.last()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Hubble rate of every sample, in flush order
    pub fn hubble(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.hubble).collect()
    }

    /// Scale factor of every sample, in flush order
    pub fn scale_factor(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.scale_factor).collect()
    }

    /// Energy ratio of `field` at every sample; None if the field is unknown
    pub fn omega(&self, field: usize) -> Option<Vec<f64>> {
        self.samples
            .iter()
            .map(|s| s.omegas.get(field).copied())
            .collect()
    }
}
