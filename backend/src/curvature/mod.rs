//! Curvature perturbation extraction
//!
//! After a member finishes, its flushed series is interpolated at the
//! reference Hubble rate. Interpolation runs on `x = -ln H`: H decreases
//! roughly exponentially near the target, so `-ln H` is increasing and close
//! to linear in the flushed quantities.
//!
//! The series must be strictly decreasing in H. This is the caller's
//! obligation and is not checked; a non-monotonic series gives meaningless
//! (but finite, non-panicking) values.

use crate::models::series::FlushSeries;
use serde::{Deserialize, Serialize};

/// One member's curvature result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvaturePerturbationResult {
    /// Initial value of the interpolated field
    pub initial_field: f64,
    /// Hubble rate the series was interpolated at
    pub reference_hubble: f64,
    /// ln a at the reference Hubble rate
    pub ln_scale_factor: f64,
    /// Field energy ratio at the reference Hubble rate
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CurvatureError {
    #[error("no flushed samples to interpolate")]
    EmptySeries,

    #[error("field {0} is not present in the flushed samples")]
    UnknownField(usize),

    #[error("Hubble rate must be positive for log interpolation, got {value} at sample {index}")]
    NonPositiveHubble { index: usize, value: f64 },

    #[error("scale factor must be positive for log interpolation, got {value} at sample {index}")]
    NonPositiveScaleFactor { index: usize, value: f64 },

    #[error("reference Hubble rate must be positive, got {0}")]
    NonPositiveReference(f64),
}

/// Interpolate ln a and the energy ratio of `field` at `reference_hubble`
///
/// # Example
///
/// ```rust
/// use inflation_lattice_core_rs::curvature::interpolate;
/// use inflation_lattice_core_rs::models::{FlushSample, FlushSeries};
///
/// let mut series = FlushSeries::new();
/// for (i, (h, a)) in [(4.0, 1.0), (1.0, std::f64::consts::E)].iter().enumerate() {
///     series.push(FlushSample {
///         step: i as u64,
///         time: i as f64,
///         scale_factor: *a,
///         hubble: *h,
///         rho: 0.0,
///         pressure: 0.0,
///         omegas: vec![0.5],
///         field_values: vec![1.0],
///     });
/// }
///
/// let result = interpolate(&series, 0, 1.0, 2.0).unwrap();
/// // -ln 2 sits halfway between -ln 4 and -ln 1
/// assert!((result.ln_scale_factor - 0.5).abs() < 1e-12);
/// ```
pub fn interpolate(
    series: &FlushSeries,
    field: usize,
    initial_field: f64,
    reference_hubble: f64,
) -> Result<CurvaturePerturbationResult, CurvatureError> {
    if series.is_empty() {
        return Err(CurvatureError::EmptySeries);
    }
    if !(reference_hubble > 0.0) {
        return Err(CurvatureError::NonPositiveReference(reference_hubble));
    }

    let x = log_hubble(&series.hubble())?;
    let ln_a = series
        .scale_factor()
        .into_iter()
        .enumerate()
        .map(|(index, a)| {
            if a > 0.0 {
                Ok(a.ln())
            } else {
                Err(CurvatureError::NonPositiveScaleFactor { index, value: a })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    let omega = series.omega(field).ok_or(CurvatureError::UnknownField(field))?;

    let target = -reference_hubble.ln();

    Ok(CurvaturePerturbationResult {
        initial_field,
        reference_hubble,
        ln_scale_factor: interp(target, &x, &ln_a),
        ratio: interp(target, &x, &omega),
    })
}

fn log_hubble(hubble: &[f64]) -> Result<Vec<f64>, CurvatureError> {
    hubble
        .iter()
        .enumerate()
        .map(|(index, &h)| {
            if h > 0.0 {
                Ok(-h.ln())
            } else {
                Err(CurvatureError::NonPositiveHubble { index, value: h })
            }
        })
        .collect()
}

/// Piecewise-linear interpolation on increasing `xp`
///
/// Outside the sampled range the end values are returned.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    debug_assert_eq!(xp.len(), fp.len());
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }

    let upper = xp[..n].partition_point(|&v| v < x);
    if upper == 0 {
        return fp[0];
    }
    if upper == n {
        return fp[n - 1];
    }
    if xp[upper] == x {
        return fp[upper];
    }

    let lower = upper - 1;
    let span = xp[upper] - xp[lower];
    if span == 0.0 {
        return fp[upper];
    }
    let t = (x - xp[lower]) / span;
    fp[lower] + t * (fp[upper] - fp[lower])
}
