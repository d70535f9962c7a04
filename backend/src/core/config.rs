//! Run configuration
//!
//! Static parameters of a simulation run: phase switches, final times, flush
//! cadences, integrator order, termination mode and ensemble size.
//!
//! # Critical Invariants
//!
//! 1. A `RunConfig` is immutable once a run starts; the driver copies the
//!    checkpoint cadence into a per-run [`CheckpointSchedule`] and never
//!    writes it back.
//! 2. Every cadence is a positive integer.
//! 3. Time steps are positive and finite.
//!
//! [`CheckpointSchedule`]: crate::core::schedule::CheckpointSchedule

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Formal accuracy order of the symplectic integrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum IntegratorOrder {
    Second,
    Fourth,
    Sixth,
    Eighth,
}

impl IntegratorOrder {
    /// Numeric order (2, 4, 6 or 8)
    pub fn as_u8(self) -> u8 {
        match self {
            IntegratorOrder::Second => 2,
            IntegratorOrder::Fourth => 4,
            IntegratorOrder::Sixth => 6,
            IntegratorOrder::Eighth => 8,
        }
    }

    /// All supported orders, lowest first
    pub fn all() -> [IntegratorOrder; 4] {
        [
            IntegratorOrder::Second,
            IntegratorOrder::Fourth,
            IntegratorOrder::Sixth,
            IntegratorOrder::Eighth,
        ]
    }
}

impl Default for IntegratorOrder {
    fn default() -> Self {
        IntegratorOrder::Fourth
    }
}

impl TryFrom<u8> for IntegratorOrder {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(IntegratorOrder::Second),
            4 => Ok(IntegratorOrder::Fourth),
            6 => Ok(IntegratorOrder::Sixth),
            8 => Ok(IntegratorOrder::Eighth),
            other => Err(ConfigError::UnsupportedOrder(other)),
        }
    }
}

impl From<IntegratorOrder> for u8 {
    fn from(order: IntegratorOrder) -> Self {
        order.as_u8()
    }
}

impl std::fmt::Display for IntegratorOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "order {}", self.as_u8())
    }
}

/// When the non-linear phase stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationMode {
    /// Stop once the simulated time reaches `nonlinear.final_time`
    #[default]
    FixedTime,
    /// Stop once the Hubble rate falls to 0.99 × `hubble_reference`
    HubbleTarget,
}

/// What happens to the ensemble when a member's collaborator call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Propagate the first failure and abandon the remaining members
    #[default]
    Abort,
    /// Record the failure, re-initialize, and continue with the next member
    SkipMember,
}

/// Homogeneous (zero-mode only) phase switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomogeneousConfig {
    #[serde(default)]
    pub enabled: bool,
    pub final_time: f64,
    /// Steps between homogeneous flushes
    pub cadence: u64,
}

impl Default for HomogeneousConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            final_time: 0.0,
            cadence: 1024,
        }
    }
}

/// Non-linear lattice phase switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonLinearConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub final_time: f64,
    /// Steps between checkpoints before any densification
    pub cadence: u64,
}

impl Default for NonLinearConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            final_time: 0.0,
            cadence: 256,
        }
    }
}

/// Grid parameters the driver needs from the lattice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeConfig {
    /// Lattice time step, used unscaled in the non-linear phase
    pub time_step: f64,
    /// Homogeneous time step, divided by the scale factor every step
    pub homogeneous_time_step: f64,
    /// Run the post-processor on every checkpoint artifact
    #[serde(default)]
    pub post_process: bool,
}

/// Linearized perturbation pre-phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPhaseConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Scale factor at which linear evolution hands over to the lattice
    pub scale_factor_limit: f64,
}

impl Default for LinearPhaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scale_factor_limit: 2.0,
        }
    }
}

/// The ensemble's canonical starting point
///
/// Every member starts here, never from the previous member's evolved state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    #[serde(default)]
    pub time: f64,
    pub scale_factor: f64,
    /// Homogeneous field values φ_i
    pub fields: Vec<f64>,
    /// Field time derivatives dφ_i/dt
    pub rates: Vec<f64>,
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub homogeneous: HomogeneousConfig,

    #[serde(default)]
    pub nonlinear: NonLinearConfig,

    pub lattice: LatticeConfig,

    #[serde(default)]
    pub order: IntegratorOrder,

    #[serde(default)]
    pub termination: TerminationMode,

    /// Reference Hubble rate; only read in `HubbleTarget` mode and by the
    /// curvature interpolation
    #[serde(default)]
    pub hubble_reference: f64,

    #[serde(default = "default_ensemble_size")]
    pub ensemble_size: usize,

    #[serde(default)]
    pub linear: LinearPhaseConfig,

    #[serde(default)]
    pub curvature_export: bool,

    /// Field whose energy ratio is interpolated for the curvature result
    #[serde(default)]
    pub curvature_field: usize,

    #[serde(default)]
    pub csv_export: bool,

    pub initial: InitialConditions,

    /// Step budget for every phase loop (None = unbounded)
    #[serde(default)]
    pub max_steps: Option<u64>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_true() -> bool {
    true
}

fn default_ensemble_size() -> usize {
    1
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported integrator order {0} (expected 2, 4, 6 or 8)")]
    UnsupportedOrder(u8),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RunConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Check every invariant the driver relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nonlinear.cadence == 0 {
            return Err(invalid("nonlinear.cadence must be > 0"));
        }
        if self.homogeneous.cadence == 0 {
            return Err(invalid("homogeneous.cadence must be > 0"));
        }
        if self.ensemble_size == 0 {
            return Err(invalid("ensemble_size must be >= 1"));
        }
        if !(self.lattice.time_step.is_finite() && self.lattice.time_step > 0.0) {
            return Err(invalid(format!(
                "lattice.time_step must be positive, got {}",
                self.lattice.time_step
            )));
        }
        if self.homogeneous.enabled
            && !(self.lattice.homogeneous_time_step.is_finite()
                && self.lattice.homogeneous_time_step > 0.0)
        {
            return Err(invalid(format!(
                "lattice.homogeneous_time_step must be positive, got {}",
                self.lattice.homogeneous_time_step
            )));
        }
        let needs_reference =
            self.termination == TerminationMode::HubbleTarget || self.curvature_export;
        if needs_reference && !(self.hubble_reference.is_finite() && self.hubble_reference > 0.0) {
            return Err(invalid(format!(
                "hubble_reference must be positive, got {}",
                self.hubble_reference
            )));
        }
        if self.initial.fields.is_empty() {
            return Err(invalid("initial.fields must not be empty"));
        }
        if self.initial.fields.len() != self.initial.rates.len() {
            return Err(invalid(format!(
                "initial.fields has {} entries but initial.rates has {}",
                self.initial.fields.len(),
                self.initial.rates.len()
            )));
        }
        if !(self.initial.scale_factor > 0.0) {
            return Err(invalid("initial.scale_factor must be > 0"));
        }
        if self.curvature_field >= self.initial.fields.len() {
            return Err(invalid(format!(
                "curvature_field {} out of range for {} fields",
                self.curvature_field,
                self.initial.fields.len()
            )));
        }
        if self.linear.enabled && !(self.linear.scale_factor_limit > 0.0) {
            return Err(invalid("linear.scale_factor_limit must be > 0"));
        }
        if self.max_steps == Some(0) {
            return Err(invalid("max_steps must be > 0 when set"));
        }
        Ok(())
    }

    /// Number of scalar fields
    pub fn num_fields(&self) -> usize {
        self.initial.fields.len()
    }

    /// SHA256 of the canonical (key-sorted) JSON form of this config
    ///
    /// Stamped into checkpoints and reports so output can be matched to the
    /// configuration that produced it.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        use serde_json::Value;
        use std::collections::BTreeMap;

        fn canonicalize(value: Value) -> Value {
            match value {
                Value::Object(map) => {
                    let sorted: BTreeMap<String, Value> =
                        map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                    Value::Object(sorted.into_iter().collect())
                }
                Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
                other => other,
            }
        }

        let json = serde_json::to_string(&canonicalize(serde_json::to_value(self)?))?;

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
