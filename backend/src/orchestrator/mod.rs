//! Orchestrator - the multi-phase simulation driver
//!
//! [`Driver`] owns the collaborators and the run configuration. Its phase
//! loops live in separate files as further `impl Driver` blocks:
//!
//! - `homogeneous.rs`: background solve with scale-factor-dependent steps
//! - `member.rs`: re-initialization, linearized pre-phase, non-linear loop
//! - `ensemble.rs`: member loop, failure policy, CSV export
//!
//! See `driver.rs` for the overall sequence.

pub mod checkpoint;
pub mod driver;
pub mod ensemble;
pub mod homogeneous;
pub mod member;
pub mod termination;

// Re-export main types for convenience
pub use checkpoint::{CheckpointSnapshot, JsonCheckpointSink};
pub use driver::{
    Driver, DriverError, HomogeneousReport, MemberFailure, MemberReport, MemberStatus, RunReport,
};
pub use termination::{FixedTime, HubbleTarget, Termination, DENSIFY_FACTOR, EXIT_FACTOR};
