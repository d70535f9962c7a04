//! Driver event logging
//!
//! Every decision the driver takes (phase start, checkpoint, post-processing,
//! cadence densification, member completion) is recorded as an event. The
//! log makes a run auditable after the fact: checkpoint cadence, termination
//! point and ensemble boundaries can all be read back from it.
//!
//! Members are numbered from 1; homogeneous events carry no member.
//!
//! # Example
//!
//! ```rust
//! use inflation_lattice_core_rs::models::event::{DriverEvent, EventLog};
//! use inflation_lattice_core_rs::engine::Phase;
//!
//! let mut log = EventLog::new();
//! log.log(DriverEvent::Checkpoint {
//!     member: Some(1),
//!     phase: Phase::NonLinear,
//!     step: 256,
//!     time: 0.25,
//!     hubble: 0.4,
//! });
//!
//! assert_eq!(log.checkpoint_steps(Some(1), Phase::NonLinear), vec![256]);
//! ```

use crate::engine::Phase;
use serde::{Deserialize, Serialize};

/// Something the driver did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverEvent {
    /// A phase loop is about to start
    PhaseStarted {
        member: Option<usize>,
        phase: Phase,
    },

    /// Diagnostics recomputed and state flushed
    Checkpoint {
        member: Option<usize>,
        phase: Phase,
        step: u64,
        time: f64,
        hubble: f64,
    },

    /// Post-processor ran on a checkpoint artifact
    PostProcessed { member: usize, step: u64 },

    /// Cadence dropped to the dense value near the Hubble target
    CadenceDensified {
        member: usize,
        step: u64,
        hubble: f64,
    },

    /// Linearized pre-phase handed over to the lattice
    LinearPhaseCompleted {
        member: usize,
        substeps: u64,
        scale_factor: f64,
    },

    /// Member re-initialized from the ensemble's initial conditions
    MemberReinitialized { member: usize },

    /// Member finished its final flush
    MemberCompleted {
        member: usize,
        steps: u64,
        final_time: f64,
        final_hubble: f64,
    },

    /// Member failed and was skipped
    MemberFailed { member: usize, reason: String },
}

impl DriverEvent {
    /// Ensemble member this event belongs to, if any
    pub fn member(&self) -> Option<usize> {
        match self {
            DriverEvent::PhaseStarted { member, .. } => *member,
            DriverEvent::Checkpoint { member, .. } => *member,
            DriverEvent::PostProcessed { member, .. } => Some(*member),
            DriverEvent::CadenceDensified { member, .. } => Some(*member),
            DriverEvent::LinearPhaseCompleted { member, .. } => Some(*member),
            DriverEvent::MemberReinitialized { member } => Some(*member),
            DriverEvent::MemberCompleted { member, .. } => Some(*member),
            DriverEvent::MemberFailed { member, .. } => Some(*member),
        }
    }

    /// Short name of the event kind
    pub fn event_type(&self) -> &'static str {
        match self {
            DriverEvent::PhaseStarted { .. } => "PhaseStarted",
            DriverEvent::Checkpoint { .. } => "Checkpoint",
            DriverEvent::PostProcessed { .. } => "PostProcessed",
            DriverEvent::CadenceDensified { .. } => "CadenceDensified",
            DriverEvent::LinearPhaseCompleted { .. } => "LinearPhaseCompleted",
            DriverEvent::MemberReinitialized { .. } => "MemberReinitialized",
            DriverEvent::MemberCompleted { .. } => "MemberCompleted",
            DriverEvent::MemberFailed { .. } => "MemberFailed",
        }
    }
}

/// Ordered record of driver events
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<DriverEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: DriverEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[DriverEvent] {
        &self.events
    }

    /// Events of one kind, e.g. `"Checkpoint"`
    pub fn events_of_type(&self, event_type: &str) -> Vec<&DriverEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Events belonging to one member
    pub fn events_for_member(&self, member: usize) -> Vec<&DriverEvent> {
        self.events
            .iter()
            .filter(|e| e.member() == Some(member))
            .collect()
    }

    /// Steps at which a checkpoint was taken for a member and phase
    pub fn checkpoint_steps(&self, member: Option<usize>, phase: Phase) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DriverEvent::Checkpoint {
                    member: m,
                    phase: p,
                    step,
                    ..
                } if *m == member && *p == phase => Some(*step),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
