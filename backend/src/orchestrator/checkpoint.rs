//! Checkpoint - JSON snapshots of the evolving state
//!
//! A filesystem [`CheckpointSink`] that writes one snapshot per flush. Each
//! snapshot is stamped with the run configuration's fingerprint so it can be
//! matched to the configuration that produced it.
//!
//! ```text
//! <root>/homog/checkpoint_000000.json
//! <root>/sim_001/checkpoint_000000.json
//! <root>/sim_001/checkpoint_000001.json
//! ```

use crate::engine::{CheckpointArtifact, CheckpointSink, FlushKind, Phase, StorageError};
use crate::export::{member_dir_name, HOMOGENEOUS_DIR};
use crate::models::state::{Clock, FieldState, SimulationState};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

// ============================================================================
// Snapshot Structures
// ============================================================================

/// State captured at one flush
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    /// Ensemble member (None for homogeneous flushes)
    pub member: Option<usize>,

    pub phase: Phase,

    pub kind: FlushKind,

    /// Clock at the flush
    pub clock: Clock,

    /// Field averages at the flush
    pub fields: Vec<FieldState>,

    /// SHA256 of the run configuration
    pub config_hash: String,
}

impl CheckpointSnapshot {
    /// Read a snapshot back from disk
    pub fn read(path: &Path) -> Result<Self, StorageError> {
        let json = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Whether this snapshot was produced under the given configuration
    pub fn matches_config(&self, config_hash: &str) -> bool {
        self.config_hash == config_hash
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Writes every flush as a pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonCheckpointSink {
    root: PathBuf,
    config_hash: String,
    next_sequence: u64,
}

impl JsonCheckpointSink {
    pub fn new(root: impl Into<PathBuf>, config_hash: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            config_hash: config_hash.into(),
            next_sequence: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write(&mut self, dir: PathBuf, snapshot: &CheckpointSnapshot) -> Result<CheckpointArtifact, StorageError> {
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let sequence = self.next_sequence;
        let path = dir.join(format!("checkpoint_{:06}.json", sequence));
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json).map_err(|e| StorageError::io(&path, e))?;
        self.next_sequence += 1;

        debug!("Checkpoint {} written to {}", sequence, path.display());
        Ok(CheckpointArtifact::new(sequence, path))
    }
}

impl CheckpointSink for JsonCheckpointSink {
    fn flush(
        &mut self,
        state: &SimulationState,
        member: usize,
        kind: FlushKind,
    ) -> Result<CheckpointArtifact, StorageError> {
        let snapshot = CheckpointSnapshot {
            member: Some(member),
            phase: Phase::NonLinear,
            kind,
            clock: state.lattice.clone(),
            fields: state.fields.clone(),
            config_hash: self.config_hash.clone(),
        };
        self.write(self.root.join(member_dir_name(member)), &snapshot)
    }

    fn flush_homogeneous(&mut self, state: &SimulationState) -> Result<(), StorageError> {
        let snapshot = CheckpointSnapshot {
            member: None,
            phase: Phase::Homogeneous,
            kind: FlushKind::Evolution,
            clock: state.homogeneous.clone(),
            fields: state.homogeneous_fields.clone(),
            config_hash: self.config_hash.clone(),
        };
        self.write(self.root.join(HOMOGENEOUS_DIR), &snapshot)?;
        Ok(())
    }
}
