//! # Artifact Run State Machine
//!
//! Tracks one artifact through detection, stabilization, transfer and retention.
//!
//! ## Overview
//!
//! Every artifact handled by the coordinator gets an [`ArtifactRun`]. Stage
//! changes go through [`ArtifactRun::advance`], which rejects transitions the
//! pipeline never makes, so a run's history is always a valid path.
//!
//! ## State Machine
//!
//! ```text
//! Detected → Stabilizing → Transferring → Succeeded → Retaining → Completed
//!     ↓           ↓             ↓             └──────────────────────↑
//!     └───────────┴──────────→ Failed
//! ```
//!
//! `Succeeded → Completed` is taken when retention is deferred to a later bulk
//! pass. A failed retention pass still completes the run.

use crate::transfer::TransferResult;
use crate::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for one artifact run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRunId(Uuid);

impl ArtifactRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a run ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| BackupError::InvalidRunId(e.to_string()))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ArtifactRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ArtifactRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ArtifactRunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Stage
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStage {
    /// Signal accepted by the detector
    Detected,
    /// Waiting for the writer to finish
    Stabilizing,
    /// Copy and verify in progress
    Transferring,
    /// Copy verified at the destination
    Succeeded,
    /// Rejected, or retries exhausted
    Failed,
    /// Retention pass running after a success
    Retaining,
    /// Nothing left to do
    Completed,
}

impl ArtifactStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArtifactStage::Failed | ArtifactStage::Completed)
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ArtifactStage::Detected
                | ArtifactStage::Stabilizing
                | ArtifactStage::Transferring
                | ArtifactStage::Retaining
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStage::Detected => "detected",
            ArtifactStage::Stabilizing => "stabilizing",
            ArtifactStage::Transferring => "transferring",
            ArtifactStage::Succeeded => "succeeded",
            ArtifactStage::Failed => "failed",
            ArtifactStage::Retaining => "retaining",
            ArtifactStage::Completed => "completed",
        }
    }
}

impl FromStr for ArtifactStage {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "detected" => Ok(ArtifactStage::Detected),
            "stabilizing" => Ok(ArtifactStage::Stabilizing),
            "transferring" => Ok(ArtifactStage::Transferring),
            "succeeded" => Ok(ArtifactStage::Succeeded),
            "failed" => Ok(ArtifactStage::Failed),
            "retaining" => Ok(ArtifactStage::Retaining),
            "completed" => Ok(ArtifactStage::Completed),
            _ => Err(BackupError::InvalidStage(s.to_string())),
        }
    }
}

impl std::fmt::Display for ArtifactStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Run
// ============================================================================

/// One artifact's pass through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRun {
    pub id: ArtifactRunId,
    pub artifact: String,
    pub source: PathBuf,
    pub stage: ArtifactStage,
    /// Stages entered, with the time each was entered
    pub history: Vec<(ArtifactStage, DateTime<Utc>)>,
    pub result: Option<TransferResult>,
    /// Why the run failed, when it did
    pub error: Option<String>,
}

impl ArtifactRun {
    pub fn new(artifact: impl Into<String>, source: impl Into<PathBuf>, at: DateTime<Utc>) -> Self {
        Self {
            id: ArtifactRunId::new(),
            artifact: artifact.into(),
            source: source.into(),
            stage: ArtifactStage::Detected,
            history: vec![(ArtifactStage::Detected, at)],
            result: None,
            error: None,
        }
    }

    /// Move to `to`, recording the time
    pub fn advance(&mut self, to: ArtifactStage, at: DateTime<Utc>) -> Result<()> {
        self.validate_transition(to)?;
        self.stage = to;
        self.history.push((to, at));
        Ok(())
    }

    /// Move to `Failed`, recording why
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        self.advance(ArtifactStage::Failed, at)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn succeeded(&self) -> bool {
        self.history
            .iter()
            .any(|(stage, _)| *stage == ArtifactStage::Succeeded)
    }

    fn validate_transition(&self, to: ArtifactStage) -> Result<()> {
        use ArtifactStage::*;

        let valid = matches!(
            (self.stage, to),
            (Detected, Stabilizing)
                | (Detected, Failed)
                | (Stabilizing, Transferring)
                | (Stabilizing, Failed)
                | (Transferring, Succeeded)
                | (Transferring, Failed)
                | (Succeeded, Retaining)
                | (Succeeded, Completed)
                | (Retaining, Completed)
        );

        if valid {
            Ok(())
        } else {
            Err(BackupError::InvalidStateTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
                reason: format!("Cannot transition from {} to {}", self.stage, to),
            })
        }
    }
}
