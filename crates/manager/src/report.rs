//! What a reconciliation run found and created.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::Phase;

/// Whether a key was already on the platform or had to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Found,
    Created,
}

/// Outcome for one natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub key: String,
    pub resolution: Resolution,
}

impl Resolved {
    #[must_use]
    pub fn found(key: &str) -> Self {
        Self {
            key: key.to_string(),
            resolution: Resolution::Found,
        }
    }

    #[must_use]
    pub fn created(key: &str) -> Self {
        Self {
            key: key.to_string(),
            resolution: Resolution::Created,
        }
    }
}

/// Keys handled by one phase, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub found: Vec<String>,
    pub created: Vec<String>,
    /// `team/email` pairs added to a team (users phase only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub memberships_added: Vec<String>,
}

impl PhaseReport {
    #[must_use]
    pub fn from_resolved(phase: Phase, resolved: Vec<Resolved>) -> Self {
        let (found, created): (Vec<_>, Vec<_>) = resolved
            .into_iter()
            .partition(|r| r.resolution == Resolution::Found);

        Self {
            phase,
            found: found.into_iter().map(|r| r.key).collect(),
            created: created.into_iter().map(|r| r.key).collect(),
            memberships_added: Vec::new(),
        }
    }

    /// Number of write calls the phase made.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.created.len() + self.memberships_added.len()
    }
}

/// Report from a reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the last phase completed.
    pub finished_at: Option<DateTime<Utc>>,
    /// Completed phases, in order.
    pub phases: Vec<PhaseReport>,
}

impl Default for ReconcileReport {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            phases: Vec::new(),
        }
    }
}

impl ReconcileReport {
    #[must_use]
    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    #[must_use]
    pub fn created_total(&self) -> usize {
        self.phases.iter().map(|p| p.created.len()).sum()
    }

    #[must_use]
    pub fn found_total(&self) -> usize {
        self.phases.iter().map(|p| p.found.len()).sum()
    }

    #[must_use]
    pub fn writes_total(&self) -> usize {
        self.phases.iter().map(PhaseReport::writes).sum()
    }
}
