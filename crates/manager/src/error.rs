//! Errors that end a reconciliation run.

use pagerduty::{ApiError, EntityKind};
use thiserror::Error;

use crate::config::ConfigError;
use crate::state::Phase;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to set up PagerDuty client: {0}")]
    Client(#[source] ApiError),

    #[error("{phase}: looking up {kind} '{key}' failed: {source}")]
    Lookup {
        phase: Phase,
        kind: EntityKind,
        key: String,
        #[source]
        source: ApiError,
    },

    #[error("{phase}: creating {kind} '{key}' failed: {source}")]
    Create {
        phase: Phase,
        kind: EntityKind,
        key: String,
        #[source]
        source: ApiError,
    },

    #[error("{phase}: adding '{user}' to team '{team}' failed: {source}")]
    Membership {
        phase: Phase,
        team: String,
        user: String,
        #[source]
        source: ApiError,
    },

    #[error("{phase}: {kind} '{key}' depends on {missing_kind} '{missing_key}', which is not resolved")]
    Unresolved {
        phase: Phase,
        kind: EntityKind,
        key: String,
        missing_kind: EntityKind,
        missing_key: String,
    },

    #[error("{phase}: adding '{user}' to team '{team}' depends on {missing_kind} '{missing_key}', which is not resolved")]
    UnresolvedMembership {
        phase: Phase,
        team: String,
        user: String,
        missing_kind: EntityKind,
        missing_key: String,
    },

    #[error("reconciliation already failed in the {0} phase")]
    Halted(Phase),
}

impl ReconcileError {
    /// Phase the error belongs to, when it came from one.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Lookup { phase, .. }
            | Self::Create { phase, .. }
            | Self::Membership { phase, .. }
            | Self::Unresolved { phase, .. }
            | Self::UnresolvedMembership { phase, .. }
            | Self::Halted(phase) => Some(*phase),
            Self::Config(_) | Self::Client(_) => None,
        }
    }

    /// Whether the run deadline cut the run short.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Lookup { source, .. }
            | Self::Create { source, .. }
            | Self::Membership { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}
