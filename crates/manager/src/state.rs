//! Reconciliation phases and the states between them.

use std::fmt;

use pagerduty::EntityKind;
use serde::{Deserialize, Serialize};

/// One dependency-ordered stage of a run, covering one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Teams,
    /// Users and their team memberships.
    Users,
    Schedules,
    EscalationPolicies,
    Services,
}

impl Phase {
    /// Every phase, in execution order.
    pub const ALL: [Self; 5] = [
        Self::Teams,
        Self::Users,
        Self::Schedules,
        Self::EscalationPolicies,
        Self::Services,
    ];

    /// Entity kind the phase resolves.
    #[must_use]
    pub const fn kind(self) -> EntityKind {
        match self {
            Self::Teams => EntityKind::Team,
            Self::Users => EntityKind::User,
            Self::Schedules => EntityKind::Schedule,
            Self::EscalationPolicies => EntityKind::EscalationPolicy,
            Self::Services => EntityKind::Service,
        }
    }

    /// State reached when the phase completes.
    #[must_use]
    pub const fn completed(self) -> State {
        match self {
            Self::Teams => State::TeamsSynced,
            Self::Users => State::UsersSynced,
            Self::Schedules => State::SchedulesSynced,
            Self::EscalationPolicies => State::EscalationSynced,
            Self::Services => State::ServicesSynced,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Teams => "teams",
            Self::Users => "users",
            Self::Schedules => "schedules",
            Self::EscalationPolicies => "escalation_policies",
            Self::Services => "services",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a [`crate::Reconciler`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Configuration validated, nothing synced yet.
    Parsed,
    TeamsSynced,
    UsersSynced,
    SchedulesSynced,
    EscalationSynced,
    /// Every phase completed.
    ServicesSynced,
    /// The named phase failed; the run cannot continue.
    Failed(Phase),
}

impl State {
    /// The phase that runs from this state, if any.
    #[must_use]
    pub const fn next_phase(self) -> Option<Phase> {
        match self {
            Self::Parsed => Some(Phase::Teams),
            Self::TeamsSynced => Some(Phase::Users),
            Self::UsersSynced => Some(Phase::Schedules),
            Self::SchedulesSynced => Some(Phase::EscalationPolicies),
            Self::EscalationSynced => Some(Phase::Services),
            Self::ServicesSynced | Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.next_phase().is_none()
    }
}
