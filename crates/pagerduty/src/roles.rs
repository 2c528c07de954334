//! Mapping from organization roles to PagerDuty roles.

use std::collections::BTreeMap;

/// Where a role sits in a team's on-call and escalation setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationTier {
    /// Takes shifts in the team's on-call schedule.
    Rotation,
    /// Takes shifts and is paged by the second escalation rule.
    Lead,
    /// Paged by the third escalation rule only.
    DepartmentHead,
    /// Never paged.
    None,
}

impl EscalationTier {
    /// Whether holders of this tier appear in the on-call schedule.
    #[must_use]
    pub const fn on_call(self) -> bool {
        matches!(self, Self::Rotation | Self::Lead)
    }
}

/// PagerDuty-side settings granted by one organization role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    /// Account-level user role (`user`, `observer`, `admin`, ...).
    pub user_role: String,
    /// Role on each team the member belongs to (`responder`, `observer`, `manager`).
    pub team_role: String,
    /// Position in on-call and escalation.
    pub tier: EscalationTier,
}

/// Immutable role table, built once and shared by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMapping {
    grants: BTreeMap<String, RoleGrant>,
}

impl RoleMapping {
    /// The organization's standard roles.
    ///
    /// | role | user role | team role |
    /// |------|-----------|-----------|
    /// | `member` | `user` | `responder` |
    /// | `observer` | `observer` | `observer` |
    /// | `lead` | `admin` | `manager` |
    /// | `dept-head` | `admin` | `manager` |
    #[must_use]
    pub fn standard() -> Self {
        Self::from_entries([
            ("member", "user", "responder", EscalationTier::Rotation),
            ("observer", "observer", "observer", EscalationTier::None),
            ("lead", "admin", "manager", EscalationTier::Lead),
            ("dept-head", "admin", "manager", EscalationTier::DepartmentHead),
        ])
    }

    /// Build a table from `(role, user role, team role, tier)` rows.
    #[must_use]
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str, &'a str, EscalationTier)>,
    ) -> Self {
        let grants = entries
            .into_iter()
            .map(|(role, user_role, team_role, tier)| {
                (
                    role.to_string(),
                    RoleGrant {
                        user_role: user_role.to_string(),
                        team_role: team_role.to_string(),
                        tier,
                    },
                )
            })
            .collect();

        Self { grants }
    }

    /// Everything a role grants, if the role is known.
    #[must_use]
    pub fn grant(&self, role: &str) -> Option<&RoleGrant> {
        self.grants.get(role)
    }

    /// Whether `role` is a key of the table.
    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.grants.contains_key(role)
    }

    /// Account-level PagerDuty role for `role`.
    #[must_use]
    pub fn user_role(&self, role: &str) -> Option<&str> {
        self.grant(role).map(|g| g.user_role.as_str())
    }

    /// Team-level PagerDuty role for `role`.
    #[must_use]
    pub fn team_role(&self, role: &str) -> Option<&str> {
        self.grant(role).map(|g| g.team_role.as_str())
    }

    /// Known roles, sorted.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.grants.keys().map(String::as_str)
    }
}
