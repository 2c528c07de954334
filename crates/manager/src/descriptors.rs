//! Owned add-descriptors built from the document and the resolved IDs.
//!
//! Teams need nothing beyond the document, so [`crate::config::Team`]
//! implements [`pagerduty::NewTeam`] itself.

use std::time::Duration;

use chrono::NaiveDateTime;
use pagerduty::{NewEscalationPolicy, NewSchedule, NewService, NewUser, TeamMembership};

use crate::config::Member;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDescriptor {
    pub name: String,
    pub email: String,
    pub time_zone: String,
    pub role: String,
}

impl UserDescriptor {
    #[must_use]
    pub fn from_member(member: &Member, default_timezone: &str) -> Self {
        Self {
            name: member.name.clone(),
            email: member.email.clone(),
            time_zone: member.time_zone(default_timezone).to_string(),
            role: member.role.clone(),
        }
    }
}

impl NewUser for UserDescriptor {
    fn name(&self) -> &str {
        &self.name
    }
    fn email(&self) -> &str {
        &self.email
    }
    fn time_zone(&self) -> &str {
        &self.time_zone
    }
    fn role(&self) -> &str {
        &self.role
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipDescriptor {
    pub user_id: String,
    pub role: String,
}

impl TeamMembership for MembershipDescriptor {
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn role(&self) -> &str {
        &self.role
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleDescriptor {
    pub name: String,
    pub description: String,
    pub time_zone: String,
    pub team_id: String,
    pub member_ids: Vec<String>,
    pub rotation_start: NaiveDateTime,
    pub rotation_turn_length: Duration,
}

impl NewSchedule for ScheduleDescriptor {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn time_zone(&self) -> &str {
        &self.time_zone
    }
    fn team_id(&self) -> &str {
        &self.team_id
    }
    fn member_ids(&self) -> &[String] {
        &self.member_ids
    }
    fn rotation_start(&self) -> NaiveDateTime {
        self.rotation_start
    }
    fn rotation_turn_length(&self) -> Duration {
        self.rotation_turn_length
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDescriptor {
    pub name: String,
    pub description: String,
    pub schedule_id: String,
    pub team_id: String,
    pub lead_ids: Vec<String>,
    pub dept_head_ids: Vec<String>,
}

impl NewEscalationPolicy for PolicyDescriptor {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn schedule_id(&self) -> &str {
        &self.schedule_id
    }
    fn team_id(&self) -> &str {
        &self.team_id
    }
    fn lead_ids(&self) -> &[String] {
        &self.lead_ids
    }
    fn dept_head_ids(&self) -> &[String] {
        &self.dept_head_ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub description: String,
    pub escalation_policy_id: String,
    pub team_id: String,
}

impl NewService for ServiceDescriptor {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn escalation_policy_id(&self) -> &str {
        &self.escalation_policy_id
    }
    fn team_id(&self) -> &str {
        &self.team_id
    }
}
