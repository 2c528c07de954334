//! PagerDuty REST API clients.
//!
//! This crate covers the slice of the API needed to stand up an
//! organization: users, teams (and their memberships), on-call schedules,
//! escalation policies and services. Every entity client implements the same
//! get / get-by-name / add contract ([`EntityClient`]), and [`Platform`]
//! bundles one client per kind behind trait objects.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagerduty::{ApiClient, ApiConfig, EntityClient, Platform, RoleMapping};
//!
//! # async fn example() -> Result<(), pagerduty::ApiError> {
//! let api = ApiClient::new(&ApiConfig::from_env())?;
//! let platform = Platform::new(&api, Arc::new(RoleMapping::standard()));
//!
//! if let Some(team) = platform.teams.get_by_name("Flintstones").await? {
//!     println!("{} -> {}", team.name, team.id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! - `PD_TOKEN`: access token, sent as a bearer credential
//! - `PD_BASE_URL`: API endpoint (default `https://api.pagerduty.com`)

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod entity;
pub mod error;
pub mod escalations;
pub mod platform;
pub mod roles;
pub mod schedules;
pub mod services;
pub mod teams;
pub mod users;

pub use client::{ApiClient, ApiConfig, DEFAULT_BASE_URL, ENV_BASE_URL, ENV_TOKEN};
pub use entity::{Entity, EntityClient, EntityKind, Reference};
pub use error::{ApiError, ApiResult};
pub use escalations::{
    EscalationPolicy, EscalationPolicyClient, EscalationRule, EscalationTarget,
    NewEscalationPolicy,
};
pub use platform::{EscalationPolicyApi, Platform, ScheduleApi, ServiceApi, UserApi};
pub use roles::{EscalationTier, RoleGrant, RoleMapping};
pub use schedules::{LayerUser, NewSchedule, Schedule, ScheduleClient, ScheduleLayer};
pub use services::{NewService, Service, ServiceClient};
pub use teams::{NewTeam, Team, TeamApi, TeamClient, TeamMember, TeamMembership};
pub use users::{NewUser, User, UserClient};
