//! The set of entity clients a reconciliation run talks to.

use std::sync::Arc;

use crate::client::ApiClient;
use crate::entity::EntityClient;
use crate::escalations::{EscalationPolicy, EscalationPolicyClient, NewEscalationPolicy};
use crate::roles::RoleMapping;
use crate::schedules::{NewSchedule, Schedule, ScheduleClient};
use crate::services::{NewService, Service, ServiceClient};
use crate::teams::{TeamApi, TeamClient};
use crate::users::{NewUser, User, UserClient};

pub type UserApi = dyn EntityClient<Entity = User, Descriptor = dyn NewUser>;
pub type ScheduleApi = dyn EntityClient<Entity = Schedule, Descriptor = dyn NewSchedule>;
pub type EscalationPolicyApi =
    dyn EntityClient<Entity = EscalationPolicy, Descriptor = dyn NewEscalationPolicy>;
pub type ServiceApi = dyn EntityClient<Entity = Service, Descriptor = dyn NewService>;

/// One client per entity kind.
///
/// Fields are trait objects so tests can swap in in-memory implementations.
#[derive(Clone)]
pub struct Platform {
    pub teams: Arc<dyn TeamApi>,
    pub users: Arc<UserApi>,
    pub schedules: Arc<ScheduleApi>,
    pub escalation_policies: Arc<EscalationPolicyApi>,
    pub services: Arc<ServiceApi>,
}

impl Platform {
    /// HTTP-backed clients sharing one transport.
    #[must_use]
    pub fn new(api: &ApiClient, roles: Arc<RoleMapping>) -> Self {
        Self {
            teams: Arc::new(TeamClient::new(api.clone())),
            users: Arc::new(UserClient::new(api.clone(), roles)),
            schedules: Arc::new(ScheduleClient::new(api.clone())),
            escalation_policies: Arc::new(EscalationPolicyClient::new(api.clone())),
            services: Arc::new(ServiceClient::new(api.clone())),
        }
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
