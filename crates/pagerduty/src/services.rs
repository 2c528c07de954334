//! Service lookup and creation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::client::ApiClient;
use crate::entity::{name_query, Entity, EntityClient, EntityKind, Reference};
use crate::error::{ApiError, ApiResult};

const SERVICES_PATH: &str = "/services";

/// What the service client needs to create a service.
pub trait NewService: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn escalation_policy_id(&self) -> &str;
    fn team_id(&self) -> &str;
}

/// PagerDuty service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub escalation_policy: Option<Reference>,
    #[serde(default)]
    pub teams: Vec<Reference>,
}

impl Entity for Service {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Services API client.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    api: ApiClient,
}

impl ServiceClient {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Active service with constant urgency, alerts + incidents and
    /// intelligent grouping, owned by one team and one escalation policy.
    fn create_request(service: &dyn NewService) -> CreateServiceRequest<'_> {
        CreateServiceRequest {
            service: ServiceBody {
                kind: "service",
                name: service.name(),
                description: service.description(),
                status: "active",
                escalation_policy: Reference::new(
                    service.escalation_policy_id(),
                    "escalation_policy_reference",
                ),
                teams: vec![Reference::new(service.team_id(), "team_reference")],
                incident_urgency_rule: TypeOnly { kind: "constant" },
                alert_creation: "create_alerts_and_incidents",
                alert_grouping_parameters: TypeOnly { kind: "intelligent" },
            },
        }
    }
}

#[async_trait]
impl EntityClient for ServiceClient {
    type Entity = Service;
    type Descriptor = dyn NewService;

    fn kind(&self) -> EntityKind {
        EntityKind::Service
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> ApiResult<Option<Service>> {
        let response: ServiceEnvelope =
            self.api.get(&format!("{SERVICES_PATH}/{id}"), &[]).await?;
        Ok(response.service)
    }

    #[instrument(skip(self))]
    async fn get_by_name(&self, name: &str) -> ApiResult<Option<Service>> {
        let response: ServiceList = self.api.get(SERVICES_PATH, &name_query(name)).await?;
        Ok(response.services.into_iter().next())
    }

    #[instrument(skip(self, service), fields(service = %service.name()))]
    async fn add(&self, service: &Self::Descriptor) -> ApiResult<String> {
        let request = Self::create_request(service);
        let response: ServiceEnvelope = self.api.post(SERVICES_PATH, &request).await?;
        let created = response.service.ok_or_else(|| ApiError::MissingEntity {
            path: SERVICES_PATH.to_string(),
        })?;
        debug!(service_id = %created.id, "Created service");
        Ok(created.id)
    }
}

// =============================================================================
// Wire types (internal)
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateServiceRequest<'a> {
    service: ServiceBody<'a>,
}

#[derive(Debug, Serialize)]
struct ServiceBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    description: &'a str,
    status: &'static str,
    escalation_policy: Reference,
    teams: Vec<Reference>,
    incident_urgency_rule: TypeOnly,
    alert_creation: &'static str,
    alert_grouping_parameters: TypeOnly,
}

#[derive(Debug, Serialize)]
struct TypeOnly {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ServiceEnvelope {
    #[serde(default)]
    service: Option<Service>,
}

#[derive(Debug, Deserialize)]
struct ServiceList {
    #[serde(default)]
    services: Vec<Service>,
}
