//! Escalation policy lookup and creation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::client::ApiClient;
use crate::entity::{name_query, Entity, EntityClient, EntityKind, Reference};
use crate::error::{ApiError, ApiResult};

const POLICIES_PATH: &str = "/escalation_policies";

/// Delay applied to every rule of a created policy.
pub const RULE_DELAY_MINUTES: u32 = 10;

/// How many times a created policy repeats before giving up.
pub const NUM_LOOPS: u32 = 9;

/// Handoff notification setting for created policies.
pub const HANDOFF_NOTIFICATIONS: &str = "always";

/// What the escalation policy client needs to create a policy.
pub trait NewEscalationPolicy: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// The team's on-call schedule, paged first.
    fn schedule_id(&self) -> &str;
    fn team_id(&self) -> &str;
    /// Users paged by the second rule.
    fn lead_ids(&self) -> &[String];
    /// Users paged by the third rule.
    fn dept_head_ids(&self) -> &[String];
}

/// Target of an escalation rule.
pub type EscalationTarget = Reference;

/// One level of an escalation policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub escalation_delay_in_minutes: u32,
    #[serde(default)]
    pub targets: Vec<EscalationTarget>,
}

impl EscalationRule {
    fn with_targets(targets: Vec<EscalationTarget>) -> Self {
        Self {
            escalation_delay_in_minutes: RULE_DELAY_MINUTES,
            targets,
        }
    }
}

/// PagerDuty escalation policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    #[serde(default)]
    pub num_loops: u32,
    #[serde(default)]
    pub teams: Vec<Reference>,
    #[serde(default)]
    pub on_call_handoff_notifications: String,
    #[serde(default)]
    pub description: String,
}

impl Entity for EscalationPolicy {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Build the policy body for a new team policy.
///
/// Always three rules, each after [`RULE_DELAY_MINUTES`]: the team schedule,
/// then the leads, then the department heads.
#[must_use]
pub fn build_policy(policy: &dyn NewEscalationPolicy) -> EscalationPolicy {
    let users = |ids: &[String]| -> Vec<EscalationTarget> {
        ids.iter()
            .map(|id| Reference::new(id.as_str(), "user_reference"))
            .collect()
    };

    EscalationPolicy {
        id: String::new(),
        kind: "escalation_policy".to_string(),
        name: policy.name().to_string(),
        escalation_rules: vec![
            EscalationRule::with_targets(vec![Reference::new(
                policy.schedule_id(),
                "schedule_reference",
            )]),
            EscalationRule::with_targets(users(policy.lead_ids())),
            EscalationRule::with_targets(users(policy.dept_head_ids())),
        ],
        num_loops: NUM_LOOPS,
        teams: vec![Reference::new(policy.team_id(), "team_reference")],
        on_call_handoff_notifications: HANDOFF_NOTIFICATIONS.to_string(),
        description: policy.description().to_string(),
    }
}

/// Escalation policies API client.
#[derive(Debug, Clone)]
pub struct EscalationPolicyClient {
    api: ApiClient,
}

impl EscalationPolicyClient {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EntityClient for EscalationPolicyClient {
    type Entity = EscalationPolicy;
    type Descriptor = dyn NewEscalationPolicy;

    fn kind(&self) -> EntityKind {
        EntityKind::EscalationPolicy
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> ApiResult<Option<EscalationPolicy>> {
        let response: PolicyEnvelope =
            self.api.get(&format!("{POLICIES_PATH}/{id}"), &[]).await?;
        Ok(response.escalation_policy)
    }

    #[instrument(skip(self))]
    async fn get_by_name(&self, name: &str) -> ApiResult<Option<EscalationPolicy>> {
        let response: PolicyList = self.api.get(POLICIES_PATH, &name_query(name)).await?;
        Ok(response.escalation_policies.into_iter().next())
    }

    #[instrument(skip(self, policy), fields(policy = %policy.name()))]
    async fn add(&self, policy: &Self::Descriptor) -> ApiResult<String> {
        let request = PolicyEnvelope {
            escalation_policy: Some(build_policy(policy)),
        };
        let response: PolicyEnvelope = self.api.post(POLICIES_PATH, &request).await?;
        let created = response
            .escalation_policy
            .ok_or_else(|| ApiError::MissingEntity {
                path: POLICIES_PATH.to_string(),
            })?;
        debug!(policy_id = %created.id, "Created escalation policy");
        Ok(created.id)
    }
}

// =============================================================================
// Wire types (internal)
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct PolicyEnvelope {
    #[serde(default)]
    escalation_policy: Option<EscalationPolicy>,
}

#[derive(Debug, Deserialize)]
struct PolicyList {
    #[serde(default)]
    escalation_policies: Vec<EscalationPolicy>,
}
