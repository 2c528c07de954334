//! The get / get-by-name / add contract shared by every entity client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;

/// The kinds of PagerDuty objects this crate manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Team,
    User,
    Schedule,
    EscalationPolicy,
    Service,
}

impl EntityKind {
    /// Lowercase name used in logs and errors.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::User => "user",
            Self::Schedule => "schedule",
            Self::EscalationPolicy => "escalation_policy",
            Self::Service => "service",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A platform object with an assigned ID.
pub trait Entity {
    /// Platform-assigned ID.
    fn id(&self) -> &str;
}

/// Lookup and creation for one entity kind.
///
/// `Descriptor` is the minimal read-only view `add` needs, usually a
/// `dyn` trait so callers are not tied to a concrete config type.
#[async_trait]
pub trait EntityClient: Send + Sync {
    /// Wire representation returned by lookups.
    type Entity: Entity + Send;
    /// Capability set consumed by `add`.
    type Descriptor: ?Sized + Sync;

    /// Kind handled by this client.
    fn kind(&self) -> EntityKind;

    /// Fetch by platform ID. `Ok(None)` when the response has no entity.
    async fn get(&self, id: &str) -> ApiResult<Option<Self::Entity>>;

    /// Best-effort lookup by name: the first result of a filtered list
    /// query limited to one item, or `Ok(None)` when nothing matches.
    async fn get_by_name(&self, name: &str) -> ApiResult<Option<Self::Entity>>;

    /// Create the entity and return its platform ID.
    async fn add(&self, descriptor: &Self::Descriptor) -> ApiResult<String>;
}

/// Reference to another object (`{"id": "...", "type": "team_reference"}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced object's ID.
    pub id: String,
    /// Reference type, e.g. `user_reference`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Human-readable summary, present on responses only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Reference {
    /// Reference of the given type.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: &str) -> Self {
        Self {
            id: id.into(),
            kind: kind.to_string(),
            summary: None,
        }
    }
}

/// Query parameters for a name lookup.
pub(crate) fn name_query(name: &str) -> [(&'static str, &str); 3] {
    [("query", name), ("total", "false"), ("limit", "1")]
}
