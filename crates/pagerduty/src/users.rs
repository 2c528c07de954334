//! User lookup and creation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::client::ApiClient;
use crate::entity::{name_query, Entity, EntityClient, EntityKind, Reference};
use crate::error::{ApiError, ApiResult};
use crate::roles::RoleMapping;

const USERS_PATH: &str = "/users";

/// What the user client needs to create a user.
pub trait NewUser: Send + Sync {
    fn name(&self) -> &str;
    fn email(&self) -> &str;
    /// Effective IANA time zone (already defaulted by the caller).
    fn time_zone(&self) -> &str;
    /// Organization role, translated through the [`RoleMapping`].
    fn role(&self) -> &str;
}

/// PagerDuty user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub time_zone: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub teams: Vec<Reference>,
}

impl Entity for User {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Users API client. Lookups by name query on the user's email.
#[derive(Debug, Clone)]
pub struct UserClient {
    api: ApiClient,
    roles: Arc<RoleMapping>,
}

impl UserClient {
    #[must_use]
    pub fn new(api: ApiClient, roles: Arc<RoleMapping>) -> Self {
        Self { api, roles }
    }

    fn create_request<'a>(&self, user: &'a dyn NewUser) -> ApiResult<CreateUserRequest<'a>> {
        let role = self
            .roles
            .user_role(user.role())
            .ok_or_else(|| ApiError::UnmappedRole(user.role().to_string()))?
            .to_string();

        Ok(CreateUserRequest {
            user: UserBody {
                kind: "user",
                name: user.name(),
                email: user.email(),
                time_zone: user.time_zone(),
                role,
            },
        })
    }
}

#[async_trait]
impl EntityClient for UserClient {
    type Entity = User;
    type Descriptor = dyn NewUser;

    fn kind(&self) -> EntityKind {
        EntityKind::User
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> ApiResult<Option<User>> {
        let response: UserEnvelope = self.api.get(&format!("{USERS_PATH}/{id}"), &[]).await?;
        Ok(response.user)
    }

    #[instrument(skip(self))]
    async fn get_by_name(&self, email: &str) -> ApiResult<Option<User>> {
        let response: UserList = self.api.get(USERS_PATH, &name_query(email)).await?;
        Ok(response.users.into_iter().next())
    }

    #[instrument(skip(self, user), fields(email = %user.email()))]
    async fn add(&self, user: &Self::Descriptor) -> ApiResult<String> {
        let request = self.create_request(user)?;
        let response: UserEnvelope = self.api.post(USERS_PATH, &request).await?;
        let created = response.user.ok_or_else(|| ApiError::MissingEntity {
            path: USERS_PATH.to_string(),
        })?;
        debug!(user_id = %created.id, "Created user");
        Ok(created.id)
    }
}

// =============================================================================
// Wire types (internal)
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateUserRequest<'a> {
    user: UserBody<'a>,
}

#[derive(Debug, Serialize)]
struct UserBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    email: &'a str,
    time_zone: &'a str,
    role: String,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<User>,
}
