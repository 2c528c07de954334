//! Team lookup, creation and membership.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::client::ApiClient;
use crate::entity::{name_query, Entity, EntityClient, EntityKind};
use crate::error::{ApiError, ApiResult};

const TEAMS_PATH: &str = "/teams";

/// Page size used when listing team members.
const MEMBERS_PAGE_SIZE: usize = 100;

/// What the team client needs to create a team.
pub trait NewTeam: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Slack channel alias, folded into the team description.
    fn slack(&self) -> &str;
}

/// A user to place on a team.
pub trait TeamMembership: Send + Sync {
    fn user_id(&self) -> &str;
    /// Team-level role (`responder`, `observer`, `manager`).
    fn role(&self) -> &str;
}

/// PagerDuty team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Entity for Team {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A user's membership on a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamMember {
    pub user_id: String,
    pub role: String,
}

/// Team operations beyond get/get-by-name/add.
#[async_trait]
pub trait TeamApi: EntityClient<Entity = Team, Descriptor = dyn NewTeam> {
    /// Current members of a team, across all pages.
    async fn members(&self, team_id: &str) -> ApiResult<Vec<TeamMember>>;

    /// Put a user on a team with the given role.
    ///
    /// This is a replace-style PUT keyed by (team, user), so repeating it is
    /// harmless.
    async fn add_member(&self, team_id: &str, member: &dyn TeamMembership) -> ApiResult<()>;
}

/// Teams API client.
#[derive(Debug, Clone)]
pub struct TeamClient {
    api: ApiClient,
}

impl TeamClient {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn create_request(team: &dyn NewTeam) -> CreateTeamRequest<'_> {
        CreateTeamRequest {
            team: TeamBody {
                kind: "team",
                name: team.name(),
                description: describe(team.description(), team.slack()),
            },
        }
    }
}

/// Team description with the Slack alias appended when there is one.
fn describe(description: &str, slack: &str) -> String {
    match (description.trim(), slack.trim()) {
        (d, "") => d.to_string(),
        ("", s) => format!("Slack: {s}"),
        (d, s) => format!("{d} (Slack: {s})"),
    }
}

#[async_trait]
impl EntityClient for TeamClient {
    type Entity = Team;
    type Descriptor = dyn NewTeam;

    fn kind(&self) -> EntityKind {
        EntityKind::Team
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> ApiResult<Option<Team>> {
        let response: TeamEnvelope = self.api.get(&format!("{TEAMS_PATH}/{id}"), &[]).await?;
        Ok(response.team)
    }

    #[instrument(skip(self))]
    async fn get_by_name(&self, name: &str) -> ApiResult<Option<Team>> {
        let response: TeamList = self.api.get(TEAMS_PATH, &name_query(name)).await?;
        Ok(response.teams.into_iter().next())
    }

    #[instrument(skip(self, team), fields(team = %team.name()))]
    async fn add(&self, team: &Self::Descriptor) -> ApiResult<String> {
        let request = Self::create_request(team);
        let response: TeamEnvelope = self.api.post(TEAMS_PATH, &request).await?;
        let created = response.team.ok_or_else(|| ApiError::MissingEntity {
            path: TEAMS_PATH.to_string(),
        })?;
        debug!(team_id = %created.id, "Created team");
        Ok(created.id)
    }
}

#[async_trait]
impl TeamApi for TeamClient {
    #[instrument(skip(self))]
    async fn members(&self, team_id: &str) -> ApiResult<Vec<TeamMember>> {
        let path = format!("{TEAMS_PATH}/{team_id}/members");
        let limit = MEMBERS_PAGE_SIZE.to_string();
        let mut members = Vec::new();
        let mut offset = 0usize;

        loop {
            let offset_param = offset.to_string();
            let page: MemberPage = self
                .api
                .get(
                    &path,
                    &[
                        ("total", "true"),
                        ("limit", limit.as_str()),
                        ("offset", offset_param.as_str()),
                    ],
                )
                .await?;

            let fetched = page.members.len();
            members.extend(page.members.into_iter().map(|m| TeamMember {
                user_id: m.user.id,
                role: m.role,
            }));

            if !page.more || fetched == 0 {
                break;
            }
            offset += fetched;
        }

        debug!(count = members.len(), "Listed team members");
        Ok(members)
    }

    #[instrument(skip(self, member), fields(user_id = %member.user_id()))]
    async fn add_member(&self, team_id: &str, member: &dyn TeamMembership) -> ApiResult<()> {
        let path = format!("{TEAMS_PATH}/{team_id}/users/{}", member.user_id());
        self.api
            .put(
                &path,
                &AddMemberRequest {
                    role: member.role(),
                },
            )
            .await
    }
}

// =============================================================================
// Wire types (internal)
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateTeamRequest<'a> {
    team: TeamBody<'a>,
}

#[derive(Debug, Serialize)]
struct TeamBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    description: String,
}

#[derive(Debug, Deserialize)]
struct TeamEnvelope {
    #[serde(default)]
    team: Option<Team>,
}

#[derive(Debug, Deserialize)]
struct TeamList {
    #[serde(default)]
    teams: Vec<Team>,
}

#[derive(Debug, Deserialize)]
struct MemberPage {
    #[serde(default)]
    members: Vec<MemberEntry>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct MemberEntry {
    user: MemberUser,
    #[serde(default)]
    role: String,
}

#[derive(Debug, Deserialize)]
struct MemberUser {
    id: String,
}

#[derive(Debug, Serialize)]
struct AddMemberRequest<'a> {
    role: &'a str,
}
