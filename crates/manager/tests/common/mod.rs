//! In-memory platform for driving the reconciler without HTTP.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use pagerduty::{
    ApiError, ApiResult, Entity, EntityClient, EntityKind, EscalationPolicy, NewEscalationPolicy,
    NewSchedule, NewService, NewTeam, NewUser, Platform, RoleMapping, Schedule, Service, Team,
    TeamApi, TeamMember, TeamMembership, User,
};
use pd_manager::{OrganizationConfig, ValidatedConfig};

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Op {
    Lookup,
    Add,
    Members,
    AddMember,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub kind: EntityKind,
    pub key: String,
}

/// Shared state behind every fake client. IDs are `<kind>:<key>`.
#[derive(Default)]
pub struct FakeStore {
    entities: Mutex<BTreeMap<(EntityKind, String), String>>,
    descriptors: Mutex<BTreeMap<(EntityKind, String), Value>>,
    members: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    failures: Mutex<BTreeSet<(Op, EntityKind, String)>>,
    calls: Mutex<Vec<Call>>,
}

pub fn id_for(kind: EntityKind, key: &str) -> String {
    format!("{kind}:{key}")
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pretend `key` already exists on the platform.
    pub fn seed(&self, kind: EntityKind, key: &str) -> String {
        let id = id_for(kind, key);
        self.entities
            .lock()
            .unwrap()
            .insert((kind, key.to_string()), id.clone());
        id
    }

    /// Pretend `email` is already on team `team`.
    pub fn seed_member(&self, team: &str, email: &str, role: &str) {
        self.members
            .lock()
            .unwrap()
            .entry(id_for(EntityKind::Team, team))
            .or_default()
            .insert(id_for(EntityKind::User, email), role.to_string());
    }

    /// Make `op` on `key` fail with a 500.
    pub fn fail(&self, op: Op, kind: EntityKind, key: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((op, kind, key.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// `(kind, key)` of every create, in call order.
    pub fn adds(&self) -> Vec<(EntityKind, String)> {
        self.calls()
            .into_iter()
            .filter(|c| c.op == Op::Add)
            .map(|c| (c.kind, c.key))
            .collect()
    }

    pub fn adds_of(&self, kind: EntityKind) -> Vec<String> {
        self.adds()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, key)| key)
            .collect()
    }

    /// `team_id/user_id` of every membership write, in call order.
    pub fn membership_adds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.op == Op::AddMember)
            .map(|c| c.key)
            .collect()
    }

    /// What `add` was given for `key`.
    pub fn descriptor(&self, kind: EntityKind, key: &str) -> Option<Value> {
        self.descriptors
            .lock()
            .unwrap()
            .get(&(kind, key.to_string()))
            .cloned()
    }

    pub fn team_role(&self, team: &str, email: &str) -> Option<String> {
        self.members
            .lock()
            .unwrap()
            .get(&id_for(EntityKind::Team, team))?
            .get(&id_for(EntityKind::User, email))
            .cloned()
    }

    fn record(&self, op: Op, kind: EntityKind, key: &str) -> ApiResult<()> {
        self.calls.lock().unwrap().push(Call {
            op,
            kind,
            key: key.to_string(),
        });
        if self
            .failures
            .lock()
            .unwrap()
            .contains(&(op, kind, key.to_string()))
        {
            return Err(ApiError::Status {
                method: "FAKE",
                path: format!("/{kind}/{key}"),
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn lookup(&self, kind: EntityKind, key: &str) -> ApiResult<Option<String>> {
        self.record(Op::Lookup, kind, key)?;
        Ok(self
            .entities
            .lock()
            .unwrap()
            .get(&(kind, key.to_string()))
            .cloned())
    }

    fn find_id(&self, kind: EntityKind, id: &str) -> Option<String> {
        self.entities
            .lock()
            .unwrap()
            .iter()
            .find(|((k, _), v)| *k == kind && v.as_str() == id)
            .map(|((_, key), _)| key.clone())
    }

    fn add(&self, kind: EntityKind, key: &str, descriptor: Value) -> ApiResult<String> {
        self.record(Op::Add, kind, key)?;
        self.descriptors
            .lock()
            .unwrap()
            .insert((kind, key.to_string()), descriptor);
        Ok(self.seed(kind, key))
    }
}

// =============================================================================
// Clients
// =============================================================================

/// Natural key and recorded fields of a descriptor.
pub trait Keyed {
    fn key(&self) -> &str;
    fn snapshot(&self) -> Value;
}

impl Keyed for dyn NewTeam {
    fn key(&self) -> &str {
        self.name()
    }
    fn snapshot(&self) -> Value {
        json!({"description": self.description(), "slack": self.slack()})
    }
}

impl Keyed for dyn NewUser {
    fn key(&self) -> &str {
        self.email()
    }
    fn snapshot(&self) -> Value {
        json!({"name": self.name(), "time_zone": self.time_zone(), "role": self.role()})
    }
}

impl Keyed for dyn NewSchedule {
    fn key(&self) -> &str {
        self.name()
    }
    fn snapshot(&self) -> Value {
        json!({
            "team_id": self.team_id(),
            "time_zone": self.time_zone(),
            "member_ids": self.member_ids(),
            "rotation_start": self.rotation_start().to_string(),
            "turn_secs": self.rotation_turn_length().as_secs(),
        })
    }
}

impl Keyed for dyn NewEscalationPolicy {
    fn key(&self) -> &str {
        self.name()
    }
    fn snapshot(&self) -> Value {
        json!({
            "schedule_id": self.schedule_id(),
            "team_id": self.team_id(),
            "lead_ids": self.lead_ids(),
            "dept_head_ids": self.dept_head_ids(),
        })
    }
}

impl Keyed for dyn NewService {
    fn key(&self) -> &str {
        self.name()
    }
    fn snapshot(&self) -> Value {
        json!({
            "description": self.description(),
            "escalation_policy_id": self.escalation_policy_id(),
            "team_id": self.team_id(),
        })
    }
}

/// Build a wire entity for a stored `(id, key)`.
pub trait FakeEntity {
    fn fake(id: &str, key: &str) -> Self;
}

impl FakeEntity for Team {
    fn fake(id: &str, key: &str) -> Self {
        Self {
            id: id.to_string(),
            name: key.to_string(),
            description: None,
        }
    }
}

impl FakeEntity for User {
    fn fake(id: &str, key: &str) -> Self {
        Self {
            id: id.to_string(),
            email: key.to_string(),
            ..Self::default()
        }
    }
}

impl FakeEntity for Schedule {
    fn fake(id: &str, key: &str) -> Self {
        Self {
            id: id.to_string(),
            name: key.to_string(),
            ..Self::default()
        }
    }
}

impl FakeEntity for EscalationPolicy {
    fn fake(id: &str, key: &str) -> Self {
        Self {
            id: id.to_string(),
            name: key.to_string(),
            ..Self::default()
        }
    }
}

impl FakeEntity for Service {
    fn fake(id: &str, key: &str) -> Self {
        Self {
            id: id.to_string(),
            name: key.to_string(),
            ..Self::default()
        }
    }
}

pub struct FakeClient<E, D: ?Sized> {
    kind: EntityKind,
    store: Arc<FakeStore>,
    _types: PhantomData<fn(&D) -> E>,
}

impl<E, D: ?Sized> FakeClient<E, D> {
    fn new(kind: EntityKind, store: &Arc<FakeStore>) -> Self {
        Self {
            kind,
            store: Arc::clone(store),
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<E, D> EntityClient for FakeClient<E, D>
where
    E: Entity + FakeEntity + Send + 'static,
    D: Keyed + ?Sized + Sync + 'static,
{
    type Entity = E;
    type Descriptor = D;

    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn get(&self, id: &str) -> ApiResult<Option<E>> {
        Ok(self
            .store
            .find_id(self.kind, id)
            .map(|key| E::fake(id, &key)))
    }

    async fn get_by_name(&self, name: &str) -> ApiResult<Option<E>> {
        let found = self.store.lookup(self.kind, name)?;
        Ok(found.map(|id| E::fake(&id, name)))
    }

    async fn add(&self, descriptor: &D) -> ApiResult<String> {
        self.store
            .add(self.kind, descriptor.key(), descriptor.snapshot())
    }
}

#[async_trait]
impl TeamApi for FakeClient<Team, dyn NewTeam> {
    async fn members(&self, team_id: &str) -> ApiResult<Vec<TeamMember>> {
        self.store.record(Op::Members, EntityKind::Team, team_id)?;
        Ok(self
            .store
            .members
            .lock()
            .unwrap()
            .get(team_id)
            .map(|members| {
                members
                    .iter()
                    .map(|(user_id, role)| TeamMember {
                        user_id: user_id.clone(),
                        role: role.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_member(&self, team_id: &str, member: &dyn TeamMembership) -> ApiResult<()> {
        let key = format!("{team_id}/{}", member.user_id());
        self.store.record(Op::AddMember, EntityKind::Team, &key)?;
        self.store
            .members
            .lock()
            .unwrap()
            .entry(team_id.to_string())
            .or_default()
            .insert(member.user_id().to_string(), member.role().to_string());
        Ok(())
    }
}

/// A [`Platform`] backed by `store`.
pub fn platform(store: &Arc<FakeStore>) -> Platform {
    Platform {
        teams: Arc::new(FakeClient::<Team, dyn NewTeam>::new(EntityKind::Team, store)),
        users: Arc::new(FakeClient::<User, dyn NewUser>::new(EntityKind::User, store)),
        schedules: Arc::new(FakeClient::<Schedule, dyn NewSchedule>::new(
            EntityKind::Schedule,
            store,
        )),
        escalation_policies: Arc::new(
            FakeClient::<EscalationPolicy, dyn NewEscalationPolicy>::new(
                EntityKind::EscalationPolicy,
                store,
            ),
        ),
        services: Arc::new(FakeClient::<Service, dyn NewService>::new(
            EntityKind::Service,
            store,
        )),
    }
}

// =============================================================================
// Documents
// =============================================================================

/// Bedrock: two teams sharing a department head, one service each.
pub const BEDROCK: &str = r##"{
    "default_timezone": "Australia/Melbourne",
    "teams": [
        {
            "name": "Flintstones",
            "description": "Quarry operations",
            "slack": "#bedrock",
            "escalation": {"handover": {"day": "monday", "time": "09:00"}, "after": "7d"},
            "members": [
                {"name": "Fred Flintstone", "email": "fred@x.com", "role": "lead"},
                {"name": "Wilma Flintstone", "email": "wilma@x.com", "timezone": "Europe/London", "role": "member"},
                {"name": "Pebbles Flintstone", "email": "pebbles@x.com", "role": "observer"},
                {"name": "Mr Slate", "email": "slate@x.com", "role": "dept-head"}
            ],
            "services": [{"name": "quarry-api", "dashboard": "https://grafana.example.com/d/quarry"}]
        },
        {
            "name": "Rubbles",
            "description": "Gravel logistics",
            "slack": "",
            "members": [
                {"name": "Barney Rubble", "email": "barney@x.com", "role": "lead"},
                {"name": "Betty Rubble", "email": "betty@x.com", "role": "member"},
                {"name": "Mr Slate", "email": "slate@x.com", "role": "dept-head"}
            ],
            "services": [{"name": "gravel-pit", "dashboard": ""}]
        }
    ]
}"##;

pub fn roles() -> Arc<RoleMapping> {
    Arc::new(RoleMapping::standard())
}

pub fn validated(doc: &str) -> ValidatedConfig {
    OrganizationConfig::parse(doc, "test")
        .unwrap()
        .validate(&RoleMapping::standard())
        .unwrap()
}
