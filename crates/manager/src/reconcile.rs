//! The reconciliation state machine.
//!
//! A [`Reconciler`] walks the phases in dependency order:
//!
//! ```text
//! Parsed -> TeamsSynced -> UsersSynced -> SchedulesSynced -> EscalationSynced -> ServicesSynced
//! ```
//!
//! Each phase looks every natural key up by name, creates what is missing and
//! records the platform ID in the [`ResolvedIds`] index, where later phases
//! find the IDs they reference. The first error moves the machine to
//! `Failed(phase)`; nothing already created is rolled back.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use pagerduty::{
    ApiError, Entity, EntityClient, EntityKind, EscalationPolicyApi, EscalationTier, Platform,
    RoleMapping, ScheduleApi, ServiceApi, TeamApi, UserApi,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{Member, Team, ValidatedConfig};
use crate::descriptors::{
    MembershipDescriptor, PolicyDescriptor, ScheduleDescriptor, ServiceDescriptor, UserDescriptor,
};
use crate::error::ReconcileError;
use crate::index::{IdSnapshot, ResolvedIds};
use crate::report::{PhaseReport, ReconcileReport, Resolved};
use crate::state::{Phase, State};

/// Entities worked on at once within a phase.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Tuning for a run.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// Upper bound on in-flight entities per phase; at least 1.
    pub concurrency: usize,
    /// Reference time (UTC) for rotation starts of new schedules.
    pub now: NaiveDateTime,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            now: Utc::now().naive_utc(),
        }
    }
}

impl ReconcileOptions {
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub state: State,
    pub report: ReconcileReport,
    pub ids: IdSnapshot,
}

pub struct Reconciler {
    config: ValidatedConfig,
    platform: Platform,
    roles: Arc<RoleMapping>,
    options: ReconcileOptions,
    index: ResolvedIds,
    state: State,
    report: ReconcileReport,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        config: ValidatedConfig,
        platform: Platform,
        roles: Arc<RoleMapping>,
        options: ReconcileOptions,
    ) -> Self {
        Self::resume(
            config,
            platform,
            roles,
            options,
            State::Parsed,
            ResolvedIds::new(),
        )
    }

    /// Continue from `state` with IDs resolved elsewhere.
    #[must_use]
    pub fn resume(
        config: ValidatedConfig,
        platform: Platform,
        roles: Arc<RoleMapping>,
        options: ReconcileOptions,
        state: State,
        index: ResolvedIds,
    ) -> Self {
        Self {
            config,
            platform,
            roles,
            options: options.with_concurrency(options.concurrency),
            index,
            state,
            report: ReconcileReport::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn report(&self) -> &ReconcileReport {
        &self.report
    }

    #[must_use]
    pub fn index(&self) -> &ResolvedIds {
        &self.index
    }

    /// Run the next phase and return the new state.
    ///
    /// A no-op once every phase has completed; [`ReconcileError::Halted`]
    /// once a phase has failed.
    pub async fn step(&mut self) -> Result<State, ReconcileError> {
        let phase = match self.state {
            State::Failed(phase) => return Err(ReconcileError::Halted(phase)),
            state => match state.next_phase() {
                Some(phase) => phase,
                None => return Ok(state),
            },
        };

        info!(%phase, "Starting phase");
        let result = match phase {
            Phase::Teams => self.sync_teams().await,
            Phase::Users => self.sync_users().await,
            Phase::Schedules => self.sync_schedules().await,
            Phase::EscalationPolicies => self.sync_escalation_policies().await,
            Phase::Services => self.sync_services().await,
        };

        match result {
            Ok(report) => {
                info!(
                    %phase,
                    found = report.found.len(),
                    created = report.created.len(),
                    "Phase complete"
                );
                self.report.phases.push(report);
                self.state = phase.completed();
                Ok(self.state)
            }
            Err(err) => {
                warn!(%phase, error = %err, "Phase failed");
                self.state = State::Failed(phase);
                Err(err)
            }
        }
    }

    /// Step until every phase has completed or one fails.
    pub async fn run(mut self) -> Result<Reconciliation, ReconcileError> {
        while !self.state.is_terminal() {
            self.step().await?;
        }
        if let State::Failed(phase) = self.state {
            return Err(ReconcileError::Halted(phase));
        }

        self.report.finished_at = Some(Utc::now());
        Ok(Reconciliation {
            state: self.state,
            ids: self.index.snapshot().await,
            report: self.report,
        })
    }

    // =========================================================================
    // Phases
    // =========================================================================

    async fn sync_teams(&self) -> Result<PhaseReport, ReconcileError> {
        let teams = unique_by(self.config.teams(), |t| t.name.as_str());
        let resolved = self
            .concurrently(teams.into_iter().map(|team| self.sync_team(team)))
            .await?;
        Ok(PhaseReport::from_resolved(Phase::Teams, resolved))
    }

    async fn sync_users(&self) -> Result<PhaseReport, ReconcileError> {
        let members = unique_by(
            self.config.teams().iter().flat_map(|t| &t.members),
            |m| m.email.as_str(),
        );
        let resolved = self
            .concurrently(members.into_iter().map(|member| self.sync_user(member)))
            .await?;
        let mut report = PhaseReport::from_resolved(Phase::Users, resolved);

        let added = self
            .concurrently(
                self.config
                    .teams()
                    .iter()
                    .map(|team| self.sync_memberships(team)),
            )
            .await?;
        report.memberships_added = added.into_iter().flatten().collect();
        Ok(report)
    }

    async fn sync_schedules(&self) -> Result<PhaseReport, ReconcileError> {
        let teams = unique_by(self.config.teams(), |t| t.name.as_str());
        let resolved = self
            .concurrently(teams.into_iter().map(|team| self.sync_schedule(team)))
            .await?;
        Ok(PhaseReport::from_resolved(Phase::Schedules, resolved))
    }

    async fn sync_escalation_policies(&self) -> Result<PhaseReport, ReconcileError> {
        let teams = unique_by(self.config.teams(), |t| t.name.as_str());
        let resolved = self
            .concurrently(teams.into_iter().map(|team| self.sync_policy(team)))
            .await?;
        Ok(PhaseReport::from_resolved(Phase::EscalationPolicies, resolved))
    }

    async fn sync_services(&self) -> Result<PhaseReport, ReconcileError> {
        let jobs = self.service_jobs();
        let resolved = self
            .concurrently(jobs.iter().map(|job| self.sync_service(job)))
            .await?;
        Ok(PhaseReport::from_resolved(Phase::Services, resolved))
    }

    // =========================================================================
    // Per-entity work
    // =========================================================================

    async fn sync_team(&self, team: &Team) -> Result<Resolved, ReconcileError> {
        let client = &*self.platform.teams;
        if let Some(found) = self.find_existing(Phase::Teams, client, &team.name).await? {
            return Ok(found);
        }
        self.create::<dyn TeamApi>(Phase::Teams, client, &team.name, team)
            .await
    }

    async fn sync_user(&self, member: &Member) -> Result<Resolved, ReconcileError> {
        let client = &*self.platform.users;
        if let Some(found) = self.find_existing(Phase::Users, client, &member.email).await? {
            return Ok(found);
        }
        let descriptor = UserDescriptor::from_member(member, self.config.default_timezone());
        self.create::<UserApi>(Phase::Users, client, &member.email, &descriptor)
            .await
    }

    /// Add configured members that are not on the team yet.
    #[instrument(skip_all, fields(team = %team.name))]
    async fn sync_memberships(&self, team: &Team) -> Result<Vec<String>, ReconcileError> {
        let phase = Phase::Users;
        let members = unique_by(&team.members, |m| m.email.as_str());
        let Some(first) = members.first() else {
            return Ok(Vec::new());
        };

        let unresolved_membership = |user: &str, missing: (EntityKind, &str)| {
            ReconcileError::UnresolvedMembership {
                phase,
                team: team.name.clone(),
                user: user.to_string(),
                missing_kind: missing.0,
                missing_key: missing.1.to_string(),
            }
        };

        let team_id = self
            .index
            .get(EntityKind::Team, &team.name)
            .await
            .ok_or_else(|| {
                unresolved_membership(first.email.as_str(), (EntityKind::Team, team.name.as_str()))
            })?;

        let current: BTreeSet<String> = self
            .platform
            .teams
            .members(&team_id)
            .await
            .map_err(|source| ReconcileError::Lookup {
                phase,
                kind: EntityKind::Team,
                key: team.name.clone(),
                source,
            })?
            .into_iter()
            .map(|m| m.user_id)
            .collect();

        let mut added = Vec::new();
        for member in members {
            let user_id = self
                .index
                .get(EntityKind::User, &member.email)
                .await
                .ok_or_else(|| {
                    let email = member.email.as_str();
                    unresolved_membership(email, (EntityKind::User, email))
                })?;
            if current.contains(&user_id) {
                debug!(user = %member.email, "Already a team member");
                continue;
            }

            let membership_error = |source| ReconcileError::Membership {
                phase,
                team: team.name.clone(),
                user: member.email.clone(),
                source,
            };
            let role = self
                .roles
                .team_role(&member.role)
                .ok_or_else(|| membership_error(ApiError::UnmappedRole(member.role.clone())))?;

            let membership = MembershipDescriptor {
                user_id,
                role: role.to_string(),
            };
            self.platform
                .teams
                .add_member(&team_id, &membership)
                .await
                .map_err(membership_error)?;

            info!(user = %member.email, role, "Added team member");
            added.push(format!("{}/{}", team.name, member.email));
        }
        Ok(added)
    }

    async fn sync_schedule(&self, team: &Team) -> Result<Resolved, ReconcileError> {
        let client = &*self.platform.schedules;
        let key = team.schedule_name();
        if let Some(found) = self.find_existing(Phase::Schedules, client, &key).await? {
            return Ok(found);
        }
        let descriptor = self.schedule_descriptor(team, &key).await?;
        self.create::<ScheduleApi>(Phase::Schedules, client, &key, &descriptor)
            .await
    }

    async fn sync_policy(&self, team: &Team) -> Result<Resolved, ReconcileError> {
        let client = &*self.platform.escalation_policies;
        let key = team.policy_name();
        if let Some(found) = self
            .find_existing(Phase::EscalationPolicies, client, &key)
            .await?
        {
            return Ok(found);
        }
        let descriptor = self.policy_descriptor(team, &key).await?;
        self.create::<EscalationPolicyApi>(Phase::EscalationPolicies, client, &key, &descriptor)
            .await
    }

    async fn sync_service(&self, job: &ServiceJob<'_>) -> Result<Resolved, ReconcileError> {
        let client = &*self.platform.services;
        if let Some(found) = self.find_existing(Phase::Services, client, &job.name).await? {
            return Ok(found);
        }
        let descriptor = self.service_descriptor(job).await?;
        self.create::<ServiceApi>(Phase::Services, client, &job.name, &descriptor)
            .await
    }

    // =========================================================================
    // Descriptors
    // =========================================================================

    async fn schedule_descriptor(
        &self,
        team: &Team,
        key: &str,
    ) -> Result<ScheduleDescriptor, ReconcileError> {
        let phase = Phase::Schedules;
        let dependent = (EntityKind::Schedule, key);
        let team_id = self
            .require(phase, dependent, (EntityKind::Team, &team.name))
            .await?;
        let member_ids = self
            .require_users(phase, dependent, self.emails_where(team, EscalationTier::on_call))
            .await?;
        let escalation = team.escalation();
        let local_now = self.config.local_time(self.options.now);

        Ok(ScheduleDescriptor {
            name: key.to_string(),
            description: team.description.clone(),
            time_zone: self.config.default_timezone().to_string(),
            team_id,
            member_ids,
            rotation_start: escalation.rotation_start(local_now),
            rotation_turn_length: escalation.after.0,
        })
    }

    async fn policy_descriptor(
        &self,
        team: &Team,
        key: &str,
    ) -> Result<PolicyDescriptor, ReconcileError> {
        let phase = Phase::EscalationPolicies;
        let dependent = (EntityKind::EscalationPolicy, key);
        let schedule_id = self
            .require(
                phase,
                dependent,
                (EntityKind::Schedule, &team.schedule_name()),
            )
            .await?;
        let team_id = self
            .require(phase, dependent, (EntityKind::Team, &team.name))
            .await?;
        let lead_ids = self
            .require_users(
                phase,
                dependent,
                self.emails_where(team, |tier| tier == EscalationTier::Lead),
            )
            .await?;
        let dept_head_ids = self
            .require_users(
                phase,
                dependent,
                self.emails_where(team, |tier| tier == EscalationTier::DepartmentHead),
            )
            .await?;

        Ok(PolicyDescriptor {
            name: key.to_string(),
            description: team.description.clone(),
            schedule_id,
            team_id,
            lead_ids,
            dept_head_ids,
        })
    }

    async fn service_descriptor(
        &self,
        job: &ServiceJob<'_>,
    ) -> Result<ServiceDescriptor, ReconcileError> {
        let phase = Phase::Services;
        let dependent = (EntityKind::Service, job.name.as_str());
        let escalation_policy_id = self
            .require(
                phase,
                dependent,
                (EntityKind::EscalationPolicy, &job.team.policy_name()),
            )
            .await?;
        let team_id = self
            .require(phase, dependent, (EntityKind::Team, &job.team.name))
            .await?;

        Ok(ServiceDescriptor {
            name: job.name.clone(),
            description: job.description.clone(),
            escalation_policy_id,
            team_id,
        })
    }

    /// Configured services plus each team's on-call alias, first name wins.
    fn service_jobs(&self) -> Vec<ServiceJob<'_>> {
        let mut seen = BTreeSet::new();
        let mut jobs = Vec::new();

        for team in self.config.teams() {
            let configured = team
                .services
                .iter()
                .map(|s| (s.name.clone(), s.dashboard.clone()));
            let alias = team
                .oncall_service_name()
                .map(|name| (name, format!("Pages the {} on-call", team.name)));

            for (name, description) in configured.chain(alias) {
                if seen.insert(name.clone()) {
                    jobs.push(ServiceJob {
                        team,
                        name,
                        description,
                    });
                }
            }
        }
        jobs
    }

    /// Emails of the team's members whose tier matches, in document order.
    fn emails_where<'t>(
        &self,
        team: &'t Team,
        wanted: impl Fn(EscalationTier) -> bool,
    ) -> Vec<&'t str> {
        unique_by(&team.members, |m| m.email.as_str())
            .into_iter()
            .filter(|m| self.roles.grant(&m.role).is_some_and(|g| wanted(g.tier)))
            .map(|m| m.email.as_str())
            .collect()
    }

    // =========================================================================
    // Lookup, create and index helpers
    // =========================================================================

    /// Index `key` if the platform already has it.
    async fn find_existing<C>(
        &self,
        phase: Phase,
        client: &C,
        key: &str,
    ) -> Result<Option<Resolved>, ReconcileError>
    where
        C: EntityClient + ?Sized,
    {
        let kind = client.kind();
        let existing = client
            .get_by_name(key)
            .await
            .map_err(|source| ReconcileError::Lookup {
                phase,
                kind,
                key: key.to_string(),
                source,
            })?;

        let Some(entity) = existing else {
            return Ok(None);
        };
        debug!(%phase, %kind, key, id = entity.id(), "Already exists");
        self.index.insert(kind, key, entity.id()).await;
        Ok(Some(Resolved::found(key)))
    }

    async fn create<C>(
        &self,
        phase: Phase,
        client: &C,
        key: &str,
        descriptor: &C::Descriptor,
    ) -> Result<Resolved, ReconcileError>
    where
        C: EntityClient + ?Sized,
    {
        let kind = client.kind();
        let id = client
            .add(descriptor)
            .await
            .map_err(|source| ReconcileError::Create {
                phase,
                kind,
                key: key.to_string(),
                source,
            })?;

        info!(%phase, %kind, key, id = %id, "Created");
        self.index.insert(kind, key, &id).await;
        Ok(Resolved::created(key))
    }

    async fn require(
        &self,
        phase: Phase,
        dependent: (EntityKind, &str),
        missing: (EntityKind, &str),
    ) -> Result<String, ReconcileError> {
        self.index
            .get(missing.0, missing.1)
            .await
            .ok_or_else(|| unresolved(phase, dependent, missing))
    }

    async fn require_users(
        &self,
        phase: Phase,
        dependent: (EntityKind, &str),
        emails: Vec<&str>,
    ) -> Result<Vec<String>, ReconcileError> {
        self.index
            .get_all(EntityKind::User, emails)
            .await
            .map_err(|email| unresolved(phase, dependent, (EntityKind::User, email)))
    }

    /// Drive `work` with at most `concurrency` futures in flight, keeping
    /// input order. Stops starting new work at the first error.
    async fn concurrently<T, Fut>(
        &self,
        work: impl IntoIterator<Item = Fut>,
    ) -> Result<Vec<T>, ReconcileError>
    where
        Fut: Future<Output = Result<T, ReconcileError>>,
    {
        stream::iter(work)
            .buffered(self.options.concurrency)
            .try_collect()
            .await
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("state", &self.state)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

struct ServiceJob<'a> {
    team: &'a Team,
    name: String,
    description: String,
}

fn unresolved(
    phase: Phase,
    dependent: (EntityKind, &str),
    missing: (EntityKind, &str),
) -> ReconcileError {
    ReconcileError::Unresolved {
        phase,
        kind: dependent.0,
        key: dependent.1.to_string(),
        missing_kind: missing.0,
        missing_key: missing.1.to_string(),
    }
}

/// Items in order, dropping any whose key was already seen.
fn unique_by<'a, T, K>(
    items: impl IntoIterator<Item = &'a T>,
    key: impl Fn(&'a T) -> &'a K,
) -> Vec<&'a T>
where
    T: 'a,
    K: Ord + ?Sized + 'a,
{
    let mut seen = BTreeSet::new();
    items.into_iter().filter(|item| seen.insert(key(*item))).collect()
}
