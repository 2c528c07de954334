//! Natural key to platform ID index, filled in as phases resolve entities.

use std::collections::BTreeMap;

use pagerduty::EntityKind;
use serde::Serialize;
use tokio::sync::Mutex;

type Ids = BTreeMap<String, String>;

/// Resolved platform IDs, one lock per entity kind.
///
/// Workers in the same phase only contend on their own kind.
#[derive(Debug, Default)]
pub struct ResolvedIds {
    teams: Mutex<Ids>,
    users: Mutex<Ids>,
    schedules: Mutex<Ids>,
    escalation_policies: Mutex<Ids>,
    services: Mutex<Ids>,
}

/// Point-in-time copy of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdSnapshot(pub BTreeMap<EntityKind, Ids>);

impl ResolvedIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: EntityKind) -> &Mutex<Ids> {
        match kind {
            EntityKind::Team => &self.teams,
            EntityKind::User => &self.users,
            EntityKind::Schedule => &self.schedules,
            EntityKind::EscalationPolicy => &self.escalation_policies,
            EntityKind::Service => &self.services,
        }
    }

    /// Record `key -> id`, replacing any earlier entry.
    pub async fn insert(&self, kind: EntityKind, key: &str, id: &str) {
        self.slot(kind)
            .lock()
            .await
            .insert(key.to_string(), id.to_string());
    }

    pub async fn get(&self, kind: EntityKind, key: &str) -> Option<String> {
        self.slot(kind).lock().await.get(key).cloned()
    }

    /// IDs for `keys` in order, or the first key that has none.
    pub async fn get_all<'k>(
        &self,
        kind: EntityKind,
        keys: impl IntoIterator<Item = &'k str>,
    ) -> Result<Vec<String>, &'k str> {
        let ids = self.slot(kind).lock().await;
        keys.into_iter()
            .map(|key| ids.get(key).cloned().ok_or(key))
            .collect()
    }

    pub async fn len(&self, kind: EntityKind) -> usize {
        self.slot(kind).lock().await.len()
    }

    pub async fn snapshot(&self) -> IdSnapshot {
        let mut all = BTreeMap::new();
        for kind in [
            EntityKind::Team,
            EntityKind::User,
            EntityKind::Schedule,
            EntityKind::EscalationPolicy,
            EntityKind::Service,
        ] {
            let ids = self.slot(kind).lock().await.clone();
            if !ids.is_empty() {
                all.insert(kind, ids);
            }
        }
        IdSnapshot(all)
    }
}

impl IdSnapshot {
    #[must_use]
    pub fn get(&self, kind: EntityKind, key: &str) -> Option<&str> {
        self.0.get(&kind)?.get(key).map(String::as_str)
    }
}
