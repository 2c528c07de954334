//! On-call schedule lookup and creation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::client::ApiClient;
use crate::entity::{name_query, Entity, EntityClient, EntityKind, Reference};
use crate::error::{ApiError, ApiResult};

const SCHEDULES_PATH: &str = "/schedules";

/// Timestamp layout for layer start times. The schedule's own time zone
/// applies, so no offset is written.
const LAYER_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// What the schedule client needs to create a schedule.
pub trait NewSchedule: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn time_zone(&self) -> &str;
    fn team_id(&self) -> &str;
    /// Users in rotation order.
    fn member_ids(&self) -> &[String];
    /// First handover, in the schedule's time zone.
    fn rotation_start(&self) -> NaiveDateTime;
    fn rotation_turn_length(&self) -> Duration;
}

/// One rotation layer of a schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleLayer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub rotation_virtual_start: String,
    #[serde(default)]
    pub rotation_turn_length_seconds: u64,
    #[serde(default)]
    pub users: Vec<LayerUser>,
}

/// Entry of a layer's user list (`{"user": {...}}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerUser {
    pub user: Reference,
}

/// PagerDuty on-call schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub time_zone: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub teams: Vec<Reference>,
    #[serde(default)]
    pub schedule_layers: Vec<ScheduleLayer>,
}

impl Entity for Schedule {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Build a single-layer schedule rotating through the members in order.
#[must_use]
pub fn build_schedule(schedule: &dyn NewSchedule) -> Schedule {
    let start = schedule
        .rotation_start()
        .format(LAYER_TIME_FORMAT)
        .to_string();

    let layer = ScheduleLayer {
        id: String::new(),
        name: "Layer 1".to_string(),
        start: start.clone(),
        rotation_virtual_start: start,
        rotation_turn_length_seconds: schedule.rotation_turn_length().as_secs(),
        users: schedule
            .member_ids()
            .iter()
            .map(|id| LayerUser {
                user: Reference::new(id.as_str(), "user_reference"),
            })
            .collect(),
    };

    Schedule {
        id: String::new(),
        kind: "schedule".to_string(),
        name: schedule.name().to_string(),
        time_zone: schedule.time_zone().to_string(),
        description: schedule.description().to_string(),
        teams: vec![Reference::new(schedule.team_id(), "team_reference")],
        schedule_layers: vec![layer],
    }
}

/// Schedules API client.
#[derive(Debug, Clone)]
pub struct ScheduleClient {
    api: ApiClient,
}

impl ScheduleClient {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EntityClient for ScheduleClient {
    type Entity = Schedule;
    type Descriptor = dyn NewSchedule;

    fn kind(&self) -> EntityKind {
        EntityKind::Schedule
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> ApiResult<Option<Schedule>> {
        let response: ScheduleEnvelope =
            self.api.get(&format!("{SCHEDULES_PATH}/{id}"), &[]).await?;
        Ok(response.schedule)
    }

    #[instrument(skip(self))]
    async fn get_by_name(&self, name: &str) -> ApiResult<Option<Schedule>> {
        let response: ScheduleList = self.api.get(SCHEDULES_PATH, &name_query(name)).await?;
        Ok(response.schedules.into_iter().next())
    }

    #[instrument(skip(self, schedule), fields(schedule = %schedule.name()))]
    async fn add(&self, schedule: &Self::Descriptor) -> ApiResult<String> {
        let request = ScheduleEnvelope {
            schedule: Some(build_schedule(schedule)),
        };
        let response: ScheduleEnvelope = self.api.post(SCHEDULES_PATH, &request).await?;
        let created = response.schedule.ok_or_else(|| ApiError::MissingEntity {
            path: SCHEDULES_PATH.to_string(),
        })?;
        debug!(schedule_id = %created.id, "Created schedule");
        Ok(created.id)
    }
}

// =============================================================================
// Wire types (internal)
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ScheduleEnvelope {
    #[serde(default)]
    schedule: Option<Schedule>,
}

#[derive(Debug, Deserialize)]
struct ScheduleList {
    #[serde(default)]
    schedules: Vec<Schedule>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    struct Quarry {
        members: Vec<String>,
    }

    impl NewSchedule for Quarry {
        fn name(&self) -> &str {
            "Flintstones On-call"
        }
        fn description(&self) -> &str {
            "Quarry operations"
        }
        fn time_zone(&self) -> &str {
            "Australia/Melbourne"
        }
        fn team_id(&self) -> &str {
            "FLINT"
        }
        fn member_ids(&self) -> &[String] {
            &self.members
        }
        fn rotation_start(&self) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 1, 8)
                .and_then(|d| d.and_hms_opt(9, 0, 0))
                .unwrap()
        }
        fn rotation_turn_length(&self) -> Duration {
            Duration::from_secs(7 * 24 * 3600)
        }
    }

    #[test]
    fn test_build_schedule_single_layer() {
        let schedule = build_schedule(&Quarry {
            members: vec!["FRED".into(), "BARNEY".into()],
        });

        assert_eq!(schedule.kind, "schedule");
        assert_eq!(schedule.time_zone, "Australia/Melbourne");
        assert_eq!(schedule.teams[0].id, "FLINT");
        assert_eq!(schedule.schedule_layers.len(), 1);

        let layer = &schedule.schedule_layers[0];
        assert_eq!(layer.start, "2024-01-08T09:00:00");
        assert_eq!(layer.rotation_virtual_start, layer.start);
        assert_eq!(layer.rotation_turn_length_seconds, 604_800);
        let users: Vec<&str> = layer.users.iter().map(|u| u.user.id.as_str()).collect();
        assert_eq!(users, vec!["FRED", "BARNEY"]);
    }

    #[test]
    fn test_layer_user_wire_shape() {
        let schedule = build_schedule(&Quarry {
            members: vec!["FRED".into()],
        });
        let json = serde_json::to_value(&schedule.schedule_layers[0]).unwrap();
        assert_eq!(
            json["users"],
            serde_json::json!([{"user": {"id": "FRED", "type": "user_reference"}}])
        );
        assert!(json.get("id").is_none());
    }
}
