//! Organization document: loading, parsing and validation.
//!
//! The document is JSON:
//!
//! ```json
//! {
//!   "default_timezone": "Australia/Melbourne",
//!   "teams": [{
//!     "name": "Flintstones",
//!     "description": "Quarry operations",
//!     "slack": "#bedrock",
//!     "escalation": { "handover": { "day": "monday", "time": "09:00" }, "after": "7d" },
//!     "members": [{ "name": "Fred Flintstone", "email": "fred@x.com", "role": "lead" }],
//!     "services": [{ "name": "quarry-api", "dashboard": "https://grafana.example.com/d/quarry" }]
//!   }]
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{Datelike, Days, NaiveDateTime, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;
use pagerduty::{NewTeam, RoleMapping};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Time zone used when neither the member nor the document names one.
pub const FALLBACK_TIMEZONE: &str = "UTC";

/// Errors raised before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed organization document {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("organization document defines no teams")]
    NoTeams,

    #[error("team '{team}': member '{member}' <{email}> has unknown role '{role}'")]
    InvalidRole {
        team: String,
        member: String,
        email: String,
        role: String,
    },
}

/// Root of the organization document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationConfig {
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

fn default_timezone() -> String {
    FALLBACK_TIMEZONE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Slack channel or alias for the team, e.g. `#bedrock`.
    #[serde(default)]
    pub slack: String,
    #[serde(default)]
    pub escalation: Option<Escalation>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub timezone: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Dashboard URL, used as the service description.
    #[serde(default)]
    pub dashboard: String,
}

/// When the on-call rotation hands over and how long each turn lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub handover: Handover,
    pub after: TurnLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handover {
    pub day: HandoverDay,
    pub time: HandoverTime,
}

/// Weekday name, `monday` or `Mon`, any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HandoverDay(pub Weekday);

/// Time of day, `HH:MM` or `HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HandoverTime(pub NaiveTime);

/// Rotation turn length written as `<n><unit>`, unit one of `m`, `h`, `d`, `w`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TurnLength(pub Duration);

impl Default for Escalation {
    /// Monday 09:00, one-week turns.
    fn default() -> Self {
        Self {
            handover: Handover {
                day: HandoverDay(Weekday::Mon),
                time: HandoverTime(NaiveTime::MIN + chrono::Duration::hours(9)),
            },
            after: TurnLength(Duration::from_secs(7 * 24 * 3600)),
        }
    }
}

impl Escalation {
    /// The latest handover at or before `now`.
    #[must_use]
    pub fn rotation_start(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        let back = (7 + today.weekday().num_days_from_monday()
            - self.handover.day.0.num_days_from_monday())
            % 7;
        let start = (today - Days::new(u64::from(back))).and_time(self.handover.time.0);
        if start > now {
            start - chrono::Duration::weeks(1)
        } else {
            start
        }
    }
}

impl TryFrom<String> for HandoverDay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Weekday::from_str(value.trim())
            .map(Self)
            .map_err(|_| format!("'{value}' is not a weekday"))
    }
}

impl From<HandoverDay> for String {
    fn from(day: HandoverDay) -> Self {
        day.0.to_string()
    }
}

impl TryFrom<String> for HandoverTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .map(Self)
            .map_err(|_| format!("'{value}' is not a time of day (HH:MM)"))
    }
}

impl From<HandoverTime> for String {
    fn from(time: HandoverTime) -> Self {
        time.0.format("%H:%M:%S").to_string()
    }
}

impl TryFrom<String> for TurnLength {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for TurnLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("'{s}' is not a duration like 12h or 7d");

        let unit_at = s.len().checked_sub(1).ok_or_else(invalid)?;
        if !s.is_char_boundary(unit_at) {
            return Err(invalid());
        }
        let (count, unit) = s.split_at(unit_at);
        let count: u64 = count.parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }

        let unit_secs = match unit {
            "m" => 60,
            "h" => 3600,
            "d" => 24 * 3600,
            "w" => 7 * 24 * 3600,
            _ => return Err(invalid()),
        };
        count
            .checked_mul(unit_secs)
            .map(|secs| Self(Duration::from_secs(secs)))
            .ok_or_else(invalid)
    }
}

impl fmt::Display for TurnLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        for (unit, size) in [("w", 7 * 24 * 3600), ("d", 24 * 3600), ("h", 3600)] {
            if secs % size == 0 {
                return write!(f, "{}{unit}", secs / size);
            }
        }
        write!(f, "{}m", secs / 60)
    }
}

impl From<TurnLength> for String {
    fn from(length: TurnLength) -> Self {
        length.to_string()
    }
}

impl Member {
    /// The member's own time zone, else `default`.
    #[must_use]
    pub fn time_zone<'a>(&'a self, default: &'a str) -> &'a str {
        match self.timezone.as_deref() {
            Some(tz) if !tz.trim().is_empty() => tz,
            _ => default,
        }
    }
}

impl Team {
    /// Escalation settings, defaulted when the team has none.
    #[must_use]
    pub fn escalation(&self) -> Escalation {
        self.escalation.unwrap_or_default()
    }

    /// Name of the team's on-call schedule.
    #[must_use]
    pub fn schedule_name(&self) -> String {
        format!("{} On-call", self.name)
    }

    /// Name of the team's escalation policy.
    #[must_use]
    pub fn policy_name(&self) -> String {
        format!("{} Escalation", self.name)
    }

    /// Name of the paging alias service, when the team has a Slack handle.
    #[must_use]
    pub fn oncall_service_name(&self) -> Option<String> {
        let handle = self.slack.trim().trim_start_matches(['#', '@']);
        (!handle.is_empty()).then(|| format!("oncall-{handle}"))
    }
}

impl NewTeam for Team {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn slack(&self) -> &str {
        &self.slack
    }
}

impl OrganizationConfig {
    /// Read and parse a document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse a document; `origin` names it in errors.
    pub fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    /// Check the document against the role table.
    ///
    /// Succeeds iff there is at least one team and every member's role is a
    /// key of `roles`. Reports the first offending member in document order.
    pub fn validate(self, roles: &RoleMapping) -> Result<ValidatedConfig, ConfigError> {
        if self.teams.is_empty() {
            return Err(ConfigError::NoTeams);
        }

        for team in &self.teams {
            if let Some(member) = team.members.iter().find(|m| !roles.contains(&m.role)) {
                return Err(ConfigError::InvalidRole {
                    team: team.name.clone(),
                    member: member.name.clone(),
                    email: member.email.clone(),
                    role: member.role.clone(),
                });
            }
        }

        debug!(teams = self.teams.len(), "Organization document validated");
        Ok(ValidatedConfig(self))
    }
}

/// A document that passed [`OrganizationConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig(OrganizationConfig);

impl ValidatedConfig {
    #[must_use]
    pub fn teams(&self) -> &[Team] {
        &self.0.teams
    }

    #[must_use]
    pub fn default_timezone(&self) -> &str {
        &self.0.default_timezone
    }

    /// `now_utc` as wall-clock time in the default time zone.
    ///
    /// A zone name chrono-tz does not know leaves the clock in UTC.
    #[must_use]
    pub fn local_time(&self, now_utc: NaiveDateTime) -> NaiveDateTime {
        match self.0.default_timezone.parse::<Tz>() {
            Ok(zone) => zone.from_utc_datetime(&now_utc).naive_local(),
            Err(_) => now_utc,
        }
    }
}
