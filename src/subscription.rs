//! Subscriber filter configuration.
//!
//! A [`Subscription`] is owned by exactly one subscriber. Loose encodings coming
//! from the command layer (sentinel strings, kind lists, mixed-case levels) are
//! normalized here, at the write boundary, so the matcher only ever sees
//! well-typed values.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::ValidationError;
use crate::event::{EventKind, ImpactLevel};

/// Maximum number of service filters (and of exclude keywords) per subscription.
pub const MAX_FILTER_ENTRIES: usize = 32;
/// Maximum length of one filter substring.
pub const MAX_FILTER_LEN: usize = 100;
/// Maximum length of a subscriber id.
pub const MAX_SUBSCRIBER_ID_LEN: usize = 128;

/// Opaque subscriber identity (for example a chat id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// Validate and wrap a subscriber id.
    ///
    /// # Errors
    /// Empty ids and ids longer than [`MAX_SUBSCRIBER_ID_LEN`] are rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySubscriberId);
        }
        if trimmed.len() > MAX_SUBSCRIBER_ID_LEN {
            return Err(ValidationError::FieldTooLong {
                field: "subscriber_id".to_string(),
                max_length: MAX_SUBSCRIBER_ID_LEN,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The validated id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which event kinds a subscriber wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTypeFilter {
    /// Incidents and maintenance.
    #[default]
    All,
    /// Incidents only.
    IncidentsOnly,
    /// Maintenance windows only.
    MaintenanceOnly,
}

impl EventTypeFilter {
    /// Whether events of `kind` pass this filter.
    #[must_use]
    pub const fn admits(self, kind: EventKind) -> bool {
        !matches!(
            (self, kind),
            (Self::IncidentsOnly, EventKind::Maintenance) | (Self::MaintenanceOnly, EventKind::Incident)
        )
    }

    /// Build the filter from the set of kinds a subscriber ticked.
    ///
    /// Both kinds, or none, means everything.
    #[must_use]
    pub fn from_kinds(incidents: bool, maintenance: bool) -> Self {
        match (incidents, maintenance) {
            (true, false) => Self::IncidentsOnly,
            (false, true) => Self::MaintenanceOnly,
            _ => Self::All,
        }
    }

    /// Parse either a sentinel string or a list of kind names.
    ///
    /// # Errors
    /// `ValidationError::UnknownEventTypeFilter` for any other shape or value.
    pub fn parse_loose(value: &Json) -> Result<Self, ValidationError> {
        match value {
            Json::Null => Ok(Self::All),
            Json::String(s) => s.parse(),
            Json::Array(items) => {
                let mut incidents = false;
                let mut maintenance = false;
                for item in items {
                    let name = item.as_str().ok_or_else(|| ValidationError::UnknownEventTypeFilter {
                        value: item.to_string(),
                    })?;
                    match name.parse::<Self>()? {
                        Self::All => {
                            incidents = true;
                            maintenance = true;
                        }
                        Self::IncidentsOnly => incidents = true,
                        Self::MaintenanceOnly => maintenance = true,
                    }
                }
                Ok(Self::from_kinds(incidents, maintenance))
            }
            other => Err(ValidationError::UnknownEventTypeFilter {
                value: other.to_string(),
            }),
        }
    }

    /// Canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::IncidentsOnly => "incidents_only",
            Self::MaintenanceOnly => "maintenance_only",
        }
    }
}

impl FromStr for EventTypeFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "both" => Ok(Self::All),
            "incident" | "incidents" | "incidents_only" => Ok(Self::IncidentsOnly),
            "maintenance" | "maintenances" | "maintenance_only" => Ok(Self::MaintenanceOnly),
            _ => Err(ValidationError::UnknownEventTypeFilter {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for EventTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter mutation issued by the command layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterCommand {
    /// Add a service substring.
    AddService {
        /// Raw service name; trimmed and lower-cased on apply.
        service: String,
    },
    /// Remove a service substring.
    RemoveService {
        /// Raw service name.
        service: String,
    },
    /// Add the service if absent, remove it if present.
    ToggleService {
        /// Raw service name.
        service: String,
    },
    /// Drop every service filter.
    ClearServices,
    /// Set the incident impact floor.
    SetMinImpact {
        /// New floor; `None` disables it.
        level: ImpactLevel,
    },
    /// Choose which event kinds are wanted.
    SetEventTypes {
        /// New kind filter.
        filter: EventTypeFilter,
    },
    /// Add an exclude keyword.
    AddExclude {
        /// Raw keyword; trimmed and lower-cased on apply.
        keyword: String,
    },
    /// Drop every exclude keyword.
    ClearExcludes,
}

/// One subscriber's filter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Owner of this subscription.
    pub subscriber_id: SubscriberId,
    /// Lower-cased substrings; empty matches every service.
    #[serde(default)]
    pub service_filters: BTreeSet<String>,
    /// Incident impact floor; `None` disables it.
    #[serde(default)]
    pub min_impact: ImpactLevel,
    /// Which event kinds are wanted.
    #[serde(default)]
    pub event_types: EventTypeFilter,
    /// Lower-cased substrings that veto an event outright.
    #[serde(default)]
    pub exclude_keywords: BTreeSet<String>,
    /// When the subscription was first stored.
    pub created_at: DateTime<Utc>,
    /// When a filter last changed.
    pub updated_at: DateTime<Utc>,
}

fn normalize_filter(field: &str, raw: &str) -> Result<Option<String>, ValidationError> {
    let value = raw.trim().to_lowercase();
    if value.is_empty() {
        return Ok(None);
    }
    if value.chars().count() > MAX_FILTER_LEN {
        return Err(ValidationError::FieldTooLong {
            field: field.to_string(),
            max_length: MAX_FILTER_LEN,
        });
    }
    Ok(Some(value))
}

fn insert_filter(set: &mut BTreeSet<String>, field: &str, raw: &str) -> Result<(), ValidationError> {
    let Some(value) = normalize_filter(field, raw)? else {
        return Ok(());
    };
    if !set.contains(&value) && set.len() >= MAX_FILTER_ENTRIES {
        return Err(ValidationError::TooManyEntries {
            field: field.to_string(),
            max: MAX_FILTER_ENTRIES,
        });
    }
    set.insert(value);
    Ok(())
}

fn string_list(record: &Json, key: &str) -> Result<Vec<String>, ValidationError> {
    match record.get(key) {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(Json::String(s)) => Ok(s.split(',').map(str::to_string).collect()),
        Some(Json::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| ValidationError::InvalidConfig {
                    reason: format!("'{key}' entries must be strings"),
                })
            })
            .collect(),
        Some(other) => Err(ValidationError::InvalidConfig {
            reason: format!("'{key}' must be a list of strings, got {other}"),
        }),
    }
}

fn timestamp(record: &Json, key: &str) -> Option<DateTime<Utc>> {
    record
        .get(key)
        .and_then(Json::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl Subscription {
    /// Fresh subscription that matches everything.
    #[must_use]
    pub fn new(subscriber_id: SubscriberId, now: DateTime<Utc>) -> Self {
        Self {
            subscriber_id,
            service_filters: BTreeSet::new(),
            min_impact: ImpactLevel::None,
            event_types: EventTypeFilter::All,
            exclude_keywords: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply one filter command and bump `updated_at`.
    ///
    /// # Errors
    /// Rejects filters that are too long or would exceed [`MAX_FILTER_ENTRIES`];
    /// the subscription is left untouched in that case.
    pub fn apply(&mut self, command: &FilterCommand, now: DateTime<Utc>) -> Result<(), ValidationError> {
        match command {
            FilterCommand::AddService { service } => {
                insert_filter(&mut self.service_filters, "service_filters", service)?;
            }
            FilterCommand::RemoveService { service } => {
                if let Some(value) = normalize_filter("service_filters", service)? {
                    self.service_filters.remove(&value);
                }
            }
            FilterCommand::ToggleService { service } => {
                if let Some(value) = normalize_filter("service_filters", service)? {
                    if !self.service_filters.remove(&value) {
                        insert_filter(&mut self.service_filters, "service_filters", &value)?;
                    }
                }
            }
            FilterCommand::ClearServices => self.service_filters.clear(),
            FilterCommand::SetMinImpact { level } => self.min_impact = *level,
            FilterCommand::SetEventTypes { filter } => self.event_types = *filter,
            FilterCommand::AddExclude { keyword } => {
                insert_filter(&mut self.exclude_keywords, "exclude_keywords", keyword)?;
            }
            FilterCommand::ClearExcludes => self.exclude_keywords.clear(),
        }
        self.updated_at = now;
        Ok(())
    }

    /// Build a subscription from a loosely-typed stored record.
    ///
    /// Accepted keys: `subscriber_id` (string or number), `services` /
    /// `service_filters`, `min_impact`, `event_types` / `event_type_filter`
    /// (sentinel string or kind list), `exclude_keywords`, `created_at`,
    /// `updated_at`. Missing timestamps default to `now`.
    ///
    /// # Errors
    /// Any unparseable dimension rejects the whole record.
    pub fn from_record(record: &Json, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let raw_id = match record.get("subscriber_id") {
            Some(Json::String(s)) => s.clone(),
            Some(Json::Number(n)) => n.to_string(),
            _ => return Err(ValidationError::EmptySubscriberId),
        };
        let subscriber_id = SubscriberId::new(raw_id)?;

        let mut sub = Self::new(subscriber_id, now);

        let services_key = if record.get("services").is_some() { "services" } else { "service_filters" };
        for service in string_list(record, services_key)? {
            insert_filter(&mut sub.service_filters, "service_filters", &service)?;
        }
        for keyword in string_list(record, "exclude_keywords")? {
            insert_filter(&mut sub.exclude_keywords, "exclude_keywords", &keyword)?;
        }

        sub.min_impact = match record.get("min_impact") {
            None | Some(Json::Null) => ImpactLevel::None,
            Some(Json::String(s)) => s.parse()?,
            Some(other) => {
                return Err(ValidationError::UnknownImpactLevel {
                    value: other.to_string(),
                })
            }
        };

        let types = record
            .get("event_types")
            .or_else(|| record.get("event_type_filter"))
            .unwrap_or(&Json::Null);
        sub.event_types = EventTypeFilter::parse_loose(types)?;

        sub.created_at = timestamp(record, "created_at").unwrap_or(now);
        sub.updated_at = timestamp(record, "updated_at").unwrap_or(sub.created_at);
        Ok(sub)
    }
}
