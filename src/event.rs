//! Canonical status events.
//!
//! Every record the upstream feed reports, whether an incident or a
//! maintenance window, is normalized into a [`CanonicalEvent`]. Change detection
//! works on the event's [`Fingerprint`], a deliberately coarse digest of its
//! status and the identity of its latest update.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Separator between status and latest update id inside a fingerprint.
pub const FINGERPRINT_SEPARATOR: char = ':';

/// Kind of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Unplanned service disruption.
    Incident,
    /// Scheduled maintenance window (active or upcoming).
    Maintenance,
}

impl EventKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incident => "incident",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident severity, totally ordered `None < Minor < Major < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    /// No impact, or no floor when used as a subscription minimum.
    #[default]
    None,
    /// Degraded for some players.
    Minor,
    /// Broadly degraded.
    Major,
    /// Outage.
    Critical,
}

impl ImpactLevel {
    /// All levels in ascending order.
    pub const ALL: [Self; 4] = [Self::None, Self::Minor, Self::Major, Self::Critical];

    /// Ordinal rank used by the impact floor comparison.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Minor => 1,
            Self::Major => 2,
            Self::Critical => 3,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }

    /// Lenient parse used for feed payloads: unknown values rank as `None`.
    #[must_use]
    pub fn from_feed(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImpactLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            "critical" => Ok(Self::Critical),
            _ => Err(ValidationError::UnknownImpactLevel {
                value: s.to_string(),
            }),
        }
    }
}

/// Coarse change-detection digest: `status` + separator + latest update id.
///
/// Edits that only touch an update's body under the same update id do not
/// change the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive a fingerprint from a status and an optional latest update id.
    #[must_use]
    pub fn derive(status: &str, latest_update_id: Option<&str>) -> Self {
        let update = latest_update_id.unwrap_or("");
        let mut out = String::with_capacity(status.len() + 1 + update.len());
        out.push_str(status);
        out.push(FINGERPRINT_SEPARATOR);
        out.push_str(update);
        Self(out)
    }

    /// Wrap a previously persisted fingerprint.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw `status:update_id` text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Start/end of a maintenance window. Either bound may be unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledWindow {
    /// Announced start.
    pub starts_at: Option<DateTime<Utc>>,
    /// Announced end.
    pub ends_at: Option<DateTime<Utc>>,
}

/// Uniform record for one incident or maintenance window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Upstream identity, stable across polls and unique within a snapshot.
    pub id: String,
    /// Incident or maintenance, from the feed category it came from.
    pub kind: EventKind,
    /// Free-form upstream status such as `investigating` or `resolved`.
    pub status: String,
    /// Only meaningful for incidents; always `None` for maintenance.
    pub impact: ImpactLevel,
    /// Event name as shown on the status page.
    pub title: String,
    /// Component names in feed order; may be empty.
    pub affected_components: Vec<String>,
    /// Text of the newest update.
    pub latest_update_body: Option<String>,
    /// Identity of the newest update; feeds the fingerprint.
    pub latest_update_id: Option<String>,
    /// Short link to the status page entry.
    pub external_link: Option<String>,
    /// Only present for maintenance.
    pub scheduled_window: Option<ScheduledWindow>,
    /// Derived from `status` and `latest_update_id`.
    pub fingerprint: Fingerprint,
}

impl CanonicalEvent {
    /// Minimal event; remaining attributes can be filled with the `with_*` helpers.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: EventKind, status: impl Into<String>, title: impl Into<String>) -> Self {
        let status = status.into();
        let fingerprint = Fingerprint::derive(&status, None);
        Self {
            id: id.into(),
            kind,
            status,
            impact: ImpactLevel::None,
            title: title.into(),
            affected_components: Vec::new(),
            latest_update_body: None,
            latest_update_id: None,
            external_link: None,
            scheduled_window: None,
            fingerprint,
        }
    }

    /// Set the impact level. Ignored for maintenance events.
    #[must_use]
    pub fn with_impact(mut self, impact: ImpactLevel) -> Self {
        if self.kind == EventKind::Incident {
            self.impact = impact;
        }
        self
    }

    /// Set the affected components.
    #[must_use]
    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_components = components.into_iter().map(Into::into).collect();
        self
    }

    /// Set the latest update and re-derive the fingerprint.
    #[must_use]
    pub fn with_latest_update(mut self, update_id: impl Into<String>, body: Option<String>) -> Self {
        self.latest_update_id = Some(update_id.into());
        self.latest_update_body = body;
        self.refresh_fingerprint();
        self
    }

    /// Set the status and re-derive the fingerprint.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self.refresh_fingerprint();
        self
    }

    /// Set the external link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.external_link = Some(link.into());
        self
    }

    /// Set the maintenance window. Ignored for incidents.
    #[must_use]
    pub fn with_window(mut self, window: ScheduledWindow) -> Self {
        if self.kind == EventKind::Maintenance {
            self.scheduled_window = Some(window);
        }
        self
    }

    /// Recompute the fingerprint from the current status and latest update id.
    pub fn refresh_fingerprint(&mut self) {
        self.fingerprint = Fingerprint::derive(&self.status, self.latest_update_id.as_deref());
    }

    /// True for incidents.
    #[must_use]
    pub const fn is_incident(&self) -> bool {
        matches!(self.kind, EventKind::Incident)
    }

    /// True for maintenance windows.
    #[must_use]
    pub const fn is_maintenance(&self) -> bool {
        matches!(self.kind, EventKind::Maintenance)
    }

    /// Lower-cased title plus all affected components, whitespace-joined.
    #[must_use]
    pub fn haystack(&self) -> String {
        let mut text = self.title.to_lowercase();
        for component in &self.affected_components {
            text.push(' ');
            text.push_str(&component.to_lowercase());
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_joins_status_and_update() {
        assert_eq!(Fingerprint::derive("investigating", Some("1")).as_str(), "investigating:1");
        assert_eq!(Fingerprint::derive("resolved", None).as_str(), "resolved:");
    }

    #[test]
    fn fingerprint_changes_with_either_field() {
        let base = Fingerprint::derive("monitoring", Some("u1"));
        assert_eq!(base, Fingerprint::derive("monitoring", Some("u1")));
        assert_ne!(base, Fingerprint::derive("resolved", Some("u1")));
        assert_ne!(base, Fingerprint::derive("monitoring", Some("u2")));
    }

    #[test]
    fn body_only_edit_keeps_fingerprint() {
        let a = CanonicalEvent::new("e", EventKind::Incident, "identified", "Login")
            .with_latest_update("u1", Some("first text".to_string()));
        let b = CanonicalEvent::new("e", EventKind::Incident, "identified", "Login")
            .with_latest_update("u1", Some("edited text".to_string()));
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn impact_is_ignored_for_maintenance() {
        let ev = CanonicalEvent::new("m", EventKind::Maintenance, "scheduled", "Patch")
            .with_impact(ImpactLevel::Critical);
        assert_eq!(ev.impact, ImpactLevel::None);
    }

    #[test]
    fn impact_order_is_total() {
        assert!(ImpactLevel::None < ImpactLevel::Minor);
        assert!(ImpactLevel::Minor < ImpactLevel::Major);
        assert!(ImpactLevel::Major < ImpactLevel::Critical);
        assert_eq!("MAJOR".parse::<ImpactLevel>().unwrap(), ImpactLevel::Major);
        assert!("severe".parse::<ImpactLevel>().is_err());
        assert_eq!(ImpactLevel::from_feed("maintenance"), ImpactLevel::None);
    }

    #[test]
    fn haystack_joins_title_and_components() {
        let ev = CanonicalEvent::new("e", EventKind::Incident, "investigating", "Login Issues")
            .with_components(["Fortnite", "Epic Games Store"]);
        assert_eq!(ev.haystack(), "login issues fortnite epic games store");
    }
}
