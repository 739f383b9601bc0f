//! Event normalizer.
//!
//! Turns raw Statuspage-style records into [`CanonicalEvent`]s. Normalization
//! is total: a missing or mistyped optional field degrades to "absent" and
//! never fails the record.

use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use crate::error::FeedError;
use crate::event::{CanonicalEvent, EventKind, Fingerprint, ImpactLevel, ScheduledWindow};
use crate::feed::FeedCategory;

/// Title used when the feed omits one.
pub const UNKNOWN_TITLE: &str = "Unknown Event";
/// Status used when the feed omits one.
pub const UNKNOWN_STATUS: &str = "unknown";

fn str_field<'a>(raw: &'a Json, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(Json::as_str)
}

/// Identifiers are usually strings but some feeds emit numbers.
fn id_field(raw: &Json, key: &str) -> Option<String> {
    match raw.get(key)? {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn timestamp_field(raw: &Json, key: &str) -> Option<DateTime<Utc>> {
    let text = str_field(raw, key)?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn component_names(raw: &Json) -> Vec<String> {
    let Some(items) = raw.get("components").and_then(Json::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|c| match c {
            Json::String(name) => non_empty(Some(name.as_str())),
            Json::Object(_) => non_empty(str_field(c, "name")),
            _ => None,
        })
        .collect()
}

/// The feed orders updates newest first.
fn latest_update(raw: &Json) -> Option<&Json> {
    raw.get("incident_updates")
        .or_else(|| raw.get("scheduled_maintenance_updates"))
        .and_then(Json::as_array)
        .and_then(|updates| updates.first())
}

/// Normalize one raw feed record into a canonical event.
#[must_use]
pub fn normalize(raw: &Json, kind: EventKind) -> CanonicalEvent {
    let id = id_field(raw, "id").unwrap_or_default();
    let status = non_empty(str_field(raw, "status")).unwrap_or_else(|| UNKNOWN_STATUS.to_string());
    let title = non_empty(str_field(raw, "name")).unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let impact = match kind {
        EventKind::Incident => str_field(raw, "impact").map_or(ImpactLevel::None, ImpactLevel::from_feed),
        EventKind::Maintenance => ImpactLevel::None,
    };

    let update = latest_update(raw);
    let latest_update_id = update.and_then(|u| id_field(u, "id"));
    let latest_update_body = update.and_then(|u| non_empty(str_field(u, "body")));

    let scheduled_window = match kind {
        EventKind::Maintenance => {
            let window = ScheduledWindow {
                starts_at: timestamp_field(raw, "scheduled_for"),
                ends_at: timestamp_field(raw, "scheduled_until"),
            };
            (window.starts_at.is_some() || window.ends_at.is_some()).then_some(window)
        }
        EventKind::Incident => None,
    };

    let fingerprint = Fingerprint::derive(&status, latest_update_id.as_deref());

    CanonicalEvent {
        id,
        kind,
        status,
        impact,
        title,
        affected_components: component_names(raw),
        latest_update_body,
        latest_update_id,
        external_link: non_empty(str_field(raw, "shortlink")),
        scheduled_window,
        fingerprint,
    }
}

/// Extract the raw record list for `category` from a decoded feed document.
///
/// # Errors
/// `FeedError::Malformed` if the category's list key is missing or not an array.
pub fn document_records(doc: &Json, category: FeedCategory) -> Result<Vec<Json>, FeedError> {
    let key = category.document_key();
    doc.get(key)
        .and_then(Json::as_array)
        .cloned()
        .ok_or_else(|| FeedError::Malformed {
            category: category.to_string(),
            message: format!("missing '{key}' array"),
        })
}

/// Decode a feed document body and extract the raw records for `category`.
///
/// # Errors
/// `FeedError::Malformed` if the body is not JSON or lacks the category's list.
pub fn parse_document(body: &str, category: FeedCategory) -> Result<Vec<Json>, FeedError> {
    let doc: Json = serde_json::from_str(body).map_err(|e| FeedError::Malformed {
        category: category.to_string(),
        message: e.to_string(),
    })?;
    document_records(&doc, category)
}
