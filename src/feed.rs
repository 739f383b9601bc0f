//! Feed sources.
//!
//! A [`FeedSource`] hands back raw records for one feed category at a time.
//! [`fetch_snapshot`] stitches the categories together into one normalized
//! snapshot; a failed category contributes nothing and is reported as degraded
//! instead of failing the cycle.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::FeedError;
use crate::event::{CanonicalEvent, EventKind};
use crate::normalize::{document_records, normalize, parse_document};

/// One upstream list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedCategory {
    /// Unresolved incidents.
    Incidents,
    /// Maintenance windows currently in progress.
    ActiveMaintenance,
    /// Maintenance windows announced for the future.
    UpcomingMaintenance,
}

impl FeedCategory {
    /// Kind every record of this category normalizes to.
    #[must_use]
    pub const fn kind(self) -> EventKind {
        match self {
            Self::Incidents => EventKind::Incident,
            Self::ActiveMaintenance | Self::UpcomingMaintenance => EventKind::Maintenance,
        }
    }

    /// Top-level key holding the record list in the feed document.
    #[must_use]
    pub const fn document_key(self) -> &'static str {
        match self {
            Self::Incidents => "incidents",
            Self::ActiveMaintenance | Self::UpcomingMaintenance => "scheduled_maintenances",
        }
    }

    /// File name used by [`DirectoryFeed`].
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Incidents => "incidents.json",
            Self::ActiveMaintenance => "maintenance_active.json",
            Self::UpcomingMaintenance => "maintenance_upcoming.json",
        }
    }

    /// Categories polled in a cycle, in snapshot order.
    #[must_use]
    pub fn polled(include_upcoming: bool) -> Vec<Self> {
        let mut out = vec![Self::Incidents, Self::ActiveMaintenance];
        if include_upcoming {
            out.push(Self::UpcomingMaintenance);
        }
        out
    }
}

impl fmt::Display for FeedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Incidents => "incidents",
            Self::ActiveMaintenance => "maintenance_active",
            Self::UpcomingMaintenance => "maintenance_upcoming",
        })
    }
}

/// Upstream status feed.
pub trait FeedSource: Send + Sync {
    /// Fetch the raw records of one category.
    ///
    /// # Errors
    /// Any error is treated as a transient failure of that category only.
    fn fetch(&self, category: FeedCategory) -> Result<Vec<Json>, FeedError>;
}

/// Normalized view of the feed at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    /// Events in feed order, unique by id.
    pub events: Vec<CanonicalEvent>,
    /// Categories that failed and contributed nothing.
    pub degraded: Vec<FeedCategory>,
}

impl FeedSnapshot {
    /// Events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

/// Fetch and normalize every category, degrading failures to empty contributions.
///
/// An id already present in the snapshot (for example a window listed as both
/// active and upcoming) keeps its first occurrence. Records without an id
/// cannot be tracked and are skipped with a warning.
pub fn fetch_snapshot(source: &dyn FeedSource, categories: &[FeedCategory]) -> FeedSnapshot {
    let mut snapshot = FeedSnapshot::default();
    let mut ids: HashSet<String> = HashSet::new();

    for &category in categories {
        let records = match source.fetch(category) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(category = %category, error = %e, "feed category unavailable; treating as empty");
                snapshot.degraded.push(category);
                continue;
            }
        };

        for raw in &records {
            let event = normalize(raw, category.kind());
            if event.id.is_empty() {
                tracing::warn!(category = %category, title = %event.title, "feed record without id; skipping");
                continue;
            }
            if !ids.insert(event.id.clone()) {
                tracing::debug!(id = %event.id, category = %category, "duplicate event id in snapshot; keeping first");
                continue;
            }
            snapshot.events.push(event);
        }
    }

    snapshot
}

/// In-memory feed holding one decoded document per category.
///
/// Categories without a document fail as unavailable.
#[derive(Debug, Default)]
pub struct StaticFeed {
    documents: RwLock<HashMap<FeedCategory, Json>>,
}

impl StaticFeed {
    /// Empty feed; every category fails until it is set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned map still holds whole documents; keep serving it.
    fn write_documents(&self) -> RwLockWriteGuard<'_, HashMap<FeedCategory, Json>> {
        self.documents.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the document served for `category`.
    pub fn set_document(&self, category: FeedCategory, doc: Json) {
        self.write_documents().insert(category, doc);
    }

    /// Serve `records` for `category`, wrapped in the category's document key.
    pub fn set_records(&self, category: FeedCategory, records: Vec<Json>) {
        let mut doc = serde_json::Map::new();
        doc.insert(category.document_key().to_string(), Json::Array(records));
        self.set_document(category, Json::Object(doc));
    }

    /// Make `category` fail on the next fetch.
    pub fn remove(&self, category: FeedCategory) {
        self.write_documents().remove(&category);
    }
}

impl FeedSource for StaticFeed {
    fn fetch(&self, category: FeedCategory) -> Result<Vec<Json>, FeedError> {
        let docs = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let doc = docs.get(&category).ok_or_else(|| FeedError::Unavailable {
            category: category.to_string(),
            message: "no document".to_string(),
        })?;
        document_records(doc, category)
    }
}

/// Feed read from Statuspage documents saved in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryFeed {
    dir: PathBuf,
}

impl DirectoryFeed {
    /// Feed rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// File a category is read from.
    #[must_use]
    pub fn path_for(&self, category: FeedCategory) -> PathBuf {
        self.dir.join(category.file_name())
    }
}

impl FeedSource for DirectoryFeed {
    fn fetch(&self, category: FeedCategory) -> Result<Vec<Json>, FeedError> {
        let path = self.path_for(category);
        let body = fs::read_to_string(&path).map_err(|e| FeedError::Unavailable {
            category: category.to_string(),
            message: match e.kind() {
                ErrorKind::NotFound => format!("{} not found", path.display()),
                _ => e.to_string(),
            },
        })?;
        parse_document(&body, category)
    }
}
