//! Change-state: what has been seen, with which fingerprint.
//!
//! `diff` classifies a snapshot against the committed state without touching
//! it; `commit` folds a snapshot in after dispatch and applies the retention
//! policy. Ids that left the feed are remembered by recency of departure, up
//! to a fixed limit, so a resolved event that briefly reappears is not
//! announced again.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{CanonicalEvent, Fingerprint};

/// Default number of departed ids kept.
pub const DEFAULT_RETENTION_LIMIT: usize = 50;

/// Outcome of comparing one event against the committed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Id never seen before.
    New,
    /// Id seen, fingerprint differs from the last committed one.
    Updated,
    /// Nothing to dispatch.
    Unchanged,
}

impl Classification {
    /// Whether this classification triggers delivery.
    #[must_use]
    pub const fn is_dispatchable(self) -> bool {
        matches!(self, Self::New | Self::Updated)
    }
}

/// Persisted change-detection state for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeState {
    /// Every id still tracked.
    #[serde(default)]
    pub seen_ids: BTreeSet<String>,
    /// Last committed fingerprint per id; keys are a subset of `seen_ids`.
    #[serde(default)]
    pub fingerprints: BTreeMap<String, Fingerprint>,
    /// Ids no longer in the feed, most recently departed first.
    #[serde(default)]
    pub departed: VecDeque<String>,
    /// When the last commit happened.
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ChangeState {
    /// Nothing tracked.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a single event.
    #[must_use]
    pub fn classify(&self, event: &CanonicalEvent) -> Classification {
        if !self.seen_ids.contains(&event.id) {
            return Classification::New;
        }
        match self.fingerprints.get(&event.id) {
            Some(fp) if *fp == event.fingerprint => Classification::Unchanged,
            _ => Classification::Updated,
        }
    }

    /// Classify every event of a snapshot, in order. Does not mutate state.
    #[must_use]
    pub fn diff(&self, events: &[CanonicalEvent]) -> Vec<Classification> {
        events.iter().map(|e| self.classify(e)).collect()
    }

    /// Fold a snapshot into the state after its deliveries settled.
    ///
    /// `classifications` must come from [`ChangeState::diff`] on the same
    /// snapshot. Keeps every id of the snapshot plus at most
    /// `retention_limit` departed ids, and prunes fingerprints to match.
    pub fn commit(
        &mut self,
        events: &[CanonicalEvent],
        classifications: &[Classification],
        retention_limit: usize,
        now: DateTime<Utc>,
    ) {
        debug_assert_eq!(events.len(), classifications.len());

        for (event, class) in events.iter().zip(classifications) {
            if class.is_dispatchable() {
                self.seen_ids.insert(event.id.clone());
                self.fingerprints.insert(event.id.clone(), event.fingerprint.clone());
            }
        }

        let current: HashSet<&str> = events.iter().map(|e| e.id.as_str()).collect();

        // Reappeared ids are live again; forget their departure.
        self.departed
            .retain(|id| !current.contains(id.as_str()) && self.seen_ids.contains(id));

        let already: HashSet<&str> = self.departed.iter().map(String::as_str).collect();
        let newly_departed: Vec<String> = self
            .seen_ids
            .iter()
            .filter(|id| !current.contains(id.as_str()) && !already.contains(id.as_str()))
            .cloned()
            .collect();

        for id in newly_departed.into_iter().rev() {
            self.departed.push_front(id);
        }
        self.departed.truncate(retention_limit);

        let mut retained: BTreeSet<String> = current.iter().map(|id| (*id).to_string()).collect();
        retained.extend(self.departed.iter().cloned());
        self.seen_ids = retained;

        let seen = &self.seen_ids;
        self.fingerprints.retain(|id, _| seen.contains(id));
        self.last_checked_at = Some(now);
    }

    /// Number of ids currently tracked.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.seen_ids.len()
    }

    /// True when every fingerprint key and departed id is also a seen id.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.fingerprints.keys().all(|id| self.seen_ids.contains(id))
            && self.departed.iter().all(|id| self.seen_ids.contains(id))
    }
}
