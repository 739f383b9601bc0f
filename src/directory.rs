//! Subscriber directory.
//!
//! Owns every subscriber's [`Subscription`]. The dispatch coordinator only
//! reads from it; the command layer creates, mutates and deletes entries. A
//! read-then-write by the command layer is not atomic against a concurrent
//! write for the same subscriber: last write wins.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use crate::error::DirectoryError;
use crate::subscription::{FilterCommand, SubscriberId, Subscription};

fn lock_err(context: &'static str) -> DirectoryError {
    DirectoryError::Backend(format!("poisoned lock: {context}"))
}

/// Storage of subscriptions keyed by subscriber.
pub trait SubscriberDirectory: Send + Sync {
    /// All known subscriber ids.
    fn list_subscriber_ids(&self) -> Result<Vec<SubscriberId>, DirectoryError>;

    /// The subscriber's subscription, if any.
    fn get_subscription(&self, id: &SubscriberId) -> Result<Option<Subscription>, DirectoryError>;

    /// Create a default subscription if none exists; returns the current one.
    fn subscribe(&self, id: &SubscriberId, now: DateTime<Utc>) -> Result<Subscription, DirectoryError>;

    /// Apply a filter command to an existing subscription.
    ///
    /// # Errors
    /// `DirectoryError::NotFound` if the subscriber has no subscription;
    /// `DirectoryError::Malformed` if the command fails validation.
    fn apply(
        &self,
        id: &SubscriberId,
        command: &FilterCommand,
        now: DateTime<Utc>,
    ) -> Result<Subscription, DirectoryError>;

    /// Delete the subscription. Returns whether one existed.
    fn unsubscribe(&self, id: &SubscriberId) -> Result<bool, DirectoryError>;
}

/// Thread-safe in-memory subscriber directory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    subs: RwLock<BTreeMap<SubscriberId, Subscription>>,
}

impl InMemoryDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a subscription as-is.
    ///
    /// # Errors
    /// Fails only if the lock was poisoned.
    pub fn upsert(&self, subscription: Subscription) -> Result<(), DirectoryError> {
        let mut subs = self.subs.write().map_err(|_| lock_err("directory.upsert"))?;
        subs.insert(subscription.subscriber_id.clone(), subscription);
        Ok(())
    }

    /// Seed from a JSON array of loosely-typed subscription records.
    ///
    /// Malformed records are skipped with a warning; returns how many loaded.
    ///
    /// # Errors
    /// `DirectoryError::Malformed` if `records` is not an array.
    pub fn load_records(&self, records: &Json, now: DateTime<Utc>) -> Result<usize, DirectoryError> {
        let items = records
            .as_array()
            .ok_or_else(|| DirectoryError::Malformed("subscriptions must be a JSON array".to_string()))?;

        let mut loaded = 0;
        for (index, record) in items.iter().enumerate() {
            match Subscription::from_record(record, now) {
                Ok(sub) => {
                    self.upsert(sub)?;
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping malformed subscription record");
                }
            }
        }
        Ok(loaded)
    }

    /// Number of stored subscriptions.
    ///
    /// # Errors
    /// Fails only if the lock was poisoned.
    pub fn len(&self) -> Result<usize, DirectoryError> {
        let subs = self.subs.read().map_err(|_| lock_err("directory.len"))?;
        Ok(subs.len())
    }

    /// # Errors
    /// Fails only if the lock was poisoned.
    pub fn is_empty(&self) -> Result<bool, DirectoryError> {
        Ok(self.len()? == 0)
    }
}

impl SubscriberDirectory for InMemoryDirectory {
    fn list_subscriber_ids(&self) -> Result<Vec<SubscriberId>, DirectoryError> {
        let subs = self.subs.read().map_err(|_| lock_err("directory.list"))?;
        Ok(subs.keys().cloned().collect())
    }

    fn get_subscription(&self, id: &SubscriberId) -> Result<Option<Subscription>, DirectoryError> {
        let subs = self.subs.read().map_err(|_| lock_err("directory.get"))?;
        Ok(subs.get(id).cloned())
    }

    fn subscribe(&self, id: &SubscriberId, now: DateTime<Utc>) -> Result<Subscription, DirectoryError> {
        let mut subs = self.subs.write().map_err(|_| lock_err("directory.subscribe"))?;
        let sub = subs
            .entry(id.clone())
            .or_insert_with(|| Subscription::new(id.clone(), now));
        Ok(sub.clone())
    }

    fn apply(
        &self,
        id: &SubscriberId,
        command: &FilterCommand,
        now: DateTime<Utc>,
    ) -> Result<Subscription, DirectoryError> {
        // Validate against a copy so a rejected command leaves the stored entry untouched.
        let mut sub = self
            .get_subscription(id)?
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        sub.apply(command, now)
            .map_err(|e| DirectoryError::Malformed(e.to_string()))?;

        let mut subs = self.subs.write().map_err(|_| lock_err("directory.apply"))?;
        subs.insert(id.clone(), sub.clone());
        Ok(sub)
    }

    fn unsubscribe(&self, id: &SubscriberId) -> Result<bool, DirectoryError> {
        let mut subs = self.subs.write().map_err(|_| lock_err("directory.unsubscribe"))?;
        Ok(subs.remove(id).is_some())
    }
}
