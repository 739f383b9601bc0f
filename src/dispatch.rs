//! Dispatch coordinator.
//!
//! One poll cycle is a critical section over the state store:
//! load once, fetch, diff, match every subscriber, deliver, commit once, save
//! once. Deliveries for a cycle fan out to a bounded pool of scoped worker
//! threads fed through a crossbeam channel; the pool is joined before the
//! commit, so the commit only ever sees settled deliveries. Delivery failures
//! are counted and logged, never fatal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver};
use serde::Serialize;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::CycleConfig;
use crate::delivery::{DeliveryChannel, Notification};
use crate::directory::SubscriberDirectory;
use crate::error::{ValidationError, WatchError, WatchResult};
use crate::event::{CanonicalEvent, EventKind};
use crate::feed::{fetch_snapshot, FeedCategory, FeedSnapshot, FeedSource};
use crate::matcher::{evaluate, MatchOutput};
use crate::state::{ChangeState, Classification, StateStore};
use crate::subscription::{SubscriberId, Subscription};

/// Summary of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Fresh per cycle; tags the cycle's log lines.
    pub cycle_id: Uuid,
    /// Clock reading before the fetch.
    pub started_at: DateTime<Utc>,
    /// Clock reading after the commit.
    pub finished_at: DateTime<Utc>,
    /// Events with no prior fingerprint.
    pub new: usize,
    /// Events whose fingerprint changed.
    pub updated: usize,
    /// Events whose fingerprint matched.
    pub unchanged: usize,
    /// Incidents in the snapshot.
    pub incidents: usize,
    /// Maintenance windows in the snapshot.
    pub maintenance: usize,
    /// Subscribers with a readable subscription.
    pub subscribers: usize,
    /// Listed subscribers whose subscription was absent or unreadable.
    pub subscribers_skipped: usize,
    /// Notifications handed to the delivery channel.
    pub deliveries_attempted: usize,
    /// Deliveries the channel accepted.
    pub delivered: usize,
    /// Deliveries the channel refused.
    pub failed: usize,
    /// Feed categories that failed this cycle.
    pub degraded: Vec<FeedCategory>,
    /// Ids tracked after the commit.
    pub tracked: usize,
}

impl CycleReport {
    /// Events that triggered dispatch.
    #[must_use]
    pub const fn dispatchable(&self) -> usize {
        self.new + self.updated
    }
}

#[derive(Debug)]
struct DeliveryJob {
    subscriber: SubscriberId,
    notification: Notification,
}

#[derive(Debug, Default)]
struct DeliveryTally {
    delivered: AtomicUsize,
    failed: AtomicUsize,
}

/// Runs poll cycles against one state store.
pub struct DispatchCoordinator {
    cfg: CycleConfig,
    feed: Arc<dyn FeedSource>,
    directory: Arc<dyn SubscriberDirectory>,
    delivery: Arc<dyn DeliveryChannel>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    cycle_guard: Mutex<()>,
}

impl std::fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl DispatchCoordinator {
    /// Build a coordinator on the system clock.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidConfig` if `cfg` is out of bounds.
    pub fn new(
        cfg: CycleConfig,
        feed: Arc<dyn FeedSource>,
        directory: Arc<dyn SubscriberDirectory>,
        delivery: Arc<dyn DeliveryChannel>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            cfg: cfg.validate()?,
            feed,
            directory,
            delivery,
            store,
            clock: Arc::new(SystemClock),
            cycle_guard: Mutex::new(()),
        })
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CycleConfig {
        &self.cfg
    }

    /// Run one full cycle: load, fetch, diff, deliver, commit, save.
    ///
    /// Concurrent callers on the same coordinator are serialized.
    ///
    /// # Errors
    /// State load or save failures. Feed, directory and delivery failures
    /// degrade the cycle instead of failing it.
    pub fn run_cycle(&self) -> WatchResult<CycleReport> {
        let _guard = self
            .cycle_guard
            .lock()
            .map_err(|_| WatchError::internal("cycle guard poisoned"))?;

        let started_at = self.clock.now();
        let state = self.store.load()?;
        let snapshot = fetch_snapshot(self.feed.as_ref(), &self.cfg.categories());
        let (next, report) = self.execute(state, &snapshot, started_at);

        if let Err(e) = self.store.save(&next) {
            tracing::error!(cycle_id = %report.cycle_id, error = %e, "failed to persist change state");
            return Err(e.into());
        }

        tracing::info!(
            cycle_id = %report.cycle_id,
            new = report.new,
            updated = report.updated,
            unchanged = report.unchanged,
            delivered = report.delivered,
            failed = report.failed,
            tracked = report.tracked,
            degraded = report.degraded.len(),
            "cycle finished"
        );
        Ok(report)
    }

    /// Run a cycle over an explicit state and snapshot without touching the store.
    ///
    /// Returns the committed state alongside the report; the caller decides
    /// whether and where to persist it.
    pub fn run_cycle_with_state(&self, state: ChangeState, snapshot: &FeedSnapshot) -> (ChangeState, CycleReport) {
        self.execute(state, snapshot, self.clock.now())
    }

    fn execute(
        &self,
        mut state: ChangeState,
        snapshot: &FeedSnapshot,
        started_at: DateTime<Utc>,
    ) -> (ChangeState, CycleReport) {
        let cycle_id = Uuid::new_v4();
        tracing::info!(
            cycle_id = %cycle_id,
            events = snapshot.events.len(),
            tracked = state.tracked_count(),
            "cycle started"
        );

        let classifications = state.diff(&snapshot.events);
        let (mut new, mut updated, mut unchanged) = (0, 0, 0);
        for (event, class) in snapshot.events.iter().zip(&classifications) {
            match class {
                Classification::New => new += 1,
                Classification::Updated => updated += 1,
                Classification::Unchanged => unchanged += 1,
            }
            if class.is_dispatchable() {
                tracing::info!(
                    event_id = %event.id,
                    kind = %event.kind,
                    status = %event.status,
                    classification = ?class,
                    title = %event.title,
                    "event change detected"
                );
            } else {
                tracing::debug!(event_id = %event.id, "event unchanged");
            }
        }

        let (subscriptions, subscribers_skipped) = self.load_subscriptions();
        let jobs = plan_deliveries(&snapshot.events, &classifications, &subscriptions);
        let deliveries_attempted = jobs.len();
        let tally = self.deliver_all(jobs);

        // Unconditional: zero subscribers or all-failed deliveries still advance state.
        let committed_at = self.clock.now();
        state.commit(&snapshot.events, &classifications, self.cfg.retention_limit, committed_at);

        let report = CycleReport {
            cycle_id,
            started_at,
            finished_at: self.clock.now(),
            new,
            updated,
            unchanged,
            incidents: snapshot.count_kind(EventKind::Incident),
            maintenance: snapshot.count_kind(EventKind::Maintenance),
            subscribers: subscriptions.len(),
            subscribers_skipped,
            deliveries_attempted,
            delivered: tally.delivered.load(Ordering::Relaxed),
            failed: tally.failed.load(Ordering::Relaxed),
            degraded: snapshot.degraded.clone(),
            tracked: state.tracked_count(),
        };
        (state, report)
    }

    fn load_subscriptions(&self) -> (Vec<Subscription>, usize) {
        let ids = match self.directory.list_subscriber_ids() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list subscribers; dispatching to nobody this cycle");
                return (Vec::new(), 0);
            }
        };

        let mut subscriptions = Vec::with_capacity(ids.len());
        let mut skipped = 0;
        for id in ids {
            match self.directory.get_subscription(&id) {
                Ok(Some(sub)) => subscriptions.push(sub),
                Ok(None) => {
                    tracing::debug!(subscriber = %id, "listed subscriber has no subscription; skipping");
                    skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(subscriber = %id, error = %e, "unreadable subscription; skipping");
                    skipped += 1;
                }
            }
        }
        (subscriptions, skipped)
    }

    fn deliver_all(&self, jobs: Vec<DeliveryJob>) -> DeliveryTally {
        let tally = DeliveryTally::default();
        if jobs.is_empty() {
            return tally;
        }

        let channel = self.delivery.as_ref();
        let workers = self.cfg.delivery_workers.min(jobs.len()).max(1);
        let (job_tx, job_rx) = bounded::<DeliveryJob>(self.cfg.delivery_queue_capacity.max(1));

        thread::scope(|scope| {
            let mut spawned = 0;
            for index in 0..workers {
                let rx = job_rx.clone();
                let tally = &tally;
                let spawn = thread::Builder::new()
                    .name(format!("statuscast-delivery-{index}"))
                    .spawn_scoped(scope, move || delivery_worker(channel, &rx, tally));
                match spawn {
                    Ok(_) => spawned += 1,
                    Err(e) => tracing::warn!(error = %e, "failed to spawn delivery worker"),
                }
            }
            drop(job_rx);

            if spawned == 0 {
                for job in &jobs {
                    deliver_one(channel, job, &tally);
                }
                return;
            }

            for job in jobs {
                if job_tx.send(job).is_err() {
                    tracing::error!("delivery workers exited early; remaining deliveries dropped");
                    break;
                }
            }
            drop(job_tx);
        });

        tally
    }
}

/// Match every dispatchable event against every subscription.
fn plan_deliveries(
    events: &[CanonicalEvent],
    classifications: &[Classification],
    subscriptions: &[Subscription],
) -> Vec<DeliveryJob> {
    let mut jobs = Vec::new();
    if subscriptions.is_empty() {
        return jobs;
    }

    for (event, class) in events.iter().zip(classifications) {
        if !class.is_dispatchable() {
            continue;
        }
        let shared = Arc::new(event.clone());
        let is_update = *class == Classification::Updated;

        for sub in subscriptions {
            match evaluate(event, sub) {
                MatchOutput::Match => jobs.push(DeliveryJob {
                    subscriber: sub.subscriber_id.clone(),
                    notification: Notification::new(Arc::clone(&shared), is_update),
                }),
                MatchOutput::NoMatch(reason) => {
                    tracing::debug!(
                        event_id = %event.id,
                        subscriber = %sub.subscriber_id,
                        reason = ?reason,
                        "subscription rejected event"
                    );
                }
            }
        }
    }
    jobs
}

fn delivery_worker(channel: &dyn DeliveryChannel, jobs: &Receiver<DeliveryJob>, tally: &DeliveryTally) {
    for job in jobs.iter() {
        deliver_one(channel, &job, tally);
    }
}

fn deliver_one(channel: &dyn DeliveryChannel, job: &DeliveryJob, tally: &DeliveryTally) {
    match channel.deliver(&job.subscriber, &job.notification) {
        Ok(()) => {
            tally.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            tracing::warn!(
                subscriber = %job.subscriber,
                event_id = %job.notification.event.id,
                error = %e,
                "delivery failed"
            );
            tally.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::delivery::LogDelivery;
    use crate::directory::InMemoryDirectory;
    use crate::error::DeliveryError;
    use crate::event::ImpactLevel;
    use crate::feed::StaticFeed;
    use crate::state::InMemoryStateStore;
    use crate::subscription::FilterCommand;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Recording {
        sent: Mutex<Vec<(String, String, bool)>>,
        fail_for: Option<String>,
    }

    impl DeliveryChannel for Recording {
        fn deliver(&self, subscriber: &SubscriberId, notification: &Notification) -> Result<(), crate::error::DeliveryError> {
            if self.fail_for.as_deref() == Some(subscriber.as_str()) {
                return Err(DeliveryError::Unreachable {
                    subscriber: subscriber.to_string(),
                    message: "gone".to_string(),
                });
            }
            self.sent.lock().unwrap().push((
                subscriber.to_string(),
                notification.event.id.clone(),
                notification.is_update,
            ));
            Ok(())
        }
    }

    fn incident(id: &str, status: &str, update: &str, impact: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": format!("Incident {id}"),
            "status": status,
            "impact": impact,
            "components": [{"name": "Fortnite"}],
            "incident_updates": [{"id": update, "body": "details"}]
        })
    }

    fn coordinator(
        feed: Arc<StaticFeed>,
        directory: Arc<InMemoryDirectory>,
        delivery: Arc<dyn DeliveryChannel>,
        store: Arc<InMemoryStateStore>,
    ) -> DispatchCoordinator {
        let cfg = CycleConfig {
            delivery_workers: 2,
            delivery_queue_capacity: 1,
            ..CycleConfig::default()
        };
        DispatchCoordinator::new(cfg, feed, directory, delivery, store)
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(Utc::now())))
    }

    fn subscribe(dir: &InMemoryDirectory, raw: &str) -> SubscriberId {
        let id = SubscriberId::new(raw).unwrap();
        dir.subscribe(&id, Utc::now()).unwrap();
        id
    }

    #[test]
    fn new_then_unchanged_then_updated() {
        let feed = Arc::new(StaticFeed::new());
        feed.set_records(FeedCategory::Incidents, vec![incident("a", "investigating", "1", "minor")]);
        let dir = Arc::new(InMemoryDirectory::new());
        subscribe(&dir, "100");
        let delivery = Arc::new(Recording::default());
        let store = Arc::new(InMemoryStateStore::new());
        let coord = coordinator(Arc::clone(&feed), dir, delivery.clone(), Arc::clone(&store));

        let first = coord.run_cycle().unwrap();
        assert_eq!((first.new, first.updated, first.delivered), (1, 0, 1));

        let second = coord.run_cycle().unwrap();
        assert_eq!((second.unchanged, second.deliveries_attempted), (1, 0));

        feed.set_records(FeedCategory::Incidents, vec![incident("a", "monitoring", "2", "minor")]);
        let third = coord.run_cycle().unwrap();
        assert_eq!(third.updated, 1);

        let sent = delivery.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(!sent[0].2);
        assert!(sent[1].2);
        assert_eq!(store.save_count(), 3);
    }

    #[test]
    fn failed_delivery_does_not_block_others_or_commit() {
        let feed = Arc::new(StaticFeed::new());
        feed.set_records(
            FeedCategory::Incidents,
            vec![incident("a", "investigating", "1", "major"), incident("b", "identified", "4", "minor")],
        );
        let dir = Arc::new(InMemoryDirectory::new());
        for raw in ["1", "2", "3"] {
            subscribe(&dir, raw);
        }
        let delivery = Arc::new(Recording {
            fail_for: Some("2".to_string()),
            ..Recording::default()
        });
        let store = Arc::new(InMemoryStateStore::new());
        let coord = coordinator(feed, dir, delivery.clone(), Arc::clone(&store));

        let report = coord.run_cycle().unwrap();
        assert_eq!(report.deliveries_attempted, 6);
        assert_eq!(report.delivered, 4);
        assert_eq!(report.failed, 2);
        assert_eq!(store.snapshot().unwrap().tracked_count(), 2);
    }

    #[test]
    fn filters_are_applied_per_subscriber() {
        let feed = Arc::new(StaticFeed::new());
        feed.set_records(FeedCategory::Incidents, vec![incident("a", "investigating", "1", "minor")]);
        let dir = Arc::new(InMemoryDirectory::new());
        let picky = subscribe(&dir, "picky");
        dir.apply(&picky, &FilterCommand::SetMinImpact { level: ImpactLevel::Major }, Utc::now())
            .unwrap();
        subscribe(&dir, "everything");
        let delivery = Arc::new(Recording::default());
        let coord = coordinator(feed, dir, delivery.clone(), Arc::new(InMemoryStateStore::new()));

        let report = coord.run_cycle().unwrap();
        assert_eq!(report.subscribers, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(delivery.sent.lock().unwrap()[0].0, "everything");
    }

    #[test]
    fn save_failure_is_surfaced() {
        let feed = Arc::new(StaticFeed::new());
        feed.set_records(FeedCategory::Incidents, vec![incident("a", "investigating", "1", "minor")]);
        let store = Arc::new(InMemoryStateStore::new());
        store.set_fail_saves(true);
        let coord = coordinator(
            feed,
            Arc::new(InMemoryDirectory::new()),
            Arc::new(LogDelivery),
            Arc::clone(&store),
        );

        let err = coord.run_cycle().unwrap_err();
        assert!(err.is_state());
        assert_eq!(store.snapshot().unwrap(), ChangeState::new());
    }

    #[test]
    fn explicit_state_flows_through() {
        let coord = coordinator(
            Arc::new(StaticFeed::new()),
            Arc::new(InMemoryDirectory::new()),
            Arc::new(LogDelivery),
            Arc::new(InMemoryStateStore::new()),
        );
        let snapshot = FeedSnapshot {
            events: vec![crate::normalize::normalize(
                &incident("x", "investigating", "9", "critical"),
                EventKind::Incident,
            )],
            degraded: vec![FeedCategory::ActiveMaintenance],
        };

        let (state, report) = coord.run_cycle_with_state(ChangeState::new(), &snapshot);
        assert_eq!(report.new, 1);
        assert_eq!(report.subscribers, 0);
        assert_eq!(report.degraded, vec![FeedCategory::ActiveMaintenance]);
        assert_eq!(state.fingerprints["x"].as_str(), "investigating:9");

        let (_, again) = coord.run_cycle_with_state(state, &snapshot);
        assert_eq!(again.unchanged, 1);
        assert_eq!(again.dispatchable(), 0);
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = CycleConfig {
            delivery_queue_capacity: 0,
            ..CycleConfig::default()
        };
        let result = DispatchCoordinator::new(
            cfg,
            Arc::new(StaticFeed::new()),
            Arc::new(InMemoryDirectory::new()),
            Arc::new(LogDelivery),
            Arc::new(InMemoryStateStore::new()),
        );
        assert!(result.is_err());
    }
}
