use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;

use statuscast::{
    fetch_snapshot, matches, normalize, CanonicalEvent, ChangeState, CycleConfig, DeliveryChannel, DeliveryError,
    DispatchCoordinator, EventKind, FeedCategory, FeedSnapshot, FilterCommand, ImpactLevel, InMemoryDirectory,
    InMemoryStateStore, Notification, StaticFeed, SubscriberDirectory, SubscriberId, Subscription,
    DEFAULT_RETENTION_LIMIT,
};

struct NullDelivery;

impl DeliveryChannel for NullDelivery {
    fn deliver(&self, _subscriber: &SubscriberId, _notification: &Notification) -> Result<(), DeliveryError> {
        Ok(())
    }
}

fn raw_incident(i: usize, update: usize) -> serde_json::Value {
    let impacts = ["none", "minor", "major", "critical"];
    json!({
        "id": format!("inc-{i}"),
        "name": format!("Service {} degraded", i % 17),
        "status": "investigating",
        "impact": impacts[i % impacts.len()],
        "components": [{"name": format!("Component {}", i % 5)}, {"name": "Fortnite"}],
        "incident_updates": [{"id": format!("u-{update}"), "body": "We are looking into it."}],
    })
}

fn snapshot(n: usize, update: usize) -> Vec<CanonicalEvent> {
    (0..n)
        .map(|i| normalize(&raw_incident(i, update), EventKind::Incident))
        .collect()
}

fn subscriptions(n: usize) -> Vec<Subscription> {
    let now = Utc::now();
    (0..n)
        .map(|i| {
            let mut sub = Subscription::new(SubscriberId::new(format!("sub-{i}")).unwrap(), now);
            if i % 2 == 0 {
                sub.apply(&FilterCommand::AddService { service: format!("service {}", i % 17) }, now)
                    .unwrap();
            }
            if i % 3 == 0 {
                sub.apply(&FilterCommand::SetMinImpact { level: ImpactLevel::Major }, now)
                    .unwrap();
            }
            sub
        })
        .collect()
}

fn bench_diff_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("state");
    let base = snapshot(200, 1);
    let changed = snapshot(200, 2);

    let mut committed = ChangeState::new();
    let classes = committed.diff(&base);
    committed.commit(&base, &classes, DEFAULT_RETENTION_LIMIT, Utc::now());

    group.throughput(Throughput::Elements(changed.len() as u64));
    group.bench_function("diff_200", |b| b.iter(|| black_box(committed.diff(black_box(&changed)))));
    group.bench_function("diff_commit_200", |b| {
        b.iter(|| {
            let mut state = committed.clone();
            let classes = state.diff(&changed);
            state.commit(&changed, &classes, DEFAULT_RETENTION_LIMIT, Utc::now());
            black_box(state.tracked_count())
        });
    });
    group.finish();
}

fn bench_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher");
    let events = snapshot(50, 1);
    let subs = subscriptions(1000);

    group.throughput(Throughput::Elements((events.len() * subs.len()) as u64));
    group.bench_function("50_events_x_1000_subscribers", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for event in &events {
                for sub in &subs {
                    if matches(event, sub) {
                        hits += 1;
                    }
                }
            }
            black_box(hits)
        });
    });
    group.finish();
}

fn bench_full_cycle(c: &mut Criterion) {
    c.bench_function("cycle/200_events_500_subscribers", |b| {
        b.iter_batched(
            || {
                let feed = Arc::new(StaticFeed::new());
                feed.set_records(FeedCategory::Incidents, (0..200).map(|i| raw_incident(i, 1)).collect());
                feed.set_records(FeedCategory::ActiveMaintenance, Vec::new());
                feed.set_records(FeedCategory::UpcomingMaintenance, Vec::new());
                let directory = Arc::new(InMemoryDirectory::new());
                for sub in subscriptions(500) {
                    directory.upsert(sub).unwrap();
                }
                DispatchCoordinator::new(
                    CycleConfig::default(),
                    feed,
                    directory,
                    Arc::new(NullDelivery),
                    Arc::new(InMemoryStateStore::new()),
                )
                .unwrap()
            },
            |coordinator| black_box(coordinator.run_cycle().unwrap()),
            criterion::BatchSize::SmallInput,
        );
    });

    // Pure core only: no feed fetch, no store.
    c.bench_function("cycle/explicit_state_200_events", |b| {
        let feed = StaticFeed::new();
        feed.set_records(FeedCategory::Incidents, (0..200).map(|i| raw_incident(i, 1)).collect());
        let snap: FeedSnapshot = fetch_snapshot(&feed, &[FeedCategory::Incidents]);
        let directory = Arc::new(InMemoryDirectory::new());
        directory.subscribe(&SubscriberId::new("solo").unwrap(), Utc::now()).unwrap();
        let coordinator = DispatchCoordinator::new(
            CycleConfig::default(),
            Arc::new(StaticFeed::new()),
            directory,
            Arc::new(NullDelivery),
            Arc::new(InMemoryStateStore::new()),
        )
        .unwrap();
        b.iter(|| black_box(coordinator.run_cycle_with_state(ChangeState::new(), &snap)));
    });
}

criterion_group!(benches, bench_diff_commit, bench_matching, bench_full_cycle);
criterion_main!(benches);
