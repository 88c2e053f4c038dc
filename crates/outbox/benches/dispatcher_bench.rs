use broker::InMemoryBroker;
use criterion::{Criterion, criterion_group, criterion_main};
use outbox::{
    AggregateChange, AggregateId, AggregateRecord, DispatcherConfig, EventEnvelope, InMemoryStore,
    OutboxDispatcher, OutboxEvent, Version, WriteStore,
};

fn make_change(aggregate_id: AggregateId) -> AggregateChange {
    let envelope = EventEnvelope::builder()
        .event_type("CampaignCreated")
        .aggregate_id(aggregate_id)
        .version(Version::first())
        .data_raw(serde_json::json!({
            "brand_id": "00000000-0000-0000-0000-000000000001",
            "name": "Summer Sale",
            "campaign_type": "affiliate",
            "objective": "sales"
        }))
        .try_build()
        .unwrap();
    let record =
        AggregateRecord::from_state(aggregate_id, "Campaign", Version::first(), &()).unwrap();
    AggregateChange::new(record, Version::initial())
        .with_event(OutboxEvent::pending("Campaign", &envelope).unwrap())
}

fn bench_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();

    c.bench_function("outbox/commit_create", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.commit(make_change(AggregateId::new())).await.unwrap();
            });
        });
    });
}

fn bench_dispatch_batch_200(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("outbox/dispatch_batch_200", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::new();
                for _ in 0..200 {
                    store.commit(make_change(AggregateId::new())).await.unwrap();
                }
                let dispatcher = OutboxDispatcher::new(
                    store,
                    InMemoryBroker::new(),
                    DispatcherConfig::default(),
                );
                let report = dispatcher.dispatch_batch().await.unwrap();
                assert_eq!(report.published, 200);
            });
        });
    });
}

criterion_group!(benches, bench_commit, bench_dispatch_batch_200);
criterion_main!(benches);
