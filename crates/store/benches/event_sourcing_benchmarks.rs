use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use buckley_core::CancellationToken;
use buckley_events::NewEvent;
use buckley_store::{EventStore, InMemoryEventStore};

fn bench_event_append_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let cancel = CancellationToken::new();

                b.to_async(&rt).iter(|| async {
                    let events: Vec<NewEvent> = (0..size)
                        .map(|i| NewEvent::new("task.progress", json!({"n": i})))
                        .collect();
                    black_box(store.append("bench-stream", events, &cancel).await.unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_read_from_version(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("read_from_version");

    for event_count in [10, 100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("read_full_stream", event_count),
            event_count,
            |b, &count| {
                let store = InMemoryEventStore::new();
                let cancel = CancellationToken::new();

                rt.block_on(async {
                    let events: Vec<NewEvent> = (0..count)
                        .map(|i| NewEvent::new("task.progress", json!({"n": i})))
                        .collect();
                    store.append("bench-stream", events, &cancel).await.unwrap();
                });

                b.to_async(&rt).iter(|| async {
                    black_box(store.read("bench-stream", 0, &cancel).await.unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_event_append_throughput, bench_read_from_version);
criterion_main!(benches);
