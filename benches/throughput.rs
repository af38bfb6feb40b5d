use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;
use tempfile::TempDir;

use opsync::{
    core::{
        store::OpLogStore,
        vector_clock::{VectorClock, merge_all},
    },
    op::{OpSource, OpType, Operation},
    persist::sqlite::SqliteLogBackend,
};

fn operation(i: u64) -> Operation {
    Operation {
        id: format!("op-{i:08}"),
        action_type: "[Task] Update".to_string(),
        op_type: OpType::Update,
        entity_type: "TASK".to_string(),
        entity_id: Some(format!("t{}", i % 500)),
        payload: json!({ "timeSpent": i }),
        client_id: "bench".to_string(),
        vector_clock: VectorClock::single("bench", i + 1),
        timestamp: i,
        schema_version: 1,
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn bench_sqlite_append(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("sqlite_append");
    for batch in [1usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                let tmp = TempDir::new().expect("tmp");
                let backend = SqliteLogBackend::open(tmp.path().join("bench.db")).expect("open");
                let store = OpLogStore::new(Box::new(backend));
                rt.block_on(async {
                    let ops = (0..batch as u64).map(operation).collect();
                    store
                        .append_batch(ops, OpSource::Local)
                        .await
                        .expect("append");
                });
            });
        });
    }
    group.finish();
}

fn bench_tail_read(c: &mut Criterion) {
    let rt = runtime();
    let store = OpLogStore::in_memory();
    rt.block_on(async {
        let ops = (0..20_000u64).map(operation).collect();
        store
            .append_batch(ops, OpSource::Remote)
            .await
            .expect("append");
    });

    let mut group = c.benchmark_group("tail_read");
    for after in [0u64, 10_000, 19_900] {
        group.bench_with_input(BenchmarkId::from_parameter(after), &after, |b, &after| {
            b.iter(|| {
                rt.block_on(async {
                    let _ = store.get_ops_after_seq(after).await.expect("tail");
                });
            });
        });
    }
    group.finish();
}

fn bench_clock_merge(c: &mut Criterion) {
    let clocks: Vec<VectorClock> = (0..1000u64)
        .map(|i| VectorClock::from_iter((0..8u64).map(|c| (format!("client-{c}"), (i * 7 + c) % 97))))
        .collect();
    c.bench_function("merge_all_1k_clocks", |b| {
        b.iter(|| merge_all(&clocks));
    });
}

criterion_group!(benches, bench_sqlite_append, bench_tail_read, bench_clock_merge);
criterion_main!(benches);
