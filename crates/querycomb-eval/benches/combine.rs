//! Combiner benchmarks for querycomb-eval.
//!
//! Measures configuration compilation, condition evaluation, batch
//! throughput against the in-memory store, and reaper sweeps.


use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use querycomb_eval::{
    CollectingEmitter, Combiner, CompiledCondition, CompiledConfig, Event, MemoryStore, Reaper,
    SessionStore, TaggedRecord,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// Benchmark: compile configuration
// ---------------------------------------------------------------------------

fn bench_compile_config(c: &mut Criterion) {
    c.bench_function("compile_config", |b| {
        b.iter(|| {
            let config = CompiledConfig::from_yaml(black_box(datagen::CONFIG)).unwrap();
            black_box(config);
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark: condition evaluation
// ---------------------------------------------------------------------------

fn bench_condition(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition");
    let record = json!({"status": "finish", "code": 200, "path": "/api/v1/orders/42"});
    let record = record.as_object().unwrap();
    let event = Event::new(record);

    for (name, expr) in [
        ("equality", "status == 'finish'"),
        ("compound", "status == 'finish' and code < 500 and not code == 304"),
        ("regex", r"path =~ '^/api/v\d+/orders/\d+$'"),
    ] {
        let cond = CompiledCondition::compile(expr).unwrap();
        group.bench_with_input(BenchmarkId::new("matches", name), &cond, |b, cond| {
            b.iter(|| black_box(cond.matches(black_box(&event))));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: batch throughput
// ---------------------------------------------------------------------------

fn bench_process_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_batch");
    let config = Arc::new(CompiledConfig::from_yaml(datagen::CONFIG).unwrap());

    for sessions in [100, 1_000, 10_000] {
        let records: Vec<TaggedRecord> = datagen::gen_session_records(sessions)
            .into_iter()
            .map(|(time, v)| TaggedRecord {
                tag: "bench".to_string(),
                time,
                record: v.as_object().cloned().unwrap_or_default(),
            })
            .collect();
        group.throughput(Throughput::Elements(records.len() as u64));

        group.bench_with_input(
            BenchmarkId::new("sessions", sessions),
            &records,
            |b, records| {
                b.iter_batched(
                    || {
                        let sink = Arc::new(CollectingEmitter::new());
                        let combiner =
                            Combiner::new(config.clone(), Arc::new(MemoryStore::new()), sink);
                        (combiner, records.clone())
                    },
                    |(combiner, batch)| black_box(combiner.process_batch(batch).unwrap()),
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: reaper sweep
// ---------------------------------------------------------------------------

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("reaper_sweep");
    let yaml = datagen::CONFIG.replace("buffer_size: 100000", "buffer_size: 1000");
    let config = Arc::new(CompiledConfig::from_yaml(&yaml).unwrap());

    for open in [1_000, 10_000] {
        group.bench_function(BenchmarkId::new("open_sessions", open), |b| {
            b.iter_batched(
                || {
                    let store = Arc::new(MemoryStore::new());
                    for i in 0..open {
                        let key = format!("db1:{i}");
                        store
                            .set_with_expiry(&config.session_key(&key), "{}", 3600)
                            .unwrap();
                        store.index_upsert(config.index_key(), &key, i as i64).unwrap();
                    }
                    Reaper::new(config.clone(), store)
                },
                |reaper| black_box(reaper.sweep_at(open as i64).unwrap()),
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compile_config,
    bench_condition,
    bench_process_batch,
    bench_sweep
);
criterion_main!(benches);
