// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for ListDB tables and log replay

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use listdb_oplog::{replay, RestorePolicy};
use listdb_table::{Document, SyncMode, Table, TableConfig, TableMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    key: u64,
    label: String,
    tags: Vec<String>,
}

impl Document for Entry {}

fn entry(key: u64) -> Entry {
    Entry {
        key,
        label: format!("entry number {key}"),
        tags: vec!["bench".to_string(), format!("k{}", key % 16)],
    }
}

fn config() -> TableConfig {
    TableConfig::default()
        .with_mode(TableMode::NONE)
        .with_sync_mode(SyncMode::Async)
}

// ============================================================================
// Mutation Benchmarks
// ============================================================================

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("table");

    group.bench_function("save_new", |b| {
        let dir = TempDir::new().unwrap();
        let table = Table::<Entry>::open(dir.path(), config()).unwrap();
        let mut key = 0u64;
        b.iter(|| {
            key += 1;
            black_box(table.save(entry(key)).unwrap())
        });
    });

    group.bench_function("save_existing", |b| {
        let dir = TempDir::new().unwrap();
        let table = Table::<Entry>::open(dir.path(), config()).unwrap();
        table.add_range((0..1000).map(entry)).unwrap();
        b.iter(|| black_box(table.save(entry(500)).unwrap()));
    });

    group.finish();
}

// ============================================================================
// Recovery Benchmarks
// ============================================================================

fn bench_reopen(c: &mut Criterion) {
    let mut group = c.benchmark_group("reopen");

    for size in [100u64, 1_000, 10_000] {
        let dir = TempDir::new().unwrap();
        {
            let table = Table::<Entry>::open(dir.path(), config()).unwrap();
            table.add_range((0..size).map(entry)).unwrap();
            table.remove_range(0, (size / 10) as usize).unwrap();
        }

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("replay_log", size), &size, |b, _| {
            b.iter(|| {
                let table = Table::<Entry>::open(dir.path(), config()).unwrap();
                black_box(table.count().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_replay_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    for size in [1_000usize, 10_000] {
        let primary: Vec<String> = (0..size).map(|i| format!("{{\"n\":{i}}}")).collect();
        let mut log: Vec<String> = (0..size).map(|i| format!("added: {i}")).collect();
        log.extend((0..size / 2).map(|_| "deleted: 0".to_string()));

        group.throughput(Throughput::Elements(log.len() as u64));
        group.bench_with_input(BenchmarkId::new("added_then_deleted", size), &size, |b, _| {
            b.iter(|| {
                let replayed =
                    replay(primary.clone(), Some(log.as_slice()), RestorePolicy::Strict).unwrap();
                black_box(replayed.lines.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_save, bench_reopen, bench_replay_lines);
criterion_main!(benches);
