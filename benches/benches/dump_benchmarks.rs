use std::{hint::black_box, time::Duration};

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tabledump::{
    ExportOptions, Exporter, ImportOptions, Importer, InMemoryStore, Record, TableSchema,
    TableStore, Token, Tokenizer, Value,
};

const ROW_COUNTS: [usize; 3] = [100, 1_000, 10_000];

fn make_store(rows: usize) -> InMemoryStore {
    let mut rng = SmallRng::seed_from_u64(42);
    let mut store = InMemoryStore::with_tables(
        "bench",
        1.0,
        [TableSchema::new("events", "++id, at")],
    );
    let records = (0..rows)
        .map(|i| {
            let payload: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
            Record::inbound(Value::object([
                ("name", Value::from(format!("event-{i}"))),
                ("at", Value::Date(rng.gen_range(0.0..1.7e12f64).trunc())),
                ("score", Value::Float(rng.gen())),
                ("payload", Value::Bytes(Bytes::from(payload))),
            ]))
        })
        .collect();
    store.bulk_write("events", records, false).unwrap();
    store
}

fn empty_store() -> InMemoryStore {
    InMemoryStore::with_tables("bench", 1.0, [TableSchema::new("events", "++id, at")])
}

pub fn bench_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    for rows in ROW_COUNTS {
        let mut store = make_store(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| {
                let container = Exporter::default()
                    .export(&mut store, ExportOptions::default())
                    .unwrap();
                black_box(container.len())
            })
        });
    }
    group.finish();
}

pub fn bench_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("import");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    for rows in ROW_COUNTS {
        let container = Exporter::default()
            .export(&mut make_store(rows), ExportOptions::default())
            .unwrap();
        group.throughput(Throughput::Bytes(container.len()));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &container, |b, container| {
            b.iter(|| {
                let mut dest = empty_store();
                Importer::default()
                    .import(container, &mut dest, ImportOptions::default())
                    .unwrap();
                black_box(dest.count_rows("events").unwrap())
            })
        });
    }
    group.finish();
}

pub fn bench_tokenizer_windows(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenizer_window");
    let bytes = Bytes::from(
        Exporter::default()
            .export(&mut make_store(2_000), ExportOptions::default())
            .unwrap()
            .to_vec(),
    );
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    for window in [256usize, 4 * 1024, 64 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(window), &window, |b, &window| {
            b.iter(|| {
                let mut tokenizer = Tokenizer::new(bytes.clone()).with_window(window);
                let mut scalars = 0usize;
                while let Some(token) = tokenizer.next().unwrap() {
                    if let Token::Scalar(_) = token {
                        scalars += 1;
                    }
                }
                black_box(scalars)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_export, bench_import, bench_tokenizer_windows);
criterion_main!(benches);
