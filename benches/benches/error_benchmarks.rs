use std::hint::black_box;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion};
use tabledump::{ImportOptions, Importer, InMemoryStore, TableSchema};
use tabledump_error::{DumpError, ResultExt, SchemaMismatch, StackError, TabledumpResult};

fn make_invalid_record() -> DumpError {
    DumpError::InvalidRecord {
        table: "events".to_string(),
        reason: "expected [key, value], got 3 elements".to_string(),
    }
}

fn failing_step(depth: usize) -> TabledumpResult<()> {
    if depth == 0 {
        return Err(DumpError::json("unexpected ','", 4096).into());
    }
    failing_step(depth - 1).context("table events")
}

pub fn bench_create_clone(c: &mut Criterion) {
    c.bench_function("create_invalid_record", |b| {
        b.iter(|| black_box(make_invalid_record()))
    });

    let base = make_invalid_record();
    c.bench_function("clone_invalid_record", |b| b.iter(|| black_box(base.clone())));

    c.bench_function("schema_mismatch_into_stack", |b| {
        b.iter(|| {
            let mismatch = SchemaMismatch::MissingTable {
                table: "events".to_string(),
            };
            black_box(StackError::from(DumpError::from(mismatch)))
        })
    });
}

pub fn bench_context_chain(c: &mut Criterion) {
    for depth in [1usize, 4, 16] {
        c.bench_function(&format!("context_chain_{depth}"), |b| {
            b.iter(|| {
                let err = failing_step(black_box(depth)).unwrap_err();
                black_box((err.status_code(), err.contexts().len()))
            })
        });
    }

    let err = failing_step(4).unwrap_err();
    c.bench_function("client_message", |b| b.iter(|| black_box(err.client_message())));
    c.bench_function("display_with_contexts", |b| b.iter(|| black_box(err.to_string())));
}

pub fn bench_rejected_container(c: &mut Criterion) {
    let text = Bytes::from_static(
        br#"{"formatName":"dexie","formatVersion":1,"data":{"databaseName":"bench","databaseVersion":1,
        "tables":[{"name":"events","schema":"++id, at","rowCount":1}],"data":[{"tableName":"events","rows":[1,,2]}]}}"#,
    );
    c.bench_function("import_rejects_malformed_row", |b| {
        b.iter(|| {
            let mut dest =
                InMemoryStore::with_tables("bench", 1.0, [TableSchema::new("events", "++id, at")]);
            let err = Importer::default()
                .import(text.clone(), &mut dest, ImportOptions::default())
                .unwrap_err();
            black_box(err.dump_error().cloned())
        })
    });
}

criterion_group!(
    benches,
    bench_create_clone,
    bench_context_chain,
    bench_rejected_container
);
criterion_main!(benches);
