//! Прогресс, кооперативная отмена и аренда транзакции.

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use bytes::Bytes;
use tabledump::{
    ChunkSource, Container, ExportOptions, Exporter, ImportOptions, Importer, InMemoryStore,
    Progress, Record, StatusCode, TableSchema, TableStore, TabledumpResult, Value,
};

fn store_with_rows(rows: i64) -> InMemoryStore {
    let mut store = InMemoryStore::with_tables(
        "progress",
        1.0,
        [
            TableSchema::new("a", "++id"),
            TableSchema::new("b", "++id"),
        ],
    );
    for table in ["a", "b"] {
        let records = (0..rows)
            .map(|i| Record::inbound(Value::object([("n", Value::Int(i)), ("pad", Value::from("x".repeat(40)))])))
            .collect();
        store.bulk_write(table, records, false).unwrap();
    }
    store
}

fn empty_dest() -> InMemoryStore {
    InMemoryStore::with_tables(
        "progress",
        1.0,
        [
            TableSchema::new("a", "++id"),
            TableSchema::new("b", "++id"),
        ],
    )
}

fn export(rows: i64) -> Container {
    Exporter::default()
        .export(&mut store_with_rows(rows), ExportOptions::default())
        .unwrap()
}

fn recorder() -> (Arc<Mutex<Vec<Progress>>>, impl FnMut(&Progress) -> bool + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |p: &Progress| {
        sink.lock().unwrap().push(*p);
        true
    })
}

fn assert_monotonic(seen: &[Progress]) {
    for pair in seen.windows(2) {
        assert!(pair[1].completed_rows >= pair[0].completed_rows);
        assert!(pair[1].completed_tables >= pair[0].completed_tables);
    }
    let last = seen.last().unwrap();
    assert!(last.done);
    assert_eq!(last.completed_rows, last.total_rows);
    assert_eq!(last.completed_tables, last.total_tables);
    assert_eq!(seen.iter().filter(|p| p.done).count(), 1);
}

/// Тест проверяет монотонность прогресса экспорта и итоговый `done`.
#[test]
fn test_export_progress_is_monotonic() {
    let (seen, callback) = recorder();
    Exporter::default()
        .export(
            &mut store_with_rows(25),
            ExportOptions::default()
                .rows_per_chunk(4)
                .filter(|_, v, _| v.get("n") != Some(&Value::Int(3)))
                .progress(callback),
        )
        .unwrap();
    let seen = seen.lock().unwrap();
    assert!(seen.len() > 10);
    assert_eq!(seen[0].total_rows, 50);
    assert_eq!(seen[0].completed_rows, 0);
    assert_monotonic(&seen);
    // Отфильтрованные строки тоже учитываются.
    assert_eq!(seen.last().unwrap().completed_rows, 50);
}

/// Тест проверяет монотонность прогресса импорта при мелких пакетах.
#[test]
fn test_import_progress_is_monotonic() {
    let container = export(30);
    let (seen, callback) = recorder();
    Importer::default()
        .import(
            &container,
            &mut empty_dest(),
            ImportOptions::default()
                .chunk_size_bytes(128)
                .progress(callback),
        )
        .unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].total_tables, 2);
    assert_eq!(seen[0].total_rows, 60);
    assert_eq!(seen[0].completed_rows, 0);
    assert_monotonic(&seen);
}

/// Тест проверяет, что отмена экспорта возвращает `Cancelled` и закрывает
/// транзакцию.
#[test]
fn test_export_cancellation() {
    let mut store = store_with_rows(20);
    let mut calls = 0;
    let err = Exporter::default()
        .export(
            &mut store,
            ExportOptions::default().rows_per_chunk(5).progress(move |_| {
                calls += 1;
                calls < 3
            }),
        )
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(!store.in_transaction());
}

/// Тест проверяет, что в транзакционном режиме отменённый импорт не
/// оставляет ни одной записи.
#[test]
fn test_transactional_import_cancellation_writes_nothing() {
    let container = export(30);
    let mut dest = empty_dest();
    let mut calls = 0;
    let err = Importer::default()
        .import(
            &container,
            &mut dest,
            ImportOptions::default()
                .chunk_size_bytes(256)
                .progress(move |_| {
                    calls += 1;
                    calls < 4
                }),
        )
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(dest.count_rows("a").unwrap(), 0);
    assert_eq!(dest.count_rows("b").unwrap(), 0);
    assert!(!dest.in_transaction());
}

/// Тест проверяет, что без транзакции остаются ровно пакеты, записанные
/// до отменяющего вызова.
#[test]
fn test_non_transactional_cancellation_keeps_earlier_batches() {
    let container = export(30);
    let (seen, mut record) = recorder();
    let mut calls = 0;
    let mut dest = empty_dest();
    let err = Importer::default()
        .import(
            &container,
            &mut dest,
            ImportOptions::default()
                .without_transaction()
                .chunk_size_bytes(256)
                .progress(move |p| {
                    calls += 1;
                    record(p) && calls < 4
                }),
        )
        .unwrap_err();
    assert!(err.is_cancelled());

    // Каждый вызов предшествует записи своего пакета; четвёртый пакет
    // отменён до записи.
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0].completed_rows, 0);
    let rows = dest.count_rows("a").unwrap() + dest.count_rows("b").unwrap();
    assert_eq!(rows, seen[2].completed_rows);
    assert!(rows > 0);
    assert!(rows < seen[3].completed_rows);
}

/// Источник, который медленно отдаёт каждое окно.
struct SlowSource {
    inner: Bytes,
    delay: Duration,
}

impl ChunkSource for SlowSource {
    fn len(&self) -> u64 {
        self.inner.len() as u64
    }

    fn read_range(
        &self,
        offset: u64,
        length: usize,
    ) -> TabledumpResult<Bytes> {
        thread::sleep(self.delay);
        self.inner.read_range(offset, length)
    }
}

/// Тест проверяет, что продление аренды при чтении окон не даёт
/// транзакции истечь, хотя импорт длится дольше таймаута простоя.
#[test]
fn test_lease_keeps_transaction_alive_during_slow_reads() {
    let container = export(5);
    let bytes = Bytes::from(container.to_vec());
    let window = bytes.len() / 12 + 1;
    let source = SlowSource {
        inner: bytes,
        delay: Duration::from_millis(20),
    };

    let mut dest = empty_dest();
    dest.set_idle_timeout(Some(Duration::from_millis(150)));
    let summary = Importer::default()
        .import(
            source,
            &mut dest,
            ImportOptions::default().window_bytes(window),
        )
        .unwrap();
    assert_eq!(summary.rows_written, 10);
    assert_eq!(dest.count_rows("a").unwrap(), 5);
    assert!(dest.lease().renewals() > 3);
}

/// Тест проверяет, что простой без продления аренды прерывает транзакцию
/// и откатывает уже записанное.
#[test]
fn test_idle_transaction_aborts_import() {
    let container = export(20);
    let mut dest = empty_dest();
    dest.set_idle_timeout(Some(Duration::from_millis(30)));
    let mut calls = 0;
    let err = Importer::default()
        .import(
            &container,
            &mut dest,
            ImportOptions::default()
                .chunk_size_bytes(256)
                .progress(move |_| {
                    calls += 1;
                    if calls == 3 {
                        thread::sleep(Duration::from_millis(80));
                    }
                    true
                }),
        )
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::TransactionAborted);
    assert_eq!(dest.count_rows("a").unwrap(), 0);
    assert!(!dest.in_transaction());
}
