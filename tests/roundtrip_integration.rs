//! Интеграционные тесты экспорта → импорта через `InMemoryStore`.

use bytes::Bytes;
use tabledump::{
    read_header, ExportOptions, Exporter, ImportOptions, Importer, InMemoryStore, Record,
    TableSchema, TableStore, TypedArrayKind, Value,
};

use generators::snapshot;

const FIXED_DATE: f64 = 1_577_836_800_000.0;

fn foos_store() -> InMemoryStore {
    let mut store =
        InMemoryStore::with_tables("app", 1.0, [TableSchema::new("foos", "++id,date")]);
    store
        .bulk_write(
            "foos",
            vec![
                Record::inbound(Value::object([
                    ("id", Value::Int(1)),
                    ("date", Value::Date(FIXED_DATE)),
                ])),
                Record::inbound(Value::object([("id", Value::Int(2))])),
            ],
            false,
        )
        .unwrap();
    store
}

fn rich_store() -> InMemoryStore {
    let mut store = InMemoryStore::with_tables(
        "rich",
        3.0,
        [
            TableSchema::new("docs", "++id, title"),
            TableSchema::new("blobs", ""),
            TableSchema::new("people", "[first+last], age"),
        ],
    );
    let doc = Value::object([
        ("title", Value::from("Hello")),
        ("nested", Value::object([("deep", Value::Array(vec![Value::Int(1), Value::Null]))])),
        ("created", Value::Date(FIXED_DATE)),
        ("raw", Value::Bytes(Bytes::from_static(b"\x00\x01\x02\xff"))),
        (
            "attachment",
            Value::Blob {
                mime: "text/plain".into(),
                data: Bytes::from_static(b"attachment body"),
            },
        ),
        (
            "samples",
            Value::TypedArray {
                kind: TypedArrayKind::Float32,
                data: Bytes::from(1.5f32.to_le_bytes().to_vec()),
            },
        ),
        ("big", Value::BigInt("123456789012345678901234567890".into())),
        ("inf", Value::Float(f64::INFINITY)),
        ("missing", Value::Undefined),
        ("tagged", Value::object([("$t", Value::from("not a tag"))])),
    ]);
    store
        .bulk_write("docs", vec![Record::inbound(doc)], false)
        .unwrap();
    store
        .bulk_write(
            "blobs",
            vec![
                Record::new(
                    Some(Value::Int(7)),
                    Value::Map(vec![(Value::Int(1), Value::from("one"))]),
                ),
                Record::new(
                    Some(Value::from("pattern")),
                    Value::RegExp {
                        source: "^a+$".into(),
                        flags: "gi".into(),
                    },
                ),
                Record::new(
                    Some(Value::Bytes(Bytes::from_static(b"k"))),
                    Value::Set(vec![Value::Int(3), Value::from("x")]),
                ),
            ],
            false,
        )
        .unwrap();
    store
        .bulk_write(
            "people",
            vec![Record::inbound(Value::object([
                ("first", Value::from("Ada")),
                ("last", Value::from("Lovelace")),
                ("age", Value::Int(36)),
            ]))],
            false,
        )
        .unwrap();
    store
}

fn empty_like(store: &InMemoryStore) -> InMemoryStore {
    InMemoryStore::with_tables(store.name(), store.version(), store.list_tables().unwrap())
}

/// Тест проверяет сценарий с таблицей `foos`: обе записи переносятся, а
/// дата у записи 1 совпадает с исходной.
#[test]
fn test_foos_date_scenario() {
    let mut source = foos_store();
    let container = Exporter::default()
        .export(&mut source, ExportOptions::default())
        .unwrap();

    let mut dest = InMemoryStore::with_tables("app", 1.0, [TableSchema::new("foos", "++id,date")]);
    Importer::default()
        .import(&container, &mut dest, ImportOptions::default())
        .unwrap();

    assert_eq!(dest.count_rows("foos").unwrap(), 2);
    let first = dest.get("foos", &Value::Int(1)).unwrap();
    assert_eq!(first.get("date"), Some(&Value::Date(FIXED_DATE)));
}

/// Тест проверяет, что все виды значений переживают экспорт и импорт.
#[test]
fn test_round_trip_preserves_all_value_kinds() {
    let mut source = rich_store();
    let container = Exporter::default()
        .export(&mut source, ExportOptions::default())
        .unwrap();

    let mut dest = empty_like(&source);
    let summary = Importer::default()
        .import(&container, &mut dest, ImportOptions::default())
        .unwrap();

    assert_eq!(summary.rows_written, 5);
    assert_eq!(snapshot(&dest), snapshot(&source));
}

/// Тест проверяет, что повторный импорт с перезаписью даёт то же
/// состояние, что и однократный.
#[test]
fn test_import_twice_with_overwrite_is_idempotent() {
    let mut source = rich_store();
    let container = Exporter::default()
        .export(&mut source, ExportOptions::default())
        .unwrap();

    let mut once = empty_like(&source);
    Importer::default()
        .import(&container, &mut once, ImportOptions::default().overwrite())
        .unwrap();

    let mut twice = empty_like(&source);
    for _ in 0..2 {
        Importer::default()
            .import(&container, &mut twice, ImportOptions::default().overwrite())
            .unwrap();
    }
    assert_eq!(snapshot(&once), snapshot(&twice));
}

/// Тест проверяет очистку таблиц перед импортом.
#[test]
fn test_clear_tables_before_import() {
    let mut source = foos_store();
    let container = Exporter::default()
        .export(&mut source, ExportOptions::default())
        .unwrap();

    let mut dest = foos_store();
    dest.bulk_write(
        "foos",
        vec![Record::inbound(Value::object([("id", Value::Int(99))]))],
        false,
    )
    .unwrap();
    Importer::default()
        .import(
            &container,
            &mut dest,
            ImportOptions::default().clear_before_import(),
        )
        .unwrap();
    assert_eq!(dest.count_rows("foos").unwrap(), 2);
    assert!(dest.get("foos", &Value::Int(99)).is_none());
}

/// Тест проверяет, что отфильтрованные записи не попадают ни в контейнер,
/// ни в приёмник.
#[test]
fn test_filter_excludes_records_in_both_directions() {
    let mut source = rich_store();
    let container = Exporter::default()
        .export(
            &mut source,
            ExportOptions::default().filter(|table, _, _| table != "people"),
        )
        .unwrap();
    let text = container.to_text().unwrap();
    assert!(!text.contains("Lovelace"));

    let mut dest = empty_like(&source);
    let summary = Importer::default()
        .import(
            &container,
            &mut dest,
            ImportOptions::default()
                .filter(|_, _, key| key != Some(&Value::Int(7))),
        )
        .unwrap();
    assert_eq!(summary.rows_filtered, 1);
    assert!(dest.get("blobs", &Value::Int(7)).is_none());
    assert_eq!(dest.count_rows("blobs").unwrap(), 2);
    assert_eq!(dest.count_rows("people").unwrap(), 0);
}

/// Тест проверяет создание приёмника по заголовку контейнера.
#[test]
fn test_import_new_from_header() {
    let mut source = rich_store();
    let container = Exporter::default()
        .export(&mut source, ExportOptions::default())
        .unwrap();

    let header = read_header(&container).unwrap();
    assert_eq!(header.database_name, "rich");
    assert_eq!(header.database_version, 3.0);
    assert_eq!(header.tables.len(), 3);
    assert_eq!(header.table("blobs").map(|t| t.row_count), Some(3));

    let (dest, summary) = Importer::default()
        .import_new(
            &container,
            |header| {
                Ok(InMemoryStore::with_tables(
                    header.database_name.clone(),
                    header.database_version,
                    header
                        .tables
                        .iter()
                        .map(|t| TableSchema::new(&t.name, &t.schema)),
                ))
            },
            ImportOptions::default(),
        )
        .unwrap();
    assert_eq!(summary.rows_written, 5);
    assert_eq!(snapshot(&dest), snapshot(&source));
}

/// Тест проверяет экспорт в файл и импорт через `FileSource`.
#[test]
fn test_round_trip_through_file() {
    let mut source = rich_store();
    let container = Exporter::default()
        .export(&mut source, ExportOptions::default().pretty())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.json");
    let mut file = std::fs::File::create(&path).unwrap();
    container.write_to(&mut file).unwrap();
    drop(file);

    let file_source = tabledump::FileSource::open(&path).unwrap();
    let mut dest = empty_like(&source);
    Importer::default()
        .import(
            file_source,
            &mut dest,
            ImportOptions::default().window_bytes(7),
        )
        .unwrap();
    assert_eq!(snapshot(&dest), snapshot(&source));
}
