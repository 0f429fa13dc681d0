//! Импорт контейнера в хранилище таблиц.
//!
//! Заголовок и дескрипторы разбираются и сверяются со схемой приёмника до
//! первой записи. Строки читаются потоково, декодируются, фильтруются и
//! пишутся пакетами, размер которых измеряется в байтах источника.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as Json;
use tabledump_error::{DumpError, ResultExt, SchemaMismatch, TabledumpResult};
use tracing::{debug, info, info_span, warn};

use super::{
    chunk::ChunkSource,
    codec::TypeRegistry,
    header::{expect, parse_header, read_header, version_to_json, DatabaseHeader},
    options::ImportOptions,
    progress::{Progress, ProgressTracker},
    tags::{KEY_INBOUND, KEY_ROWS, KEY_TABLE_NAME},
    tokenizer::{Token, Tokenizer},
};
use crate::engine::{Record, TableSchema, TableStore, TransactionMode};

/// Итог импорта.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Таблицы, строки которых записывались, в порядке контейнера.
    pub tables: Vec<String>,
    pub rows_written: u64,
    /// Строки, отклонённые фильтром.
    pub rows_filtered: u64,
    /// Строки, пропущенные из-за ошибки декодирования.
    pub rows_invalid: u64,
    pub progress: Progress,
}

#[derive(Debug, Clone)]
pub struct Importer {
    registry: Arc<TypeRegistry>,
}

/// Состояние одного прохода по секции данных.
struct Run<'a> {
    header: &'a DatabaseHeader,
    plan: &'a [TableSchema],
    options: &'a ImportOptions,
    tracker: ProgressTracker,
    summary: ImportSummary,
}

impl Importer {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Импортирует контейнер в существующее хранилище.
    pub fn import<C, S>(
        &self,
        source: C,
        store: &mut S,
        mut options: ImportOptions,
    ) -> TabledumpResult<ImportSummary>
    where
        C: ChunkSource,
        S: TableStore,
    {
        let span = info_span!("import", database = %store.name());
        let _enter = span.enter();

        let result = self.run(source, store, &mut options);
        match &result {
            Ok(summary) => info!(
                tables = summary.tables.len(),
                rows_written = summary.rows_written,
                rows_filtered = summary.rows_filtered,
                rows_invalid = summary.rows_invalid,
                "Import finished"
            ),
            Err(err) => info!(error = %err, "Import stopped"),
        }
        result.context("import")
    }

    /// Создаёт приёмник по заголовку контейнера через `factory` и
    /// импортирует в него данные.
    pub fn import_new<C, S, F>(
        &self,
        source: C,
        factory: F,
        options: ImportOptions,
    ) -> TabledumpResult<(S, ImportSummary)>
    where
        C: ChunkSource,
        S: TableStore,
        F: FnOnce(&DatabaseHeader) -> TabledumpResult<S>,
    {
        let header = read_header(&source).context("import")?;
        let mut store = factory(&header)?;
        let summary = self.import(&source, &mut store, options)?;
        Ok((store, summary))
    }

    fn run<C: ChunkSource, S: TableStore>(
        &self,
        source: C,
        store: &mut S,
        options: &mut ImportOptions,
    ) -> TabledumpResult<ImportSummary> {
        let mut tokenizer = Tokenizer::new(source)
            .with_window(options.window_bytes)
            .with_max_depth(options.max_depth);
        let (header, has_data) = parse_header(&mut tokenizer)?;
        if !has_data {
            return Err(DumpError::MalformedContainer {
                reason: "container has no data section".into(),
            }
            .into());
        }

        let plan = reconcile(&header, store, options)?;
        let total_rows = plan
            .iter()
            .filter_map(|t| header.table(&t.name))
            .map(|d| d.row_count)
            .sum();
        debug!(tables = plan.len(), total_rows, "Schema reconciled");

        let tracker = ProgressTracker::new(plan.len() as u64, total_rows, options.progress.take());
        let options: &ImportOptions = options;
        let mut run = Run {
            header: &header,
            plan: &plan,
            options,
            tracker,
            summary: ImportSummary::default(),
        };

        if options.include_transaction {
            tokenizer.set_lease(Some(store.lease()));
            let names: Vec<String> = plan.iter().map(|t| t.name.clone()).collect();
            store.run_in_transaction(TransactionMode::ReadWrite, &names, |s| {
                self.import_data(&mut tokenizer, s, &mut run)
            })?;
        } else {
            self.import_data(&mut tokenizer, store, &mut run)?;
        }

        run.summary.progress = run.tracker.finish();
        Ok(run.summary)
    }

    fn import_data<C: ChunkSource, S: TableStore>(
        &self,
        tokenizer: &mut Tokenizer<C>,
        store: &mut S,
        run: &mut Run<'_>,
    ) -> TabledumpResult<()> {
        run.tracker.report()?;
        expect(tokenizer, Token::ArrayStart, "table data")?;
        loop {
            match tokenizer.next()? {
                Some(Token::ObjectStart) => self.import_table_entry(tokenizer, store, run)?,
                Some(Token::ArrayEnd) => break,
                other => {
                    return Err(DumpError::MalformedContainer {
                        reason: format!("unexpected token {other:?} in table data"),
                    }
                    .into())
                }
            }
        }
        // Остаток документа проверяется синтаксически и пропускается.
        while let Some(token) = tokenizer.next()? {
            if let Token::Key(_) = token {
                tokenizer.skip_value()?;
            }
        }
        Ok(())
    }

    fn import_table_entry<C: ChunkSource, S: TableStore>(
        &self,
        tokenizer: &mut Tokenizer<C>,
        store: &mut S,
        run: &mut Run<'_>,
    ) -> TabledumpResult<()> {
        let mut table_name: Option<String> = None;
        let mut inbound: Option<bool> = None;
        loop {
            match tokenizer.next()? {
                Some(Token::Key(key)) => match key.as_str() {
                    KEY_TABLE_NAME => match tokenizer.read_value()? {
                        Json::String(name) => table_name = Some(name),
                        _ => return Err(malformed(format!("'{KEY_TABLE_NAME}' must be a string"))),
                    },
                    KEY_INBOUND => inbound = tokenizer.read_value()?.as_bool(),
                    KEY_ROWS => {
                        let name = table_name
                            .clone()
                            .ok_or_else(|| malformed(format!("'{KEY_ROWS}' before '{KEY_TABLE_NAME}'")))?;
                        self.import_rows(tokenizer, store, run, &name, inbound)
                            .with_context(|| format!("table {name}"))?;
                    }
                    _ => tokenizer.skip_value()?,
                },
                Some(Token::ObjectEnd) => return Ok(()),
                other => return Err(malformed(format!("unexpected token {other:?} in table entry"))),
            }
        }
    }

    fn import_rows<C: ChunkSource, S: TableStore>(
        &self,
        tokenizer: &mut Tokenizer<C>,
        store: &mut S,
        run: &mut Run<'_>,
        table: &str,
        inbound: Option<bool>,
    ) -> TabledumpResult<()> {
        let (header, plan) = (run.header, run.plan);
        let descriptor = header
            .table(table)
            .ok_or_else(|| malformed(format!("table '{table}' has no descriptor")))?;
        let Some(dest) = plan.iter().find(|t| t.name == table) else {
            debug!(table, "Skipping table");
            return tokenizer.skip_value();
        };
        let span = info_span!("table", name = %table);
        let _enter = span.enter();

        let inbound =
            inbound.unwrap_or_else(|| TableSchema::new(table, &descriptor.schema).is_inbound());
        if run.options.clear_tables_before_import {
            store.clear_table(table)?;
        }
        run.summary.tables.push(table.to_string());

        expect(tokenizer, Token::ArrayStart, "rows")?;
        let batch_limit = run.options.chunk_size_bytes.max(1) as u64;
        let mut batch = Vec::new();
        let mut batch_rows = 0u64;
        let mut batch_start = tokenizer.position();
        loop {
            if let Some(Token::ArrayEnd) = tokenizer.peek()? {
                tokenizer.next()?;
                break;
            }
            let raw = tokenizer.read_value()?;
            batch_rows += 1;
            match self.decode_row(raw, inbound, table) {
                Ok(record) => {
                    let keep = run.options.filter.as_ref().map_or(true, |f| {
                        let key = match &record.key {
                            Some(key) => Some(key.clone()),
                            None => dest.extract_key(&record.value),
                        };
                        f(table, &record.value, key.as_ref())
                    });
                    if keep {
                        batch.push(record);
                    } else {
                        run.summary.rows_filtered += 1;
                    }
                }
                Err(err)
                    if run.options.skip_invalid_records
                        && err.dump_error().is_some_and(DumpError::is_record_level) =>
                {
                    warn!(error = %err, "Skipping invalid record");
                    run.summary.rows_invalid += 1;
                }
                Err(err) => return Err(err),
            }
            if tokenizer.position() - batch_start >= batch_limit {
                flush(store, run, table, &mut batch, batch_rows)?;
                batch_rows = 0;
                batch_start = tokenizer.position();
            }
        }
        if batch_rows > 0 {
            flush(store, run, table, &mut batch, batch_rows)?;
        }
        run.tracker.complete_table();
        Ok(())
    }

    fn decode_row(
        &self,
        raw: Json,
        inbound: bool,
        table: &str,
    ) -> TabledumpResult<Record> {
        if inbound {
            return Ok(Record::inbound(self.registry.decode(raw)?));
        }
        match raw {
            Json::Array(pair) => match <[Json; 2]>::try_from(pair) {
                Ok([key, value]) => Ok(Record::new(
                    Some(self.registry.decode(key)?),
                    self.registry.decode(value)?,
                )),
                Err(pair) => Err(DumpError::InvalidRecord {
                    table: table.to_string(),
                    reason: format!("expected [key, value], got {} elements", pair.len()),
                }
                .into()),
            },
            other => Err(DumpError::InvalidRecord {
                table: table.to_string(),
                reason: format!("expected [key, value], got {other}"),
            }
            .into()),
        }
    }
}

impl Default for Importer {
    fn default() -> Self {
        Self::new(Arc::new(TypeRegistry::builtin()))
    }
}

/// Опрашивает прогресс и пишет накопленный пакет. Отмена срабатывает до
/// записи.
fn flush<S: TableStore>(
    store: &mut S,
    run: &mut Run<'_>,
    table: &str,
    batch: &mut Vec<Record>,
    rows: u64,
) -> TabledumpResult<()> {
    run.tracker.add_rows(rows);
    run.tracker.report()?;
    let records = std::mem::take(batch);
    let count = records.len() as u64;
    if count > 0 {
        store.bulk_write(table, records, run.options.overwrite_values)?;
    }
    run.summary.rows_written += count;
    debug!(rows = count, "Batch written");
    Ok(())
}

/// Сверяет заголовок с приёмником и возвращает схемы таблиц приёмника,
/// в которые будут записываться строки. Порядок проверок: имя базы,
/// версия, затем по таблицам отсутствие и первичный ключ.
fn reconcile<S: TableStore>(
    header: &DatabaseHeader,
    store: &S,
    options: &ImportOptions,
) -> TabledumpResult<Vec<TableSchema>> {
    if header.database_name != store.name() {
        let mismatch = SchemaMismatch::NameDiff {
            current: store.name().to_string(),
            found: header.database_name.clone(),
        };
        if !options.accept_name_diff {
            return Err(DumpError::from(mismatch).into());
        }
        warn!(%mismatch, "Accepted schema difference");
    }
    if header.database_version != store.version() {
        let mismatch = SchemaMismatch::VersionDiff {
            current: version_to_json(store.version()).to_string(),
            found: version_to_json(header.database_version).to_string(),
        };
        if !options.accept_version_diff {
            return Err(DumpError::from(mismatch).into());
        }
        warn!(%mismatch, "Accepted schema difference");
    }

    let existing = store.list_tables()?;
    let mut plan = Vec::new();
    for descriptor in &header.tables {
        if options.skip_tables.contains(&descriptor.name) {
            continue;
        }
        let Some(dest) = existing.iter().find(|t| t.name == descriptor.name) else {
            if options.accept_missing_tables {
                warn!(table = %descriptor.name, "Table missing in destination, skipping");
                continue;
            }
            return Err(DumpError::from(SchemaMismatch::MissingTable {
                table: descriptor.name.clone(),
            })
            .into());
        };
        let found = TableSchema::new(&descriptor.name, &descriptor.schema);
        if found.primary_key_spec() != dest.primary_key_spec() {
            let mismatch = SchemaMismatch::ChangedPrimaryKey {
                table: descriptor.name.clone(),
                current: dest.primary_key_spec().to_string(),
                found: found.primary_key_spec().to_string(),
            };
            if !options.accept_changed_primary_key {
                return Err(DumpError::from(mismatch).into());
            }
            warn!(%mismatch, "Accepted schema difference");
        }
        plan.push(dest.clone());
    }
    Ok(plan)
}

fn malformed(reason: impl Into<String>) -> tabledump_error::StackError {
    DumpError::MalformedContainer {
        reason: reason.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tabledump_error::StatusCode;

    use super::*;
    use crate::{InMemoryStore, Value};

    const CONTAINER: &str = r#"{"formatName":"dexie","formatVersion":1,"data":{
        "databaseName":"shop","databaseVersion":1,
        "tables":[{"name":"items","schema":"++id,name","rowCount":3},
                  {"name":"kv","schema":"","rowCount":1}],
        "data":[
          {"tableName":"items","inbound":true,"rows":[
            {"id":1,"name":"a"},{"id":2,"name":"b","at":{"$t":"date","$v":5}},{"id":3,"name":"c"}]},
          {"tableName":"kv","inbound":false,"rows":[["k",{"$t":"bytes","$v":"AAE="}]]}
        ]}}"#;

    fn dest() -> InMemoryStore {
        InMemoryStore::with_tables(
            "shop",
            1.0,
            [
                TableSchema::new("items", "++id,name"),
                TableSchema::new("kv", ""),
            ],
        )
    }

    fn source() -> Bytes {
        Bytes::from_static(CONTAINER.as_bytes())
    }

    #[test]
    fn test_imports_all_rows() {
        let mut store = dest();
        let summary = Importer::default()
            .import(source(), &mut store, ImportOptions::default())
            .unwrap();
        assert_eq!(summary.rows_written, 4);
        assert_eq!(summary.tables, vec!["items", "kv"]);
        assert!(summary.progress.done);
        assert_eq!(
            store.get("items", &Value::Int(2)).and_then(|v| v.get("at")),
            Some(&Value::Date(5.0))
        );
        assert_eq!(
            store.get("kv", &Value::from("k")),
            Some(&Value::Bytes(Bytes::from_static(&[0, 1])))
        );
    }

    #[test]
    fn test_reconciliation_order() {
        let mut store = InMemoryStore::with_tables("other", 2.0, Vec::new());
        let err = Importer::default()
            .import(source(), &mut store, ImportOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.dump_error(),
            Some(DumpError::SchemaMismatch(SchemaMismatch::NameDiff { .. }))
        ));

        let options = ImportOptions {
            accept_name_diff: true,
            ..Default::default()
        };
        let err = Importer::default()
            .import(source(), &mut store, options)
            .unwrap_err();
        assert!(matches!(
            err.dump_error(),
            Some(DumpError::SchemaMismatch(SchemaMismatch::VersionDiff { .. }))
        ));

        let options = ImportOptions {
            accept_name_diff: true,
            accept_version_diff: true,
            ..Default::default()
        };
        let err = Importer::default()
            .import(source(), &mut store, options)
            .unwrap_err();
        assert!(matches!(
            err.dump_error(),
            Some(DumpError::SchemaMismatch(SchemaMismatch::MissingTable { table })) if table == "items"
        ));
    }

    #[test]
    fn test_changed_primary_key() {
        let mut store = InMemoryStore::with_tables(
            "shop",
            1.0,
            [TableSchema::new("items", "id"), TableSchema::new("kv", "")],
        );
        let err = Importer::default()
            .import(source(), &mut store, ImportOptions::default())
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SchemaMismatch);
        assert_eq!(store.count_rows("items").unwrap(), 0);

        let options = ImportOptions {
            accept_changed_primary_key: true,
            ..Default::default()
        };
        Importer::default().import(source(), &mut store, options).unwrap();
        assert_eq!(store.count_rows("items").unwrap(), 3);
    }

    #[test]
    fn test_missing_table_accepted_and_skipped() {
        let mut store = InMemoryStore::with_tables("shop", 1.0, [TableSchema::new("kv", "")]);
        let options = ImportOptions {
            accept_missing_tables: true,
            ..Default::default()
        };
        let summary = Importer::default().import(source(), &mut store, options).unwrap();
        assert_eq!(summary.tables, vec!["kv"]);
        assert_eq!(summary.progress.total_rows, 1);
    }

    #[test]
    fn test_insert_only_conflict_and_overwrite() {
        let mut store = dest();
        Importer::default()
            .import(source(), &mut store, ImportOptions::default())
            .unwrap();
        let err = Importer::default()
            .import(source(), &mut store, ImportOptions::default())
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::StoreIo);

        Importer::default()
            .import(source(), &mut store, ImportOptions::default().overwrite())
            .unwrap();
        assert_eq!(store.count_rows("items").unwrap(), 3);
    }

    #[test]
    fn test_skip_invalid_records() {
        let text = CONTAINER.replace(r#"{"$t":"date","$v":5}"#, r#"{"$t":"future","$v":5}"#);
        let mut store = dest();
        let err = Importer::default()
            .import(Bytes::from(text.clone()), &mut store, ImportOptions::default())
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UnknownTypeTag);
        assert_eq!(store.count_rows("items").unwrap(), 0);

        let summary = Importer::default()
            .import(Bytes::from(text), &mut store, ImportOptions::default().skip_invalid())
            .unwrap();
        assert_eq!(summary.rows_invalid, 1);
        assert_eq!(store.count_rows("items").unwrap(), 2);
    }

    #[test]
    fn test_rows_before_table_name_is_malformed() {
        let text = CONTAINER.replace(r#""tableName":"kv","inbound":false,"#, r#""inbound":false,"#);
        let err = Importer::default()
            .import(Bytes::from(text), &mut dest(), ImportOptions::default())
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::MalformedContainer);
    }

    #[test]
    fn test_import_new_creates_destination() {
        let (store, summary) = Importer::default()
            .import_new(
                source(),
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
        assert_eq!(store.name(), "shop");
        assert_eq!(summary.rows_written, 4);
    }
}
