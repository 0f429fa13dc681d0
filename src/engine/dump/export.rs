//! Экспорт таблиц хранилища в контейнер.
//!
//! Порядок: перечисление таблиц → подсчёт строк и запись дескрипторов →
//! для каждой таблицы чтение порциями по ключу, фильтр, кодирование и
//! запись строк → закрытие документа.

use std::sync::Arc;

use serde_json::Value as Json;
use tabledump_error::{DumpError, ResultExt, StackError, StatusCode, TabledumpResult};
use tracing::{debug, info, info_span};

use super::{
    chunk::{ChunkSink, Container},
    codec::TypeRegistry,
    header::version_to_json,
    options::ExportOptions,
    progress::ProgressTracker,
    tags::{
        FORMAT_NAME, FORMAT_VERSION, KEY_DATA, KEY_DATABASE_NAME, KEY_DATABASE_VERSION,
        KEY_FORMAT_NAME, KEY_FORMAT_VERSION, KEY_INBOUND, KEY_NAME, KEY_ROWS, KEY_ROW_COUNT,
        KEY_SCHEMA, KEY_TABLES, KEY_TABLE_NAME,
    },
    writer::DatasetWriter,
};
use crate::engine::{TableSchema, TableStore, TransactionMode};

#[derive(Debug, Clone)]
pub struct Exporter {
    registry: Arc<TypeRegistry>,
}

impl Exporter {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Экспортирует все таблицы, кроме `skip_tables`, в один контейнер.
    ///
    /// Любая ошибка хранилища превращается в `DumpError::ExportFailed` с
    /// именем таблицы; контейнер в этом случае не возвращается.
    pub fn export<S: TableStore>(
        &self,
        store: &mut S,
        mut options: ExportOptions,
    ) -> TabledumpResult<Container> {
        let span = info_span!("export", database = %store.name());
        let _enter = span.enter();

        let tables: Vec<TableSchema> = store
            .list_tables()
            .map_err(|e| export_failed("*", e))?
            .into_iter()
            .filter(|t| !options.skip_tables.contains(&t.name))
            .collect();

        let result = if options.include_transaction {
            let names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
            store.run_in_transaction(TransactionMode::ReadOnly, &names, |s| {
                self.export_tables(s, &tables, &mut options)
            })
        } else {
            self.export_tables(store, &tables, &mut options)
        };

        match &result {
            Ok(container) => info!(
                tables = tables.len(),
                bytes = container.len(),
                fragments = container.fragment_count(),
                "Export finished"
            ),
            Err(err) => info!(error = %err, "Export stopped"),
        }
        result.context("export")
    }

    fn export_tables<S: TableStore>(
        &self,
        store: &mut S,
        tables: &[TableSchema],
        options: &mut ExportOptions,
    ) -> TabledumpResult<Container> {
        let mut counts = Vec::with_capacity(tables.len());
        for table in tables {
            counts.push(
                store
                    .count_rows(&table.name)
                    .map_err(|e| export_failed(&table.name, e))?,
            );
        }
        let mut tracker = ProgressTracker::new(
            tables.len() as u64,
            counts.iter().sum(),
            options.progress.take(),
        );

        let sink = ChunkSink::new(options.fragment_bytes);
        let mut writer = DatasetWriter::new(sink).pretty(options.pretty_json);

        writer.begin_object(None)?;
        writer.write_scalar(&Json::from(FORMAT_NAME), Some(KEY_FORMAT_NAME))?;
        writer.write_scalar(&Json::from(FORMAT_VERSION), Some(KEY_FORMAT_VERSION))?;
        writer.begin_object(Some(KEY_DATA))?;
        writer.write_scalar(&Json::from(store.name()), Some(KEY_DATABASE_NAME))?;
        writer.write_scalar(&version_to_json(store.version()), Some(KEY_DATABASE_VERSION))?;

        writer.begin_array(Some(KEY_TABLES))?;
        for (table, count) in tables.iter().zip(&counts) {
            let mut descriptor = serde_json::Map::new();
            descriptor.insert(KEY_NAME.into(), Json::from(table.name.as_str()));
            descriptor.insert(KEY_SCHEMA.into(), Json::from(table.schema.as_str()));
            descriptor.insert(KEY_ROW_COUNT.into(), Json::from(*count));
            writer.write_scalar(&Json::Object(descriptor), None)?;
        }
        writer.end_array()?;

        writer.begin_array(Some(KEY_DATA))?;
        tracker.report()?;
        for table in tables {
            self.export_table(store, table, options, &mut writer, &mut tracker)
                .with_context(|| format!("table {}", table.name))?;
        }
        writer.end_array()?;
        writer.end_object()?;
        writer.end_object()?;

        tracker.finish();
        writer.finish()
    }

    fn export_table<S: TableStore>(
        &self,
        store: &mut S,
        table: &TableSchema,
        options: &ExportOptions,
        writer: &mut DatasetWriter,
        tracker: &mut ProgressTracker,
    ) -> TabledumpResult<()> {
        let span = info_span!("table", name = %table.name);
        let _enter = span.enter();

        let inbound = table.is_inbound();
        writer.begin_object(None)?;
        writer.write_scalar(&Json::from(table.name.as_str()), Some(KEY_TABLE_NAME))?;
        writer.write_scalar(&Json::Bool(inbound), Some(KEY_INBOUND))?;
        writer.begin_array(Some(KEY_ROWS))?;

        let limit = options.rows_per_chunk.max(1);
        let lease = store.lease();
        let mut last_key = None;
        let mut written = 0u64;
        loop {
            lease.renew();
            let chunk = store
                .read_chunk(&table.name, last_key.as_ref(), limit)
                .map_err(|e| export_failed(&table.name, e))?;
            let fetched = chunk.len();
            for record in chunk {
                let Some(key) = record.key else {
                    return Err(DumpError::ExportFailed {
                        table: table.name.clone(),
                        reason: "store returned a record without a key".into(),
                    }
                    .into());
                };
                let keep = options
                    .filter
                    .as_ref()
                    .map_or(true, |f| f(&table.name, &record.value, Some(&key)));
                if keep {
                    let row = if inbound {
                        self.registry.encode(&record.value)?
                    } else {
                        Json::Array(vec![
                            self.registry.encode(&key)?,
                            self.registry.encode(&record.value)?,
                        ])
                    };
                    writer.write_scalar(&row, None)?;
                    written += 1;
                }
                last_key = Some(key);
            }
            // Отфильтрованные строки тоже считаются обработанными.
            tracker.add_rows(fetched as u64);
            if fetched > 0 {
                debug!(rows = fetched, bytes = writer.bytes_written(), "Chunk written");
                tracker.report()?;
            }
            if fetched < limit {
                break;
            }
        }

        writer.end_array()?;
        writer.end_object()?;
        tracker.complete_table();
        debug!(written, "Table exported");
        Ok(())
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(Arc::new(TypeRegistry::builtin()))
    }
}

/// Ошибки хранилища становятся `ExportFailed`; отмена и ошибки значений
/// проходят как есть.
fn export_failed(
    table: &str,
    err: StackError,
) -> StackError {
    match err.status_code() {
        StatusCode::StoreIo | StatusCode::TransactionAborted => DumpError::ExportFailed {
            table: table.to_string(),
            reason: err.to_string(),
        }
        .into(),
        _ => err,
    }
}
