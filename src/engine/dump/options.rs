use std::{fmt, sync::Arc};

use super::{
    chunk::DEFAULT_FRAGMENT_BYTES,
    progress::ProgressCallback,
    tokenizer::{DEFAULT_MAX_DEPTH, DEFAULT_WINDOW_BYTES},
};
use crate::{
    config::{Settings, DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_ROWS_PER_CHUNK},
    Progress, Value,
};

/// Фильтр записей: `(таблица, значение, ключ) -> оставить ли запись`.
pub type RecordFilter = Arc<dyn Fn(&str, &Value, Option<&Value>) -> bool + Send + Sync>;

/// Параметры экспорта.
pub struct ExportOptions {
    /// Весь экспорт внутри одной read-only транзакции.
    pub include_transaction: bool,
    pub rows_per_chunk: usize,
    pub pretty_json: bool,
    /// Таблицы, которые не попадают в контейнер.
    pub skip_tables: Vec<String>,
    pub filter: Option<RecordFilter>,
    pub progress: Option<ProgressCallback>,
    /// Порог запечатывания фрагментов контейнера.
    pub fragment_bytes: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_transaction: true,
            rows_per_chunk: DEFAULT_ROWS_PER_CHUNK,
            pretty_json: false,
            skip_tables: Vec::new(),
            filter: None,
            progress: None,
            fragment_bytes: DEFAULT_FRAGMENT_BYTES,
        }
    }
}

impl ExportOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            rows_per_chunk: settings.rows_per_chunk,
            pretty_json: settings.pretty_json,
            fragment_bytes: settings.sink_fragment_bytes,
            ..Default::default()
        }
    }

    pub fn without_transaction(mut self) -> Self {
        self.include_transaction = false;
        self
    }

    pub fn rows_per_chunk(
        mut self,
        rows: usize,
    ) -> Self {
        self.rows_per_chunk = rows;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.pretty_json = true;
        self
    }

    pub fn skip_table(
        mut self,
        table: impl Into<String>,
    ) -> Self {
        self.skip_tables.push(table.into());
        self
    }

    pub fn filter<F>(
        mut self,
        filter: F,
    ) -> Self
    where
        F: Fn(&str, &Value, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn progress<F>(
        mut self,
        callback: F,
    ) -> Self
    where
        F: FnMut(&Progress) -> bool + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for ExportOptions {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ExportOptions")
            .field("include_transaction", &self.include_transaction)
            .field("rows_per_chunk", &self.rows_per_chunk)
            .field("pretty_json", &self.pretty_json)
            .field("skip_tables", &self.skip_tables)
            .field("filter", &self.filter.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Параметры импорта и политика согласования схем.
pub struct ImportOptions {
    /// Все записи внутри одной read-write транзакции.
    pub include_transaction: bool,
    /// Пропускать таблицы, которых нет в приёмнике, вместо ошибки.
    pub accept_missing_tables: bool,
    pub accept_version_diff: bool,
    pub accept_name_diff: bool,
    pub accept_changed_primary_key: bool,
    /// Upsert вместо insert-only.
    pub overwrite_values: bool,
    pub clear_tables_before_import: bool,
    pub skip_tables: Vec<String>,
    /// Пропускать записи, которые не декодируются, вместо ошибки.
    pub skip_invalid_records: bool,
    /// Байт источника на одну пакетную запись.
    pub chunk_size_bytes: usize,
    pub window_bytes: usize,
    /// Предельная глубина вложенности JSON в контейнере.
    pub max_depth: usize,
    pub filter: Option<RecordFilter>,
    pub progress: Option<ProgressCallback>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            include_transaction: true,
            accept_missing_tables: false,
            accept_version_diff: false,
            accept_name_diff: false,
            accept_changed_primary_key: false,
            overwrite_values: false,
            clear_tables_before_import: false,
            skip_tables: Vec::new(),
            skip_invalid_records: false,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            window_bytes: DEFAULT_WINDOW_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
            filter: None,
            progress: None,
        }
    }
}

impl ImportOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chunk_size_bytes: settings.chunk_size_bytes,
            window_bytes: settings.source_window_bytes,
            max_depth: settings.max_depth,
            ..Default::default()
        }
    }

    /// Принимать любые расхождения схемы.
    pub fn lenient_schema(mut self) -> Self {
        self.accept_missing_tables = true;
        self.accept_version_diff = true;
        self.accept_name_diff = true;
        self.accept_changed_primary_key = true;
        self
    }

    pub fn without_transaction(mut self) -> Self {
        self.include_transaction = false;
        self
    }

    pub fn overwrite(mut self) -> Self {
        self.overwrite_values = true;
        self
    }

    pub fn clear_before_import(mut self) -> Self {
        self.clear_tables_before_import = true;
        self
    }

    pub fn skip_table(
        mut self,
        table: impl Into<String>,
    ) -> Self {
        self.skip_tables.push(table.into());
        self
    }

    pub fn skip_invalid(mut self) -> Self {
        self.skip_invalid_records = true;
        self
    }

    pub fn chunk_size_bytes(
        mut self,
        bytes: usize,
    ) -> Self {
        self.chunk_size_bytes = bytes;
        self
    }

    pub fn window_bytes(
        mut self,
        bytes: usize,
    ) -> Self {
        self.window_bytes = bytes;
        self
    }

    pub fn max_depth(
        mut self,
        depth: usize,
    ) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn filter<F>(
        mut self,
        filter: F,
    ) -> Self
    where
        F: Fn(&str, &Value, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn progress<F>(
        mut self,
        callback: F,
    ) -> Self
    where
        F: FnMut(&Progress) -> bool + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for ImportOptions {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("include_transaction", &self.include_transaction)
            .field("accept_missing_tables", &self.accept_missing_tables)
            .field("accept_version_diff", &self.accept_version_diff)
            .field("accept_name_diff", &self.accept_name_diff)
            .field("accept_changed_primary_key", &self.accept_changed_primary_key)
            .field("overwrite_values", &self.overwrite_values)
            .field("clear_tables_before_import", &self.clear_tables_before_import)
            .field("skip_tables", &self.skip_tables)
            .field("skip_invalid_records", &self.skip_invalid_records)
            .field("chunk_size_bytes", &self.chunk_size_bytes)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
