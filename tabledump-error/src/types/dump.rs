use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки движка экспорта/импорта.
///
/// Каждая операция завершается либо успехом, либо ровно одной из этих
/// ошибок (возможно, обёрнутой в `StackError` с контекстом).
#[derive(Debug, Clone, Error)]
pub enum DumpError {
    /// Неверный заголовок контейнера: имя формата, версия, структура.
    #[error("Malformed container: {reason}")]
    MalformedContainer { reason: String },

    /// Несогласованное расхождение схемы источника и приёмника.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(#[from] SchemaMismatch),

    /// Тег типа отсутствует в реестре (чужой или более новый формат).
    #[error("Unknown type tag '{tag}'")]
    UnknownTypeTag { tag: String },

    /// Полезная нагрузка тега не соответствует его формату.
    #[error("Invalid payload for type tag '{tag}': {reason}")]
    InvalidPayload { tag: String, reason: String },

    /// Значение принципиально не экспортируется (секретный ключ).
    #[error("Value of type '{type_name}' is not exportable")]
    NonExportableType { type_name: String },

    /// Ошибка хранилища таблиц, пробрасывается без повторов.
    #[error("Store I/O error{}: {reason}", table_suffix(.table))]
    StoreIo {
        table: Option<String>,
        reason: String,
    },

    /// Операция отменена через progress callback.
    #[error("Operation cancelled")]
    Cancelled,

    /// Транзакция завершилась до окончания операции.
    #[error("Transaction aborted: {reason}")]
    TransactionAborted { reason: String },

    /// Синтаксическая ошибка JSON.
    #[error("Malformed JSON at byte {offset}: {reason}")]
    MalformedJson { reason: String, offset: u64 },

    /// Чтение из хранилища во время экспорта завершилось ошибкой.
    #[error("Export failed for table '{table}': {reason}")]
    ExportFailed { table: String, reason: String },

    /// Отдельная запись не декодируется (структура JSON при этом корректна).
    #[error("Invalid record in table '{table}': {reason}")]
    InvalidRecord { table: String, reason: String },

    /// Нарушена последовательность вызовов `DatasetWriter`.
    #[error("Invalid writer state: {reason}")]
    InvalidWriterState { reason: String },
}

/// Расхождения схемы; по одному варианту на флаг согласования импорта.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaMismatch {
    #[error("table '{table}' does not exist in the destination")]
    MissingTable { table: String },

    #[error("database version differs: destination is {current}, container is {found}")]
    VersionDiff { current: String, found: String },

    #[error("database name differs: destination is '{current}', container is '{found}'")]
    NameDiff { current: String, found: String },

    #[error(
        "primary key differs for table '{table}': destination '{current}', container '{found}'"
    )]
    ChangedPrimaryKey {
        table: String,
        current: String,
        found: String,
    },
}

fn table_suffix(table: &Option<String>) -> String {
    match table {
        Some(t) => format!(" in table '{t}'"),
        None => String::new(),
    }
}

impl DumpError {
    /// Ошибка хранилища без привязки к таблице.
    pub fn store(reason: impl Into<String>) -> Self {
        Self::StoreIo {
            table: None,
            reason: reason.into(),
        }
    }

    /// Ошибка хранилища для конкретной таблицы.
    pub fn store_table(
        table: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StoreIo {
            table: Some(table.into()),
            reason: reason.into(),
        }
    }

    /// Синтаксическая ошибка JSON на заданном смещении.
    pub fn json(
        reason: impl Into<String>,
        offset: u64,
    ) -> Self {
        Self::MalformedJson {
            reason: reason.into(),
            offset,
        }
    }

    /// Можно ли пропустить запись, вызвавшую ошибку, и продолжить импорт.
    ///
    /// Структурные ошибки (JSON, заголовок) никогда не пропускаются.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            Self::UnknownTypeTag { .. } | Self::InvalidPayload { .. } | Self::InvalidRecord { .. }
        )
    }
}

impl ErrorExt for DumpError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedContainer { .. } => StatusCode::MalformedContainer,
            Self::SchemaMismatch(_) => StatusCode::SchemaMismatch,
            Self::UnknownTypeTag { .. } => StatusCode::UnknownTypeTag,
            Self::InvalidPayload { .. } => StatusCode::DecodingError,
            Self::NonExportableType { .. } => StatusCode::NonExportable,
            Self::StoreIo { .. } => StatusCode::StoreIo,
            Self::Cancelled => StatusCode::Cancelled,
            Self::TransactionAborted { .. } => StatusCode::TransactionAborted,
            Self::MalformedJson { .. } => StatusCode::MalformedJson,
            Self::ExportFailed { .. } => StatusCode::ExportFailed,
            Self::InvalidRecord { .. } => StatusCode::DecodingError,
            Self::InvalidWriterState { .. } => StatusCode::InvalidWriterState,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
