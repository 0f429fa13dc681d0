//! Потоковый экспорт и импорт табличных баз данных в JSON-контейнер.
//!
//! Основные точки входа: [`Exporter::export`], [`Importer::import`],
//! [`Importer::import_new`] и [`read_header`]. Хранилище подключается через
//! трейт [`TableStore`]; [`InMemoryStore`] служит эталонной реализацией.

/// Настройки, загружаемые из окружения.
pub mod config;
/// Модель значений и ключей записей.
pub mod database;
/// Хранилище таблиц, схема и формат контейнера.
pub mod engine;
/// Логирование (форматы, фильтры, файловый вывод).
pub mod logging;

// -----------------------------------------------------------------------------
//  Часто используемые публичные типы
// -----------------------------------------------------------------------------

pub use config::Settings;
pub use database::{RecordKey, TypedArrayKind, Value};
pub use engine::{
    read_header, ChunkSink, ChunkSource, Container, DatabaseHeader, ExportOptions, Exporter,
    FileSource, ImportOptions, ImportSummary, Importer, InMemoryStore, KeyPath, Progress,
    ProgressCallback, Record, RecordFilter, TableDescriptor, TableSchema, TableStore, Token,
    Tokenizer, TransactionLease, TransactionMode, TypeRegistry, TypeTag,
};
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
pub use tabledump_error::{DumpError, SchemaMismatch, StackError, StatusCode, TabledumpResult};
