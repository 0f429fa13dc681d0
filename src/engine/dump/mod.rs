//! Формат контейнера и потоковые экспорт/импорт.
//!
//! Контейнер: JSON-документ `{formatName, formatVersion, data: {databaseName,
//! databaseVersion, tables, data}}`, где секция строк всегда идёт последней.
//! Экспорт пишет его через [`DatasetWriter`] во фрагменты [`ChunkSink`],
//! импорт читает окнами через [`Tokenizer`], не загружая документ целиком.

pub mod chunk;
pub mod codec;
pub mod export;
pub mod header;
pub mod import;
pub mod options;
pub mod progress;
pub mod tags;
pub mod tokenizer;
pub mod writer;

pub use chunk::{ChunkSink, ChunkSource, Container, FileSource, DEFAULT_FRAGMENT_BYTES};
pub use codec::{TypeRegistry, TypeRegistryBuilder, TypeTag};
pub use export::Exporter;
pub use header::{read_header, DatabaseHeader, TableDescriptor};
pub use import::{ImportSummary, Importer};
pub use options::{ExportOptions, ImportOptions, RecordFilter};
pub use progress::{Progress, ProgressCallback, ProgressTracker};
pub use tokenizer::{Token, Tokenizer, DEFAULT_MAX_DEPTH, DEFAULT_WINDOW_BYTES};
pub use writer::DatasetWriter;
