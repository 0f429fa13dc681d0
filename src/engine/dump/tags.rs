//! Константы формата контейнера.
//!
//! Имена свойств верхнего уровня, заголовка и секции данных, а также ключи
//! тегированных значений. Используются в модулях `export`, `import` и
//! `codec`.

/// Значение `formatName` контейнера.
pub const FORMAT_NAME: &str = "dexie";
/// Текущая версия формата контейнера.
pub const FORMAT_VERSION: u64 = 1;

/// Свойства корня контейнера.
pub const KEY_FORMAT_NAME: &str = "formatName";
pub const KEY_FORMAT_VERSION: &str = "formatVersion";
pub const KEY_DATA: &str = "data";

/// Свойства объекта `data`.
pub const KEY_DATABASE_NAME: &str = "databaseName";
pub const KEY_DATABASE_VERSION: &str = "databaseVersion";
pub const KEY_TABLES: &str = "tables";

/// Свойства дескриптора таблицы.
pub const KEY_NAME: &str = "name";
pub const KEY_SCHEMA: &str = "schema";
pub const KEY_ROW_COUNT: &str = "rowCount";

/// Свойства секции данных таблицы.
pub const KEY_TABLE_NAME: &str = "tableName";
pub const KEY_INBOUND: &str = "inbound";
pub const KEY_ROWS: &str = "rows";

/// Ключ имени тега в тегированном значении `{"$t": ..., "$v": ...}`.
pub const TAG_KEY: &str = "$t";
/// Ключ полезной нагрузки тегированного значения.
pub const PAYLOAD_KEY: &str = "$v";

/// Имена встроенных тегов в порядке регистрации.
pub const TAG_UNDEFINED: &str = "undefined";
pub const TAG_NUMBER: &str = "number";
pub const TAG_BIGINT: &str = "bigint";
pub const TAG_DATE: &str = "date";
pub const TAG_BYTES: &str = "bytes";
pub const TAG_BLOB: &str = "blob";
pub const TAG_TYPED_ARRAY: &str = "typedarray";
pub const TAG_MAP: &str = "map";
pub const TAG_SET: &str = "set";
pub const TAG_REGEXP: &str = "regexp";
pub const TAG_OBJECT: &str = "object";
