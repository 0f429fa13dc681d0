//! Заголовок контейнера: имя и версия формата, имя и версия базы,
//! дескрипторы таблиц.

use serde::Serialize;
use serde_json::Value as Json;
use tabledump_error::{DumpError, TabledumpResult};

use super::{
    chunk::ChunkSource,
    tags::{
        FORMAT_NAME, FORMAT_VERSION, KEY_DATA, KEY_DATABASE_NAME, KEY_DATABASE_VERSION,
        KEY_FORMAT_NAME, KEY_FORMAT_VERSION, KEY_NAME, KEY_ROW_COUNT, KEY_SCHEMA, KEY_TABLES,
    },
    tokenizer::{Token, Tokenizer},
};

/// Описание одной таблицы в контейнере.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub name: String,
    pub schema: String,
    /// Снимается до начала секции данных и позже не уточняется.
    pub row_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHeader {
    pub format_name: String,
    pub format_version: u64,
    pub database_name: String,
    pub database_version: f64,
    pub tables: Vec<TableDescriptor>,
}

impl DatabaseHeader {
    pub fn table(
        &self,
        name: &str,
    ) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Версия базы как JSON-число; целые версии пишутся без дробной части.
pub fn version_to_json(version: f64) -> Json {
    if version.fract() == 0.0 && version.abs() < 9_007_199_254_740_992.0 {
        Json::from(version as i64)
    } else {
        serde_json::Number::from_f64(version)
            .map(Json::Number)
            .unwrap_or(Json::Null)
    }
}

/// Читает только заголовок и дескрипторы таблиц, не трогая строки.
pub fn read_header<S: ChunkSource>(source: S) -> TabledumpResult<DatabaseHeader> {
    let mut tokenizer = Tokenizer::new(source);
    let (header, _) = parse_header(&mut tokenizer)?;
    Ok(header)
}

fn malformed(reason: impl Into<String>) -> tabledump_error::StackError {
    DumpError::MalformedContainer {
        reason: reason.into(),
    }
    .into()
}

#[derive(Default)]
struct Partial {
    format_name: Option<String>,
    format_version: Option<u64>,
    database_name: Option<String>,
    database_version: Option<f64>,
    tables: Option<Vec<TableDescriptor>>,
}

impl Partial {
    fn complete(self) -> TabledumpResult<DatabaseHeader> {
        let format_name = self
            .format_name
            .ok_or_else(|| malformed(format!("missing '{KEY_FORMAT_NAME}'")))?;
        if format_name != FORMAT_NAME {
            return Err(malformed(format!(
                "unexpected format '{format_name}', expected '{FORMAT_NAME}'"
            )));
        }
        let format_version = self
            .format_version
            .ok_or_else(|| malformed(format!("missing '{KEY_FORMAT_VERSION}'")))?;
        if format_version == 0 || format_version > FORMAT_VERSION {
            return Err(malformed(format!(
                "unsupported {KEY_FORMAT_VERSION} {format_version}"
            )));
        }
        Ok(DatabaseHeader {
            format_name,
            format_version,
            database_name: self
                .database_name
                .ok_or_else(|| malformed(format!("missing '{KEY_DATABASE_NAME}'")))?,
            database_version: self
                .database_version
                .ok_or_else(|| malformed(format!("missing '{KEY_DATABASE_VERSION}'")))?,
            tables: self
                .tables
                .ok_or_else(|| malformed(format!("missing '{KEY_TABLES}'")))?,
        })
    }
}

/// Разбирает заголовок. Возвращает `true` во втором элементе, если
/// токенизатор остановлен прямо перед значением секции `data.data`.
pub(crate) fn parse_header<S: ChunkSource>(
    tokenizer: &mut Tokenizer<S>
) -> TabledumpResult<(DatabaseHeader, bool)> {
    expect(tokenizer, Token::ObjectStart, "container root")?;
    let mut partial = Partial::default();

    loop {
        match tokenizer.next()? {
            Some(Token::Key(key)) => match key.as_str() {
                KEY_FORMAT_NAME => partial.format_name = Some(read_string(tokenizer, &key)?),
                KEY_FORMAT_VERSION => {
                    partial.format_version = Some(
                        tokenizer
                            .read_value()?
                            .as_u64()
                            .ok_or_else(|| malformed(format!("'{key}' must be an integer")))?,
                    )
                }
                KEY_DATA => {
                    expect(tokenizer, Token::ObjectStart, "data section")?;
                    if parse_database(tokenizer, &mut partial)? {
                        return Ok((partial.complete()?, true));
                    }
                }
                _ => tokenizer.skip_value()?,
            },
            Some(Token::ObjectEnd) => return Ok((partial.complete()?, false)),
            other => return Err(malformed(format!("unexpected token {other:?} in container root"))),
        }
    }
}

/// Читает свойства объекта `data` до ключа `data` (строки таблиц).
fn parse_database<S: ChunkSource>(
    tokenizer: &mut Tokenizer<S>,
    partial: &mut Partial,
) -> TabledumpResult<bool> {
    loop {
        match tokenizer.next()? {
            Some(Token::Key(key)) => match key.as_str() {
                KEY_DATABASE_NAME => partial.database_name = Some(read_string(tokenizer, &key)?),
                KEY_DATABASE_VERSION => {
                    partial.database_version = Some(
                        tokenizer
                            .read_value()?
                            .as_f64()
                            .ok_or_else(|| malformed(format!("'{key}' must be a number")))?,
                    )
                }
                KEY_TABLES => partial.tables = Some(parse_descriptors(tokenizer.read_value()?)?),
                KEY_DATA => return Ok(true),
                _ => tokenizer.skip_value()?,
            },
            Some(Token::ObjectEnd) => return Ok(false),
            other => return Err(malformed(format!("unexpected token {other:?} in data section"))),
        }
    }
}

fn parse_descriptors(value: Json) -> TabledumpResult<Vec<TableDescriptor>> {
    let Json::Array(items) = value else {
        return Err(malformed(format!("'{KEY_TABLES}' must be an array")));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let name = item.get(KEY_NAME).and_then(Json::as_str);
            let schema = item.get(KEY_SCHEMA).and_then(Json::as_str);
            let row_count = item.get(KEY_ROW_COUNT).and_then(Json::as_u64);
            match (name, schema, row_count) {
                (Some(name), Some(schema), Some(row_count)) => Ok(TableDescriptor {
                    name: name.to_string(),
                    schema: schema.to_string(),
                    row_count,
                }),
                _ => Err(malformed(format!("table descriptor #{i} is incomplete"))),
            }
        })
        .collect()
}

fn read_string<S: ChunkSource>(
    tokenizer: &mut Tokenizer<S>,
    key: &str,
) -> TabledumpResult<String> {
    match tokenizer.read_value()? {
        Json::String(s) => Ok(s),
        _ => Err(malformed(format!("'{key}' must be a string"))),
    }
}

pub(crate) fn expect<S: ChunkSource>(
    tokenizer: &mut Tokenizer<S>,
    expected: Token,
    what: &str,
) -> TabledumpResult<()> {
    match tokenizer.next()? {
        Some(token) if token == expected => Ok(()),
        other => Err(malformed(format!(
            "expected {expected:?} for {what}, found {other:?}"
        ))),
    }
}
