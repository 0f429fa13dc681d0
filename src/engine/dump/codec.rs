//! Реестр тегов для значений без прямого JSON-представления.
//!
//! Кодирование рекурсивно обходит массивы и обычные объекты. Для листа
//! выбирается первый зарегистрированный тег, чей предикат совпал, и результатом
//! становится явная тегированная сумма `{"$t": имя, "$v": полезная нагрузка}`. Листья без
//! совпадений остаются обычными JSON-скалярами.
//!
//! Порядок регистрации фиксируется при построении реестра и дальше не
//! меняется. Глобального реестра нет: экземпляр передаётся в `Exporter` и
//! `Importer` явно.

use std::{collections::HashMap, fmt, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde_json::{json, Map, Value as Json};
use tabledump_error::{DumpError, TabledumpResult};

use super::tags::{
    PAYLOAD_KEY, TAG_BIGINT, TAG_BLOB, TAG_BYTES, TAG_DATE, TAG_KEY, TAG_MAP, TAG_NUMBER,
    TAG_OBJECT, TAG_REGEXP, TAG_SET, TAG_TYPED_ARRAY, TAG_UNDEFINED,
};
use crate::{TypedArrayKind, Value};

/// Пара «предикат + кодек» для одного экзотического типа.
pub trait TypeTag: Send + Sync {
    /// Имя тега в контейнере.
    fn name(&self) -> &str;

    /// Обрабатывает ли тег данное значение.
    fn matches(
        &self,
        value: &Value,
    ) -> bool;

    /// Превращает значение в обычный JSON. Вложенные значения кодируются
    /// через `registry`.
    fn encode(
        &self,
        value: &Value,
        registry: &TypeRegistry,
    ) -> TabledumpResult<Json>;

    /// Восстанавливает значение из полезной нагрузки.
    fn decode(
        &self,
        payload: Json,
        registry: &TypeRegistry,
    ) -> TabledumpResult<Value>;
}

/// Неизменяемый упорядоченный реестр тегов.
#[derive(Clone)]
pub struct TypeRegistry {
    tags: Vec<Arc<dyn TypeTag>>,
    by_name: HashMap<String, usize>,
}

/// Построитель реестра: встроенные теги, затем пользовательские.
pub struct TypeRegistryBuilder {
    tags: Vec<Arc<dyn TypeTag>>,
}

impl TypeRegistryBuilder {
    /// Добавляет тег в конец списка. Тег с уже занятым именем заменяет
    /// прежний при декодировании, но при кодировании выигрывает тот, что
    /// зарегистрирован раньше.
    pub fn with_tag<T: TypeTag + 'static>(
        mut self,
        tag: T,
    ) -> Self {
        self.tags.push(Arc::new(tag));
        self
    }

    pub fn build(self) -> TypeRegistry {
        let by_name = self
            .tags
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();
        TypeRegistry {
            tags: self.tags,
            by_name,
        }
    }
}

impl TypeRegistry {
    /// Реестр только со встроенными тегами.
    pub fn builtin() -> Self {
        Self::builder().build()
    }

    /// Построитель, уже содержащий встроенные теги.
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder {
            tags: vec![
                Arc::new(UndefinedTag),
                Arc::new(NonFiniteNumberTag),
                Arc::new(BigIntTag),
                Arc::new(DateTag),
                Arc::new(BytesTag),
                Arc::new(BlobTag),
                Arc::new(TypedArrayTag),
                Arc::new(MapTag),
                Arc::new(SetTag),
                Arc::new(RegExpTag),
                Arc::new(EscapedObjectTag),
            ],
        }
    }

    /// Имена тегов в порядке регистрации.
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name()).collect()
    }

    /// Кодирует значение в обычный JSON.
    pub fn encode(
        &self,
        value: &Value,
    ) -> TabledumpResult<Json> {
        match value {
            Value::CryptoKey { .. } => Err(DumpError::NonExportableType {
                type_name: value.type_name().to_string(),
            }
            .into()),
            Value::Array(items) => items
                .iter()
                .map(|item| self.encode(item))
                .collect::<TabledumpResult<Vec<_>>>()
                .map(Json::Array),
            Value::Object(map) if !map.contains_key(TAG_KEY) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.encode(v)?);
                }
                Ok(Json::Object(out))
            }
            leaf => self.encode_leaf(leaf),
        }
    }

    fn encode_leaf(
        &self,
        value: &Value,
    ) -> TabledumpResult<Json> {
        if let Some(tag) = self.tags.iter().find(|t| t.matches(value)) {
            let payload = tag.encode(value, self)?;
            let mut tagged = Map::with_capacity(2);
            tagged.insert(TAG_KEY.to_string(), Json::String(tag.name().to_string()));
            tagged.insert(PAYLOAD_KEY.to_string(), payload);
            return Ok(Json::Object(tagged));
        }
        value.as_plain_scalar().ok_or_else(|| {
            DumpError::NonExportableType {
                type_name: value.type_name().to_string(),
            }
            .into()
        })
    }

    /// Декодирует обычный JSON обратно в значение.
    pub fn decode(
        &self,
        plain: Json,
    ) -> TabledumpResult<Value> {
        match plain {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::Bool(b)),
            Json::Number(n) => Ok(match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Json::String(s) => Ok(Value::Str(s)),
            Json::Array(items) => items
                .into_iter()
                .map(|item| self.decode(item))
                .collect::<TabledumpResult<Vec<_>>>()
                .map(Value::Array),
            Json::Object(mut map) => match map.remove(TAG_KEY) {
                Some(Json::String(name)) => {
                    let payload = map.remove(PAYLOAD_KEY).unwrap_or(Json::Null);
                    let tag = self
                        .by_name
                        .get(&name)
                        .map(|&i| &self.tags[i])
                        .ok_or(DumpError::UnknownTypeTag { tag: name })?;
                    tag.decode(payload, self)
                }
                Some(other) => Err(DumpError::InvalidPayload {
                    tag: other.to_string(),
                    reason: "tag name must be a string".to_string(),
                }
                .into()),
                None => {
                    let mut out = std::collections::BTreeMap::new();
                    for (k, v) in map {
                        out.insert(k, self.decode(v)?);
                    }
                    Ok(Value::Object(out))
                }
            },
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("tags", &self.tag_names())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Встроенные теги
////////////////////////////////////////////////////////////////////////////////

fn invalid(
    tag: &str,
    reason: impl Into<String>,
) -> tabledump_error::StackError {
    DumpError::InvalidPayload {
        tag: tag.to_string(),
        reason: reason.into(),
    }
    .into()
}

fn encode_base64(data: &Bytes) -> Json {
    Json::String(STANDARD.encode(data))
}

fn decode_base64(
    tag: &str,
    payload: &Json,
) -> TabledumpResult<Bytes> {
    let text = payload
        .as_str()
        .ok_or_else(|| invalid(tag, "expected base64 string"))?;
    STANDARD
        .decode(text)
        .map(Bytes::from)
        .map_err(|e| invalid(tag, format!("bad base64: {e}")))
}

fn field<'a>(
    tag: &str,
    payload: &'a Json,
    name: &str,
) -> TabledumpResult<&'a Json> {
    payload
        .get(name)
        .ok_or_else(|| invalid(tag, format!("missing field '{name}'")))
}

fn str_field(
    tag: &str,
    payload: &Json,
    name: &str,
) -> TabledumpResult<String> {
    field(tag, payload, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(tag, format!("field '{name}' must be a string")))
}

struct UndefinedTag;

impl TypeTag for UndefinedTag {
    fn name(&self) -> &str {
        TAG_UNDEFINED
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::Undefined)
    }

    fn encode(
        &self,
        _value: &Value,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        Ok(Json::Null)
    }

    fn decode(
        &self,
        _payload: Json,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        Ok(Value::Undefined)
    }
}

/// `NaN`, `Infinity`, `-Infinity`: в JSON им нет места.
struct NonFiniteNumberTag;

impl TypeTag for NonFiniteNumberTag {
    fn name(&self) -> &str {
        TAG_NUMBER
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::Float(f) if !f.is_finite())
    }

    fn encode(
        &self,
        value: &Value,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        let Value::Float(f) = value else {
            return Err(invalid(TAG_NUMBER, "not a float"));
        };
        Ok(Json::String(non_finite_name(*f).to_string()))
    }

    fn decode(
        &self,
        payload: Json,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        parse_non_finite(&payload)
            .map(Value::Float)
            .ok_or_else(|| invalid(TAG_NUMBER, format!("unexpected payload {payload}")))
    }
}

fn non_finite_name(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn parse_non_finite(payload: &Json) -> Option<f64> {
    match payload.as_str()? {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

struct BigIntTag;

impl TypeTag for BigIntTag {
    fn name(&self) -> &str {
        TAG_BIGINT
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::BigInt(_))
    }

    fn encode(
        &self,
        value: &Value,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        match value {
            Value::BigInt(digits) => Ok(Json::String(digits.clone())),
            _ => Err(invalid(TAG_BIGINT, "not a bigint")),
        }
    }

    fn decode(
        &self,
        payload: Json,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        let digits = payload
            .as_str()
            .ok_or_else(|| invalid(TAG_BIGINT, "expected decimal string"))?;
        let unsigned = digits.strip_prefix('-').unwrap_or(digits);
        if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(TAG_BIGINT, format!("'{digits}' is not an integer")));
        }
        Ok(Value::BigInt(digits.to_string()))
    }
}

struct DateTag;

impl TypeTag for DateTag {
    fn name(&self) -> &str {
        TAG_DATE
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::Date(_))
    }

    fn encode(
        &self,
        value: &Value,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        let Value::Date(ms) = value else {
            return Err(invalid(TAG_DATE, "not a date"));
        };
        // Невалидная дата хранится строкой "NaN".
        Ok(serde_json::Number::from_f64(*ms)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String("NaN".to_string())))
    }

    fn decode(
        &self,
        payload: Json,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        match &payload {
            Json::Number(n) => n
                .as_f64()
                .map(Value::Date)
                .ok_or_else(|| invalid(TAG_DATE, "timestamp out of range")),
            Json::String(s) if s == "NaN" => Ok(Value::Date(f64::NAN)),
            other => Err(invalid(TAG_DATE, format!("unexpected payload {other}"))),
        }
    }
}

struct BytesTag;

impl TypeTag for BytesTag {
    fn name(&self) -> &str {
        TAG_BYTES
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::Bytes(_))
    }

    fn encode(
        &self,
        value: &Value,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        match value {
            Value::Bytes(data) => Ok(encode_base64(data)),
            _ => Err(invalid(TAG_BYTES, "not a buffer")),
        }
    }

    fn decode(
        &self,
        payload: Json,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        decode_base64(TAG_BYTES, &payload).map(Value::Bytes)
    }
}

struct BlobTag;

impl TypeTag for BlobTag {
    fn name(&self) -> &str {
        TAG_BLOB
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::Blob { .. })
    }

    fn encode(
        &self,
        value: &Value,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        match value {
            Value::Blob { mime, data } => Ok(json!({ "type": mime, "data": encode_base64(data) })),
            _ => Err(invalid(TAG_BLOB, "not a blob")),
        }
    }

    fn decode(
        &self,
        payload: Json,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        let mime = str_field(TAG_BLOB, &payload, "type")?;
        let data = decode_base64(TAG_BLOB, field(TAG_BLOB, &payload, "data")?)?;
        Ok(Value::Blob { mime, data })
    }
}

struct TypedArrayTag;

impl TypeTag for TypedArrayTag {
    fn name(&self) -> &str {
        TAG_TYPED_ARRAY
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::TypedArray { .. })
    }

    fn encode(
        &self,
        value: &Value,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        match value {
            Value::TypedArray { kind, data } => {
                Ok(json!({ "kind": kind.name(), "data": encode_base64(data) }))
            }
            _ => Err(invalid(TAG_TYPED_ARRAY, "not a typed array")),
        }
    }

    fn decode(
        &self,
        payload: Json,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        let name = str_field(TAG_TYPED_ARRAY, &payload, "kind")?;
        let kind = TypedArrayKind::from_name(&name)
            .ok_or_else(|| invalid(TAG_TYPED_ARRAY, format!("unknown kind '{name}'")))?;
        let data = decode_base64(TAG_TYPED_ARRAY, field(TAG_TYPED_ARRAY, &payload, "data")?)?;
        if data.len() % kind.element_size() != 0 {
            return Err(invalid(
                TAG_TYPED_ARRAY,
                format!(
                    "{} bytes is not a multiple of {} element size",
                    data.len(),
                    name
                ),
            ));
        }
        Ok(Value::TypedArray { kind, data })
    }
}

struct MapTag;

impl TypeTag for MapTag {
    fn name(&self) -> &str {
        TAG_MAP
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::Map(_))
    }

    fn encode(
        &self,
        value: &Value,
        registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        let Value::Map(entries) = value else {
            return Err(invalid(TAG_MAP, "not a map"));
        };
        let mut out = Vec::with_capacity(entries.len());
        for (k, v) in entries {
            out.push(Json::Array(vec![registry.encode(k)?, registry.encode(v)?]));
        }
        Ok(Json::Array(out))
    }

    fn decode(
        &self,
        payload: Json,
        registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        let Json::Array(items) = payload else {
            return Err(invalid(TAG_MAP, "expected array of entries"));
        };
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let pair = match item {
                Json::Array(pair) => <[Json; 2]>::try_from(pair).map_err(Json::Array),
                other => Err(other),
            };
            match pair {
                Ok([k, v]) => entries.push((registry.decode(k)?, registry.decode(v)?)),
                Err(other) => return Err(invalid(TAG_MAP, format!("bad entry {other}"))),
            }
        }
        Ok(Value::Map(entries))
    }
}

struct SetTag;

impl TypeTag for SetTag {
    fn name(&self) -> &str {
        TAG_SET
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::Set(_))
    }

    fn encode(
        &self,
        value: &Value,
        registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        let Value::Set(members) = value else {
            return Err(invalid(TAG_SET, "not a set"));
        };
        members
            .iter()
            .map(|m| registry.encode(m))
            .collect::<TabledumpResult<Vec<_>>>()
            .map(Json::Array)
    }

    fn decode(
        &self,
        payload: Json,
        registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        let Json::Array(items) = payload else {
            return Err(invalid(TAG_SET, "expected array of members"));
        };
        items
            .into_iter()
            .map(|m| registry.decode(m))
            .collect::<TabledumpResult<Vec<_>>>()
            .map(Value::Set)
    }
}

struct RegExpTag;

impl TypeTag for RegExpTag {
    fn name(&self) -> &str {
        TAG_REGEXP
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::RegExp { .. })
    }

    fn encode(
        &self,
        value: &Value,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        match value {
            Value::RegExp { source, flags } => Ok(json!({ "source": source, "flags": flags })),
            _ => Err(invalid(TAG_REGEXP, "not a regexp")),
        }
    }

    fn decode(
        &self,
        payload: Json,
        _registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        Ok(Value::RegExp {
            source: str_field(TAG_REGEXP, &payload, "source")?,
            flags: str_field(TAG_REGEXP, &payload, "flags")?,
        })
    }
}

/// Обычный объект, у которого есть собственное поле `"$t"`.
struct EscapedObjectTag;

impl TypeTag for EscapedObjectTag {
    fn name(&self) -> &str {
        TAG_OBJECT
    }

    fn matches(
        &self,
        value: &Value,
    ) -> bool {
        matches!(value, Value::Object(map) if map.contains_key(TAG_KEY))
    }

    fn encode(
        &self,
        value: &Value,
        registry: &TypeRegistry,
    ) -> TabledumpResult<Json> {
        let Value::Object(map) = value else {
            return Err(invalid(TAG_OBJECT, "not an object"));
        };
        let mut out = Map::with_capacity(map.len());
        for (k, v) in map {
            out.insert(k.clone(), registry.encode(v)?);
        }
        Ok(Json::Object(out))
    }

    fn decode(
        &self,
        payload: Json,
        registry: &TypeRegistry,
    ) -> TabledumpResult<Value> {
        let Json::Object(map) = payload else {
            return Err(invalid(TAG_OBJECT, "expected object"));
        };
        let mut out = std::collections::BTreeMap::new();
        for (k, v) in map {
            out.insert(k, registry.decode(v)?);
        }
        Ok(Value::Object(out))
    }
}
