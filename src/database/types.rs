use std::collections::BTreeMap;

use bytes::Bytes;

/// Значение записи таблицы.
///
/// Помимо обычных JSON-значений хранит «экзотические» типы, у которых нет
/// прямого представления в JSON: даты, бинарные буферы, большие бинарные
/// объекты, типизированные массивы, Map/Set, регулярные выражения, большие
/// целые и нечисловые float. Такие значения кодируются тегами реестра
/// [`TypeRegistry`](crate::engine::dump::TypeRegistry).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Отсутствующее значение (отличается от `Null`).
    Undefined,
    /// `null`.
    Null,
    Bool(bool),
    /// Целое число, помещающееся в i64.
    Int(i64),
    /// Число с плавающей точкой, в т.ч. `NaN` и бесконечности.
    Float(f64),
    /// Большое целое в десятичной записи (например, `-12345678901234567890`).
    BigInt(String),
    Str(String),
    /// Момент времени в миллисекундах от Unix epoch. `NaN`: невалидная дата.
    Date(f64),
    /// Бинарный буфер.
    Bytes(Bytes),
    /// Большой бинарный объект с MIME-типом.
    Blob { mime: String, data: Bytes },
    /// Типизированный массив: вид элементов и сырые байты (little-endian).
    TypedArray { kind: TypedArrayKind, data: Bytes },
    /// Упорядоченная последовательность.
    Array(Vec<Value>),
    /// Отображение с уникальными строковыми ключами.
    Object(BTreeMap<String, Value>),
    /// Отображение с произвольными ключами, порядок вставки сохраняется.
    Map(Vec<(Value, Value)>),
    /// Множество, порядок вставки сохраняется.
    Set(Vec<Value>),
    RegExp { source: String, flags: String },
    /// Неизвлекаемый секретный ключ. Никогда не экспортируется.
    CryptoKey { algorithm: String },
}

/// Вид элементов типизированного массива.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypedArrayKind {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
}

impl TypedArrayKind {
    pub const ALL: [TypedArrayKind; 11] = [
        Self::Int8,
        Self::Uint8,
        Self::Uint8Clamped,
        Self::Int16,
        Self::Uint16,
        Self::Int32,
        Self::Uint32,
        Self::Float32,
        Self::Float64,
        Self::BigInt64,
        Self::BigUint64,
    ];

    /// Имя в формате контейнера.
    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "Int8Array",
            Self::Uint8 => "Uint8Array",
            Self::Uint8Clamped => "Uint8ClampedArray",
            Self::Int16 => "Int16Array",
            Self::Uint16 => "Uint16Array",
            Self::Int32 => "Int32Array",
            Self::Uint32 => "Uint32Array",
            Self::Float32 => "Float32Array",
            Self::Float64 => "Float64Array",
            Self::BigInt64 => "BigInt64Array",
            Self::BigUint64 => "BigUint64Array",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Размер элемента в байтах.
    pub fn element_size(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 | Self::Uint8Clamped => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Float64 | Self::BigInt64 | Self::BigUint64 => 8,
        }
    }
}

impl Value {
    /// Собирает `Value::Object` из пар ключ-значение.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Короткое имя типа для сообщений об ошибках.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::BigInt(_) => "bigint",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Bytes(_) => "bytes",
            Value::Blob { .. } => "blob",
            Value::TypedArray { .. } => "typedarray",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::RegExp { .. } => "regexp",
            Value::CryptoKey { .. } => "cryptokey",
        }
    }

    /// Поле объекта по имени.
    pub fn get(
        &self,
        field: &str,
    ) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(field),
            _ => None,
        }
    }

    /// Значение по пути через точку (`"address.city"`).
    pub fn get_path(
        &self,
        path: &str,
    ) -> Option<&Value> {
        path.split('.')
            .try_fold(self, |current, segment| current.get(segment))
    }

    /// Записывает значение по пути через точку, создавая промежуточные
    /// объекты. Возвращает `false`, если на пути встретился не-объект.
    pub fn set_path(
        &mut self,
        path: &str,
        value: Value,
    ) -> bool {
        let mut current = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Value::Object(map) = current else {
                return false;
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value);
                return true;
            }
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(BTreeMap::new()));
        }
        false
    }

    /// Представление значения как обычного JSON-скаляра, если оно возможно
    /// без тега.
    pub fn as_plain_scalar(&self) -> Option<serde_json::Value> {
        match self {
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Int(i) => Some(serde_json::Value::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number),
            Value::Str(s) => Some(serde_json::Value::String(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}
