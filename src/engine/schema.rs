use serde::{Deserialize, Serialize};

use crate::Value;

/// Путь первичного ключа таблицы.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPath {
    /// Внешний ключ: хранится отдельно от значения.
    Outbound,
    /// Ключ: поле значения (допускается путь через точку).
    Single(String),
    /// Составной ключ из нескольких полей.
    Compound(Vec<String>),
}

/// Описание таблицы: имя и строка схемы вида `"++id, name, [a+b]"`.
///
/// Первая компонента строки: первичный ключ:
/// - `++id`: поле `id`, автоинкремент;
/// - `id`: поле `id`;
/// - `++`: внешний автоинкрементный ключ;
/// - пусто: внешний ключ, задаваемый вызывающим;
/// - `[a+b]`: составной ключ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub schema: String,
    pub key_path: KeyPath,
    pub auto_increment: bool,
}

impl TableSchema {
    pub fn new(
        name: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        let schema = schema.into();
        let (key_path, auto_increment) = parse_primary_key(primary_key_spec(&schema));
        Self {
            name: name.into(),
            schema,
            key_path,
            auto_increment,
        }
    }

    /// Первая компонента строки схемы без пробелов.
    pub fn primary_key_spec(&self) -> &str {
        primary_key_spec(&self.schema)
    }

    /// Лежит ли ключ внутри значения.
    pub fn is_inbound(&self) -> bool {
        !matches!(self.key_path, KeyPath::Outbound)
    }

    /// Извлекает ключ из значения для inbound-таблиц.
    pub fn extract_key(
        &self,
        value: &Value,
    ) -> Option<Value> {
        match &self.key_path {
            KeyPath::Outbound => None,
            KeyPath::Single(path) => value.get_path(path).cloned(),
            KeyPath::Compound(paths) => paths
                .iter()
                .map(|p| value.get_path(p).cloned())
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

fn primary_key_spec(schema: &str) -> &str {
    schema.split(',').next().unwrap_or_default().trim()
}

fn parse_primary_key(spec: &str) -> (KeyPath, bool) {
    let (spec, auto) = match spec.strip_prefix("++") {
        Some(rest) => (rest, true),
        None => (spec, false),
    };
    let spec = spec.trim_start_matches(['&', '*']).trim();
    let path = if spec.is_empty() {
        KeyPath::Outbound
    } else if let Some(inner) = spec.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        KeyPath::Compound(inner.split('+').map(|p| p.trim().to_string()).collect())
    } else {
        KeyPath::Single(spec.to_string())
    };
    (path, auto)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primary_keys() {
        let cases = [
            ("++id, name", KeyPath::Single("id".into()), true),
            ("id", KeyPath::Single("id".into()), false),
            ("++", KeyPath::Outbound, true),
            ("", KeyPath::Outbound, false),
            (", name", KeyPath::Outbound, false),
            ("[a+b], c", KeyPath::Compound(vec!["a".into(), "b".into()]), false),
            ("&email", KeyPath::Single("email".into()), false),
        ];
        for (schema, path, auto) in cases {
            let table = TableSchema::new("t", schema);
            assert_eq!(table.key_path, path, "schema {schema:?}");
            assert_eq!(table.auto_increment, auto, "schema {schema:?}");
        }
    }

    #[test]
    fn test_primary_key_spec_is_first_component() {
        assert_eq!(TableSchema::new("t", " ++id ,name").primary_key_spec(), "++id");
        assert_eq!(TableSchema::new("t", "").primary_key_spec(), "");
    }

    #[test]
    fn test_extract_key() {
        let value = Value::object([
            ("a", Value::Int(1)),
            ("meta", Value::object([("b", Value::from("x"))])),
        ]);
        let compound = TableSchema::new("t", "[a+meta.b]");
        assert_eq!(
            compound.extract_key(&value),
            Some(Value::Array(vec![Value::Int(1), Value::from("x")]))
        );
        assert_eq!(TableSchema::new("t", "id").extract_key(&value), None);
        assert_eq!(TableSchema::new("t", "++").extract_key(&value), None);
    }
}
