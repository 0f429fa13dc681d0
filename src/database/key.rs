use std::cmp::Ordering;

use tabledump_error::DumpError;

use super::Value;

/// Первичный ключ записи с полным порядком.
///
/// Допустимые ключи: числа, даты, строки, бинарные буферы и массивы ключей.
/// Порядок между типами: число < дата < строка < бинарный буфер < массив.
#[derive(Clone, Debug)]
pub struct RecordKey(Value);

impl RecordKey {
    /// Проверяет, что значение может быть ключом.
    pub fn new(value: Value) -> Result<Self, DumpError> {
        if is_valid_key(&value) {
            Ok(Self(value))
        } else {
            Err(DumpError::InvalidRecord {
                table: String::new(),
                reason: format!("value of type {} cannot be a key", value.type_name()),
            })
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

fn is_valid_key(value: &Value) -> bool {
    match value {
        Value::Int(_) | Value::Str(_) | Value::Bytes(_) => true,
        Value::Float(f) | Value::Date(f) => !f.is_nan(),
        Value::Array(items) => items.iter().all(is_valid_key),
        _ => false,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Int(_) | Value::Float(_) => 0,
        Value::Date(_) => 1,
        Value::Str(_) => 2,
        Value::Bytes(_) => 3,
        _ => 4,
    }
}

fn compare(
    a: &Value,
    b: &Value,
) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Int(x), Value::Float(y)) => compare_int_float(*x, *y),
        (Value::Float(x), Value::Int(y)) => compare_int_float(*y, *x).reverse(),
        (Value::Float(x), Value::Float(y)) | (Value::Date(x), Value::Date(y)) => compare_floats(*x, *y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                match compare(l, r) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Числовое сравнение, в котором `-0.0 == 0.0`.
fn compare_floats(
    x: f64,
    y: f64,
) -> Ordering {
    x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y))
}

/// Точное сравнение целого с дробным без потери разрядов выше 2^53.
fn compare_int_float(
    i: i64,
    f: f64,
) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return (i as f64).total_cmp(&f);
    }
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => compare_floats(whole, f),
        other => other,
    }
}

impl PartialEq for RecordKey {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RecordKey {}

impl PartialOrd for RecordKey {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordKey {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        compare(&self.0, &other.0)
    }
}
