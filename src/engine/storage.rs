use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tabledump_error::TabledumpResult;

use super::TableSchema;
use crate::Value;

/// Запись таблицы: необязательный ключ и значение.
///
/// При чтении ключ заполнен всегда. При записи в inbound-таблицу ключ
/// игнорируется и берётся из значения.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: Option<Value>,
    pub value: Value,
}

impl Record {
    pub fn new(
        key: Option<Value>,
        value: Value,
    ) -> Self {
        Self { key, value }
    }

    /// Запись без внешнего ключа.
    pub fn inbound(value: Value) -> Self {
        Self { key: None, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// Общая отметка последней активности открытой транзакции.
///
/// Хранилище может прервать транзакцию, если отметка не обновлялась
/// дольше допустимого. Движок продлевает аренду перед каждым чтением
/// окна источника и каждой порции хранилища.
#[derive(Debug, Clone)]
pub struct TransactionLease {
    inner: Arc<LeaseState>,
}

#[derive(Debug)]
struct LeaseState {
    last_activity: Mutex<Instant>,
    renewals: AtomicU64,
}

impl TransactionLease {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LeaseState {
                last_activity: Mutex::new(Instant::now()),
                renewals: AtomicU64::new(0),
            }),
        }
    }

    pub fn renew(&self) {
        *self.inner.last_activity.lock() = Instant::now();
        self.inner.renewals.fetch_add(1, Ordering::Relaxed);
    }

    /// Время с последнего продления.
    pub fn idle_for(&self) -> Duration {
        self.inner.last_activity.lock().elapsed()
    }

    /// Сколько раз аренда продлевалась.
    pub fn renewals(&self) -> u64 {
        self.inner.renewals.load(Ordering::Relaxed)
    }
}

impl Default for TransactionLease {
    fn default() -> Self {
        Self::new()
    }
}

/// Набор возможностей хранилища таблиц, нужный экспорту и импорту.
///
/// Ошибки хранилища возвращаются как `DumpError::StoreIo` и движком не
/// повторяются.
pub trait TableStore {
    fn name(&self) -> &str;

    fn version(&self) -> f64;

    /// Таблицы в стабильном порядке объявления.
    fn list_tables(&self) -> TabledumpResult<Vec<TableSchema>>;

    fn count_rows(
        &self,
        table: &str,
    ) -> TabledumpResult<u64>;

    /// До `limit` записей с ключом строго больше `after` в порядке
    /// возрастания ключа.
    fn read_chunk(
        &self,
        table: &str,
        after: Option<&Value>,
        limit: usize,
    ) -> TabledumpResult<Vec<Record>>;

    /// Записывает порцию. `overwrite = false`: только вставка, и
    /// существующий ключ является ошибкой.
    fn bulk_write(
        &mut self,
        table: &str,
        records: Vec<Record>,
        overwrite: bool,
    ) -> TabledumpResult<()>;

    fn clear_table(
        &mut self,
        table: &str,
    ) -> TabledumpResult<()>;

    fn begin_transaction(
        &mut self,
        mode: TransactionMode,
        tables: &[String],
    ) -> TabledumpResult<()>;

    fn commit_transaction(&mut self) -> TabledumpResult<()>;

    /// Откатывает изменения текущей транзакции. Без транзакции: no-op.
    fn rollback_transaction(&mut self);

    /// Аренда, продление которой удерживает транзакцию открытой.
    fn lease(&self) -> TransactionLease;

    /// Выполняет `f` внутри одной транзакции: фиксация при успехе, откат
    /// при любой ошибке.
    fn run_in_transaction<T, F>(
        &mut self,
        mode: TransactionMode,
        tables: &[String],
        f: F,
    ) -> TabledumpResult<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> TabledumpResult<T>,
    {
        self.begin_transaction(mode, tables)?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                self.rollback_transaction();
                Err(err)
            }
        }
    }
}
