use std::{collections::BTreeMap, ops::Bound, time::Duration};

use tabledump_error::{DumpError, TabledumpResult};
use tracing::{debug, warn};

use super::{KeyPath, Record, TableSchema, TableStore, TransactionLease, TransactionMode};
use crate::{RecordKey, Value};

/// Эталонное хранилище таблиц в памяти.
///
/// Строки каждой таблицы упорядочены по ключу. Транзакция чтения-записи
/// снимает снимок всех таблиц и восстанавливает его при откате. Если задан
/// `idle_timeout`, транзакция прерывается, когда аренда не продлевалась
/// дольше этого времени.
#[derive(Debug)]
pub struct InMemoryStore {
    name: String,
    version: f64,
    tables: Vec<MemoryTable>,
    tx: Option<Transaction>,
    lease: TransactionLease,
    idle_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: BTreeMap<RecordKey, Value>,
    next_auto: i64,
}

#[derive(Debug)]
struct Transaction {
    mode: TransactionMode,
    scope: Vec<String>,
    snapshot: Option<Vec<MemoryTable>>,
    aborted: Option<String>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl InMemoryStore {
    pub fn new(
        name: impl Into<String>,
        version: f64,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            tables: Vec::new(),
            tx: None,
            lease: TransactionLease::new(),
            idle_timeout: None,
        }
    }

    /// Хранилище с уже объявленными таблицами.
    pub fn with_tables(
        name: impl Into<String>,
        version: f64,
        tables: impl IntoIterator<Item = TableSchema>,
    ) -> Self {
        let mut store = Self::new(name, version);
        for schema in tables {
            store.create_table(schema);
        }
        store
    }

    /// Объявляет таблицу. Повторное объявление заменяет схему и очищает
    /// строки.
    pub fn create_table(
        &mut self,
        schema: TableSchema,
    ) -> &mut Self {
        let table = MemoryTable {
            schema,
            rows: BTreeMap::new(),
            next_auto: 1,
        };
        match self.position(&table.schema.name) {
            Some(i) => self.tables[i] = table,
            None => self.tables.push(table),
        }
        self
    }

    pub fn set_idle_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) {
        self.idle_timeout = timeout;
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Значение по ключу; удобно в тестах.
    pub fn get(
        &self,
        table: &str,
        key: &Value,
    ) -> Option<&Value> {
        let key = RecordKey::new(key.clone()).ok()?;
        let i = self.position(table)?;
        self.tables[i].rows.get(&key)
    }

    /// Все записи таблицы в порядке ключей.
    pub fn rows(
        &self,
        table: &str,
    ) -> Vec<Record> {
        self.position(table)
            .map(|i| {
                self.tables[i]
                    .rows
                    .iter()
                    .map(|(k, v)| Record::new(Some(k.value().clone()), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn position(
        &self,
        table: &str,
    ) -> Option<usize> {
        self.tables.iter().position(|t| t.schema.name == table)
    }

    fn table_index(
        &self,
        table: &str,
    ) -> TabledumpResult<usize> {
        self.position(table)
            .ok_or_else(|| DumpError::store_table(table, "no such table").into())
    }

    /// Проверяет аренду и состояние транзакции перед операцией.
    fn touch(&mut self) -> TabledumpResult<()> {
        let Some(tx) = &mut self.tx else {
            return Ok(());
        };
        if let Some(reason) = &tx.aborted {
            return Err(DumpError::TransactionAborted {
                reason: reason.clone(),
            }
            .into());
        }
        if let Some(timeout) = self.idle_timeout {
            let idle = self.lease.idle_for();
            if idle > timeout {
                let reason = format!("transaction idle for {idle:?}, limit {timeout:?}");
                warn!(store = %self.name, %reason, "Transaction aborted");
                if let Some(snapshot) = tx.snapshot.take() {
                    self.tables = snapshot;
                }
                tx.aborted = Some(reason.clone());
                return Err(DumpError::TransactionAborted { reason }.into());
            }
        }
        self.lease.renew();
        Ok(())
    }

    fn check_writable(
        &self,
        table: &str,
    ) -> TabledumpResult<()> {
        match &self.tx {
            Some(tx) if tx.mode == TransactionMode::ReadOnly => Err(DumpError::store_table(
                table,
                "write attempted in a read-only transaction",
            )
            .into()),
            Some(tx) if !tx.scope.iter().any(|t| t == table) => Err(DumpError::store_table(
                table,
                "table is outside the transaction scope",
            )
            .into()),
            _ => Ok(()),
        }
    }
}

impl MemoryTable {
    /// Вычисляет ключ записи, при необходимости назначая автоинкремент из
    /// `next_auto`. Сама таблица не меняется.
    fn resolve_key(
        &self,
        record: &mut Record,
        next_auto: &mut i64,
    ) -> Result<RecordKey, String> {
        let key = match &self.schema.key_path {
            KeyPath::Outbound => record.key.take(),
            _ => self.schema.extract_key(&record.value),
        };
        let key = match key {
            Some(key) => key,
            None if self.schema.auto_increment => {
                let key = Value::Int(*next_auto);
                if let KeyPath::Single(path) = &self.schema.key_path {
                    if !record.value.set_path(path, key.clone()) {
                        return Err(format!("cannot set key path '{path}' on a non-object value"));
                    }
                }
                key
            }
            None => return Err("record has no key and the table has no auto-increment".into()),
        };
        let key = RecordKey::new(key).map_err(|e| e.to_string())?;
        if self.schema.auto_increment {
            *next_auto = (*next_auto).max(auto_increment_after(&key));
        }
        Ok(key)
    }
}

fn auto_increment_after(key: &RecordKey) -> i64 {
    match key.value() {
        Value::Int(i) => i.saturating_add(1),
        Value::Float(f) if f.is_finite() => (f.floor() as i64).saturating_add(1),
        _ => i64::MIN,
    }
}

////////////////////////////////////////////////////////////////////////////////
// Реализация TableStore
////////////////////////////////////////////////////////////////////////////////

impl TableStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> f64 {
        self.version
    }

    fn list_tables(&self) -> TabledumpResult<Vec<TableSchema>> {
        Ok(self.tables.iter().map(|t| t.schema.clone()).collect())
    }

    fn count_rows(
        &self,
        table: &str,
    ) -> TabledumpResult<u64> {
        let i = self.table_index(table)?;
        Ok(self.tables[i].rows.len() as u64)
    }

    fn read_chunk(
        &self,
        table: &str,
        after: Option<&Value>,
        limit: usize,
    ) -> TabledumpResult<Vec<Record>> {
        if let Some(tx) = &self.tx {
            if let Some(reason) = &tx.aborted {
                return Err(DumpError::TransactionAborted {
                    reason: reason.clone(),
                }
                .into());
            }
        }
        let i = self.table_index(table)?;
        let lower = match after {
            Some(key) => Bound::Excluded(
                RecordKey::new(key.clone()).map_err(|e| DumpError::store_table(table, e.to_string()))?,
            ),
            None => Bound::Unbounded,
        };
        self.lease.renew();
        Ok(self.tables[i]
            .rows
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| Record::new(Some(k.value().clone()), v.clone()))
            .collect())
    }

    fn bulk_write(
        &mut self,
        table: &str,
        records: Vec<Record>,
        overwrite: bool,
    ) -> TabledumpResult<()> {
        self.touch()?;
        self.check_writable(table)?;
        let i = self.table_index(table)?;

        // Порция применяется целиком или не применяется вовсе.
        let target = &self.tables[i];
        let mut next_auto = target.next_auto;
        let mut staged: BTreeMap<RecordKey, Value> = BTreeMap::new();
        let count = records.len();
        for mut record in records {
            let key = target
                .resolve_key(&mut record, &mut next_auto)
                .map_err(|reason| DumpError::store_table(table, reason))?;
            if !overwrite && (target.rows.contains_key(&key) || staged.contains_key(&key)) {
                return Err(DumpError::store_table(
                    table,
                    format!("key {:?} already exists", key.value()),
                )
                .into());
            }
            staged.insert(key, record.value);
        }
        let target = &mut self.tables[i];
        target.rows.extend(staged);
        target.next_auto = next_auto;
        debug!(table, count, overwrite, "Bulk write applied");
        Ok(())
    }

    fn clear_table(
        &mut self,
        table: &str,
    ) -> TabledumpResult<()> {
        self.touch()?;
        self.check_writable(table)?;
        let i = self.table_index(table)?;
        self.tables[i].rows.clear();
        Ok(())
    }

    fn begin_transaction(
        &mut self,
        mode: TransactionMode,
        tables: &[String],
    ) -> TabledumpResult<()> {
        if self.tx.is_some() {
            return Err(DumpError::store("a transaction is already active").into());
        }
        for table in tables {
            self.table_index(table)?;
        }
        let snapshot = match mode {
            TransactionMode::ReadWrite => Some(self.tables.clone()),
            TransactionMode::ReadOnly => None,
        };
        self.tx = Some(Transaction {
            mode,
            scope: tables.to_vec(),
            snapshot,
            aborted: None,
        });
        self.lease.renew();
        debug!(store = %self.name, ?mode, tables = tables.len(), "Transaction started");
        Ok(())
    }

    fn commit_transaction(&mut self) -> TabledumpResult<()> {
        if self.tx.is_none() {
            return Err(DumpError::store("no active transaction").into());
        }
        let touched = self.touch();
        let tx = self.tx.take();
        if let Err(err) = touched {
            if let Some(snapshot) = tx.and_then(|t| t.snapshot) {
                self.tables = snapshot;
            }
            return Err(err);
        }
        debug!(store = %self.name, "Transaction committed");
        Ok(())
    }

    fn rollback_transaction(&mut self) {
        if let Some(tx) = self.tx.take() {
            if let Some(snapshot) = tx.snapshot {
                self.tables = snapshot;
            }
            debug!(store = %self.name, "Transaction rolled back");
        }
    }

    fn lease(&self) -> TransactionLease {
        self.lease.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("default", 1.0)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
