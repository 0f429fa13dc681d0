use serde::Serialize;
use tabledump_error::{DumpError, TabledumpResult};
use tracing::debug;

/// Снимок прогресса операции.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total_tables: u64,
    pub completed_tables: u64,
    pub total_rows: u64,
    pub completed_rows: u64,
    pub done: bool,
}

/// Опрос прогресса: `false`: запрос на отмену.
pub type ProgressCallback = Box<dyn FnMut(&Progress) -> bool + Send>;

/// Учёт завершённых строк и таблиц плюс кооперативная отмена.
///
/// Счётчики только растут. Итоговый вызов с `done = true` выравнивает
/// totals по фактическим значениям, его результат игнорируется.
pub struct ProgressTracker {
    progress: Progress,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(
        total_tables: u64,
        total_rows: u64,
        callback: Option<ProgressCallback>,
    ) -> Self {
        Self {
            progress: Progress {
                total_tables,
                total_rows,
                ..Default::default()
            },
            callback,
        }
    }

    pub fn snapshot(&self) -> Progress {
        self.progress
    }

    pub fn add_rows(
        &mut self,
        rows: u64,
    ) {
        self.progress.completed_rows += rows;
    }

    pub fn complete_table(&mut self) {
        self.progress.completed_tables += 1;
    }

    /// Опрашивает callback; отказ превращается в `DumpError::Cancelled`.
    pub fn report(&mut self) -> TabledumpResult<()> {
        let Some(callback) = self.callback.as_mut() else {
            return Ok(());
        };
        if callback(&self.progress) {
            Ok(())
        } else {
            debug!(progress = ?self.progress, "Cancellation requested by progress callback");
            Err(DumpError::Cancelled.into())
        }
    }

    /// Отмечает завершение и выполняет последний вызов callback.
    pub fn finish(&mut self) -> Progress {
        self.progress.done = true;
        self.progress.total_rows = self.progress.completed_rows;
        self.progress.total_tables = self.progress.completed_tables;
        if let Some(callback) = self.callback.as_mut() {
            let _ = callback(&self.progress);
        }
        self.progress
    }
}
