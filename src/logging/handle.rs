use std::time::Instant;

use tracing_appender::non_blocking::WorkerGuard;

/// Удерживает фоновые писатели логов.
///
/// Пока handle жив, файловый писатель принимает события; при `shutdown()`
/// или drop буферы сбрасываются на диск.
#[derive(Default)]
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self { file_guard }
    }

    /// Включён ли файловый вывод.
    pub fn has_file_output(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Сбрасывает буферы и закрывает файловый писатель.
    pub fn shutdown(mut self) {
        let start = Instant::now();
        if let Some(guard) = self.file_guard.take() {
            tracing::debug!("Flushing file log writer");
            drop(guard);
        }
        tracing::debug!(
            shutdown_ms = start.elapsed().as_millis() as u64,
            "Logging shutdown completed"
        );
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("file_output", &self.has_file_output())
            .finish()
    }
}
