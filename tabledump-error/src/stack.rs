use std::{fmt, panic::Location, sync::Arc};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{DumpError, ErrorExt, LogLevel, StatusCode};

/// Ошибка операции с цепочкой контекстов.
///
/// Корневая ошибка хранится за `Arc`, поэтому `StackError` дёшево клонируется
/// и может быть одновременно возвращена вызывающему коду и отправлена в лог.
#[derive(Clone)]
pub struct StackError {
    inner: Arc<dyn ErrorExt>,
    contexts: Vec<ErrorContext>,
}

/// Одно звено контекста с местом вызова.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: &'static Location<'static>,
}

/// Сводка ошибки для отчётов (например, в результате CLI или HTTP-ответе).
#[cfg(feature = "serde")]
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    /// Создаёт новую ошибку.
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            inner: Arc::new(err),
            contexts: Vec::new(),
        }
    }

    /// Добавляет контекст к ошибке.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        self.contexts.push(ErrorContext {
            message: msg.into(),
            location: Location::caller(),
        });
        self
    }

    /// Возвращает код статуса.
    pub fn status_code(&self) -> StatusCode {
        self.inner.status_code()
    }

    /// Возвращает сообщение для вызывающей стороны.
    pub fn client_message(&self) -> String {
        self.inner.client_message()
    }

    /// Возвращает корневую ошибку.
    pub fn root(&self) -> &dyn ErrorExt {
        self.inner.as_ref()
    }

    /// Возвращает все контексты, от внутреннего к внешнему.
    pub fn contexts(&self) -> &[ErrorContext] {
        &self.contexts
    }

    /// Попытка downcast к конкретному типу ошибки.
    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Корневая [`DumpError`], если ошибка пришла из движка экспорта/импорта.
    pub fn dump_error(&self) -> Option<&DumpError> {
        self.downcast_ref::<DumpError>()
    }

    /// Была ли операция отменена через progress callback.
    pub fn is_cancelled(&self) -> bool {
        self.status_code() == StatusCode::Cancelled
    }

    /// Возвращает уровень логирования.
    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    #[cfg(feature = "serde")]
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.status_code().code(),
            message: self.client_message(),
            contexts: self.format_contexts(),
        }
    }

    fn format_contexts(&self) -> Vec<String> {
        self.contexts
            .iter()
            .map(|ctx| {
                format!(
                    "{} ({}:{})",
                    ctx.message,
                    ctx.location.file(),
                    ctx.location.line()
                )
            })
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut debug = f.debug_struct("StackError");
        debug.field("inner", &self.inner.log_message());
        debug.field("status_code", &self.status_code());
        if !self.contexts.is_empty() {
            debug.field("contexts", &self.format_contexts());
        }
        debug.finish()
    }
}

impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        // Внешний контекст печатается первым: "export → table foos: ..."
        for ctx in self.contexts.iter().rev() {
            write!(f, "{} → ", ctx.message)?;
        }
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

impl From<StackError> for std::io::Error {
    fn from(e: StackError) -> Self {
        std::io::Error::other(e.to_string())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchemaMismatch;

    #[test]
    fn test_context_chain() {
        let err = DumpError::Cancelled;
        let stack = StackError::new(err)
            .context("table foos")
            .context("import");

        assert_eq!(stack.contexts().len(), 2);
        assert_eq!(stack.contexts()[0].message, "table foos");
        assert!(stack.contexts()[0].location.line() > 0);
        assert_eq!(stack.to_string(), "import → table foos → Operation cancelled");
    }

    #[test]
    fn test_downcast() {
        let stack = StackError::new(DumpError::SchemaMismatch(SchemaMismatch::MissingTable {
            table: "foos".to_string(),
        }));

        assert!(matches!(
            stack.dump_error(),
            Some(DumpError::SchemaMismatch(SchemaMismatch::MissingTable { .. }))
        ));
        assert_eq!(stack.status_code(), StatusCode::SchemaMismatch);
    }

    #[test]
    fn test_is_cancelled() {
        assert!(StackError::new(DumpError::Cancelled).is_cancelled());
        assert!(!StackError::new(DumpError::TransactionAborted {
            reason: "idle".to_string()
        })
        .is_cancelled());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_report_serialization() {
        let stack = StackError::new(DumpError::Cancelled).context("export");
        let report = stack.to_report();
        assert_eq!(report.code, StatusCode::Cancelled as u32);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("Operation cancelled"));
    }
}
