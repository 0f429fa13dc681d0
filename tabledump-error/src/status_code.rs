use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок экспорта/импорта.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных и значений
/// - 3xxx: Схема и согласование таблиц
/// - 4xxx: Управление операцией (отмена, транзакции)
/// - 5xxx: Хранилище таблиц
/// - 6xxx: Ввод-вывод
/// - 8xxx: Формат контейнера и JSON
///
/// `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 2xxx: Ошибки данных ===
    NotFound = 2000,
    AlreadyExists = 2001,
    TypeError = 2002,
    InvalidKey = 2003,
    InvalidValue = 2004,
    InvalidData = 2009,
    UnknownTypeTag = 2010,
    NonExportable = 2011,

    // === 3xxx: Схема ===
    SchemaMismatch = 3000,

    // === 4xxx: Управление операцией ===
    Cancelled = 4000,
    TransactionAborted = 4001,
    ReadOnlyTransaction = 4002,

    // === 5xxx: Хранилище ===
    StorageUnavailable = 5000,
    StoreIo = 5001,
    ExportFailed = 5002,

    // === 6xxx: IO ===
    Io = 6000,
    Timeout = 6002,
    UnexpectedEof = 6007,
    PermissionDenied = 6008,

    // === 8xxx: Формат ===
    MalformedContainer = 8000,
    MalformedJson = 8001,
    UnsupportedVersion = 8002,
    InvalidUtf8 = 8004,
    InvalidWriterState = 8005,
    ParseError = 8009,
    EncodingError = 8010,
    DecodingError = 8011,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка вызвана содержимым контейнера (формат, JSON, теги типов).
    ///
    /// Повторный запуск с тем же контейнером даст ту же ошибку.
    pub fn is_format_error(&self) -> bool {
        (8000..=8999).contains(&self.code()) || matches!(self, Self::UnknownTypeTag)
    }

    /// Ошибка пришла из хранилища таблиц или ввода-вывода.
    pub fn is_store_error(&self) -> bool {
        matches!(self.code(), 5000..=6999)
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Internal | Self::TransactionAborted | Self::StorageUnavailable
        )
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::Cancelled => LogLevel::Info,
            Self::NotFound | Self::AlreadyExists => LogLevel::Debug,
            Self::SchemaMismatch
            | Self::InvalidArgs
            | Self::InvalidKey
            | Self::InvalidValue
            | Self::InvalidData => LogLevel::Warn,
            Self::Internal | Self::TransactionAborted | Self::StorageUnavailable => {
                LogLevel::Error
            }
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
