use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

use crate::{
    engine::{DEFAULT_FRAGMENT_BYTES, DEFAULT_MAX_DEPTH, DEFAULT_WINDOW_BYTES},
    logging::{LogFormat, LoggingConfig},
};

/// Префикс переменных окружения: `TABLEDUMP_ROWS_PER_CHUNK=500`.
pub const ENV_PREFIX: &str = "TABLEDUMP";

pub const DEFAULT_ROWS_PER_CHUNK: usize = 2000;
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 1 << 20;

/// Настройки по умолчанию для экспорта, импорта и логирования.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Строк за одно чтение хранилища при экспорте.
    pub rows_per_chunk: usize,
    /// Байт источника на одну пакетную запись при импорте.
    pub chunk_size_bytes: usize,
    /// Порог запечатывания фрагмента контейнера.
    pub sink_fragment_bytes: usize,
    /// Размер окна чтения токенизатора.
    pub source_window_bytes: usize,
    /// Предельная глубина вложенности JSON при импорте.
    pub max_depth: usize,
    pub pretty_json: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rows_per_chunk: DEFAULT_ROWS_PER_CHUNK,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            sink_fragment_bytes: DEFAULT_FRAGMENT_BYTES,
            source_window_bytes: DEFAULT_WINDOW_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
            pretty_json: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

impl Settings {
    /// Значения по умолчанию, переопределённые переменными `TABLEDUMP_*`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix(ENV_PREFIX)
    }

    pub fn load_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let cfg = Config::builder()
            .set_default("rows_per_chunk", defaults.rows_per_chunk as u64)?
            .set_default("chunk_size_bytes", defaults.chunk_size_bytes as u64)?
            .set_default("sink_fragment_bytes", defaults.sink_fragment_bytes as u64)?
            .set_default("source_window_bytes", defaults.source_window_bytes as u64)?
            .set_default("max_depth", defaults.max_depth as u64)?
            .set_default("pretty_json", defaults.pretty_json)?
            .set_default("log_level", defaults.log_level)?
            .set_default("log_format", "compact")?
            .add_source(Environment::with_prefix(prefix).try_parsing(true))
            .build()?;

        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("rows_per_chunk", self.rows_per_chunk),
            ("chunk_size_bytes", self.chunk_size_bytes),
            ("sink_fragment_bytes", self.sink_fragment_bytes),
            ("source_window_bytes", self.source_window_bytes),
            ("max_depth", self.max_depth),
        ] {
            if value == 0 {
                return Err(ConfigError::Message(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Конфигурация логирования с уровнем и форматом из настроек.
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_load_defaults() {
        let settings = Settings::load_with_prefix("TABLEDUMP_TEST_DEFAULTS").unwrap();
        assert_eq!(settings, Settings::default());
    }

    /// Тест проверяет переопределение через переменные окружения.
    #[test]
    #[serial]
    fn test_env_overrides() {
        env::set_var("TABLEDUMP_TEST_ENV_ROWS_PER_CHUNK", "50");
        env::set_var("TABLEDUMP_TEST_ENV_PRETTY_JSON", "true");
        env::set_var("TABLEDUMP_TEST_ENV_LOG_FORMAT", "json");

        let settings = Settings::load_with_prefix("TABLEDUMP_TEST_ENV").unwrap();

        env::remove_var("TABLEDUMP_TEST_ENV_ROWS_PER_CHUNK");
        env::remove_var("TABLEDUMP_TEST_ENV_PRETTY_JSON");
        env::remove_var("TABLEDUMP_TEST_ENV_LOG_FORMAT");

        assert_eq!(settings.rows_per_chunk, 50);
        assert!(settings.pretty_json);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.logging().format, LogFormat::Json);
    }

    #[test]
    #[serial]
    fn test_zero_is_rejected() {
        env::set_var("TABLEDUMP_TEST_ZERO_CHUNK_SIZE_BYTES", "0");
        let result = Settings::load_with_prefix("TABLEDUMP_TEST_ZERO");
        env::remove_var("TABLEDUMP_TEST_ZERO_CHUNK_SIZE_BYTES");
        assert!(result.is_err());
    }
}
