use std::{path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use tabledump_error::{StatusCode, TabledumpResult};

/// Формат консольного вывода.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Файловый вывод с ежедневной ротацией.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLogConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_prefix: "tabledump.log".to_string(),
        }
    }
}

/// Настройки логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень по умолчанию (`trace`..`error`).
    pub level: String,
    /// Дополнительные директивы `EnvFilter` (`"tabledump::engine=debug"`).
    pub directives: Vec<String>,
    pub format: LogFormat,
    pub console_enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_line_numbers: bool,
    /// `None`: файловый вывод выключен.
    pub file: Option<FileLogConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            format: LogFormat::Compact,
            console_enabled: true,
            with_ansi: true,
            with_target: true,
            with_line_numbers: false,
            file: None,
        }
    }
}

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl LoggingConfig {
    /// Директива для `EnvFilter`: уровень плюс дополнительные правила.
    pub fn build_filter_directive(&self) -> String {
        std::iter::once(self.level.clone())
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn validate(&self) -> TabledumpResult<()> {
        tabledump_error::ensure!(
            LEVELS.contains(&self.level.to_ascii_lowercase().as_str()),
            StatusCode::InvalidArgs,
            "invalid log level '{}'",
            self.level
        );
        if let Some(file) = &self.file {
            tabledump_error::ensure!(
                !file.file_prefix.is_empty(),
                StatusCode::InvalidArgs,
                "log file prefix must not be empty"
            );
        }
        Ok(())
    }

    /// Создаёт каталог для файлового вывода, если он включён.
    pub fn ensure_log_dir(&self) -> TabledumpResult<()> {
        if let Some(file) = &self.file {
            std::fs::create_dir_all(&file.dir)?;
        }
        Ok(())
    }
}
