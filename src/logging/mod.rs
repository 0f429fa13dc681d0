//! Логирование через `tracing`.
//!
//! [`init_logging`] собирает глобальный subscriber: `EnvFilter`, консольный
//! слой в формате compact/pretty/json и, при необходимости, файловый слой с
//! ежедневной ротацией через `tracing-appender`.

pub mod config;
mod filters;
mod formatter;
pub mod handle;

pub use config::{FileLogConfig, LogFormat, LoggingConfig};
pub use filters::build_filter_from_config;
pub use handle::LoggingHandle;
use tabledump_error::{StatusCode, TabledumpResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Registry};

/// Устанавливает глобальный subscriber. Повторный вызов завершается
/// ошибкой, т.к. subscriber уже установлен.
pub fn init_logging(config: LoggingConfig) -> TabledumpResult<LoggingHandle> {
    config.validate()?;
    config.ensure_log_dir()?;

    let mut layers: Vec<formatter::BoxedLayer<Registry>> = Vec::new();
    if config.console_enabled {
        layers.push(formatter::console_layer(&config));
    }

    let file_guard = match &config.file {
        Some(file) => {
            let appender = tracing_appender::rolling::daily(&file.dir, &file.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(formatter::file_layer(&config, writer));
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(build_filter_from_config(&config))
        .try_init()
        .map_err(|e| {
            tabledump_error::StackError::new(tabledump_error::GenericError::new(
                StatusCode::AlreadyExists,
                format!("logging is already initialized: {e}"),
            ))
        })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = ?config.format,
        file_output = config.file.is_some(),
        "Logging initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
