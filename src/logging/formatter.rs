use std::io::{self, Stderr};

use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

use crate::logging::config::{LogFormat, LoggingConfig};

pub type BoxedLayer<S> = Box<dyn LayerTrait<S> + Send + Sync>;

/// Консольный слой в выбранном формате. Логи идут в stderr, чтобы не
/// смешиваться с контейнером, который может писаться в stdout.
pub fn console_layer<S>(config: &LoggingConfig) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let writer: fn() -> Stderr = io::stderr;
    let base = fmt::layer()
        .with_writer(writer)
        .with_ansi(config.with_ansi)
        .with_target(config.with_target)
        .with_line_number(config.with_line_numbers);

    match config.format {
        LogFormat::Json => Box::new(base.json().with_current_span(true)),
        LogFormat::Pretty => Box::new(base.pretty().with_span_events(FmtSpan::CLOSE)),
        LogFormat::Compact => Box::new(base.compact()),
    }
}

/// Файловый слой без ANSI-последовательностей.
pub fn file_layer<S>(
    config: &LoggingConfig,
    writer: NonBlocking,
) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(config.with_line_numbers);

    match config.format {
        LogFormat::Json => Box::new(base.json()),
        _ => Box::new(base),
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    /// Тест проверяет, что слой каждого формата регистрируется и пишет
    /// события без паники.
    #[test]
    fn test_console_layer_all_formats() {
        for format in [LogFormat::Compact, LogFormat::Pretty, LogFormat::Json] {
            let config = LoggingConfig {
                format,
                with_ansi: false,
                ..Default::default()
            };
            let subscriber = Registry::default().with(console_layer::<Registry>(&config));
            tracing::subscriber::with_default(subscriber, || {
                let span = tracing::info_span!("export", table = "foos");
                let _enter = span.enter();
                tracing::info!(rows = 3, "chunk written");
            });
        }
    }
}
