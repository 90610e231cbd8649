//! Logging setup (C10), grounded in `kukur/logging.py`'s
//! `TimedRotatingFileHandler(when='D', backupCount=7)` and the teacher's
//! `tracing_subscriber::registry().with(..).with(..).init()` wiring.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Holds the non-blocking writer's flush guard for the process lifetime.
/// Dropping it would silently stop flushing buffered log lines to disk.
pub struct LoggingGuard(#[allow(dead_code)] Option<WorkerGuard>);

/// Install the global tracing subscriber. `logging.path`, if present in
/// `config`, switches the writer to a file rotated daily; otherwise logs go
/// to stderr. The returned guard must be held for as long as logging
/// should keep flushing.
pub fn configure(config: &toml::Value) -> LoggingGuard {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_path = config
        .get("logging")
        .and_then(|logging| logging.get("path"))
        .and_then(toml::Value::as_str);

    match log_path {
        Some(path) => {
            let path = std::path::Path::new(path);
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().and_then(|f| f.to_str()).unwrap_or("kukur.log");
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            LoggingGuard(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            LoggingGuard(None)
        }
    }
}
