use acl_inventory::config::{LogConfig, LogRotation};
use std::env;
use std::ffi::OsStr;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE_NAME: &str = "acl-inventory.log";

/// Installs a stdout layer and a non-blocking file layer.
///
/// `TRACING_LEVEL` and `LOG_FILE_PATH` override the `[log]` settings. Both
/// layers print the thread name, which tells `full-scan` lines apart from
/// `targeted-scan` lines when the two loops contend for a subtree.
pub fn init_logger(settings: &LogConfig) -> WorkerGuard {
    let directives = env::var("TRACING_LEVEL").unwrap_or_else(|_| settings.level.clone());
    let log_file_path =
        env::var("LOG_FILE_PATH").unwrap_or_else(|_| settings.file_path.clone());

    let (non_blocking, guard) =
        tracing_appender::non_blocking(file_appender(&log_file_path, settings.rotation));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .compact()
                .with_thread_names(true)
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_thread_names(true)
                .with_ansi(false),
        )
        .with(EnvFilter::new(&directives))
        .init();

    info!(
        "Logging '{}' to stdout and {} (rotation {:?})",
        directives, log_file_path, settings.rotation
    );

    guard
}

fn file_appender(log_file_path: &str, rotation: LogRotation) -> RollingFileAppender {
    let path = Path::new(log_file_path);
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE_NAME));

    match rotation {
        LogRotation::Never => rolling::never(directory, file_name),
        LogRotation::Daily => rolling::daily(directory, file_name),
        LogRotation::Hourly => rolling::hourly(directory, file_name),
    }
}
