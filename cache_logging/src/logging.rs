use std::ffi::OsStr;
use std::path::Path;
use std::sync::OnceLock;

use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LoggingConfig, LoggingMode};
use crate::constants::{DEFAULT_LOG_FILE_NAME, DEFAULT_LOG_LEVEL_CONSOLE, DEFAULT_LOG_LEVEL_FILE};

/// The main entry point to set up logging. Only the first call in a process installs a
/// subscriber; later calls are ignored.
pub fn init_logging(cfg: LoggingConfig) {
    match &cfg.logging_mode {
        LoggingMode::File(log_file) => {
            // Attempt logging to a file, but fallback to console logging on error.
            if let Err(e) = init_logging_to_file(log_file, cfg.use_json) {
                init_logging_to_console(&cfg);
                error!("Error logging to file {log_file:?} ({e}); falling back to console logging.");
            }
        },
        LoggingMode::Console => init_logging_to_console(&cfg),
    }

    info!("asset_cache {}", env!("CARGO_PKG_VERSION"));
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_default()
}

fn init_logging_to_console(cfg: &LoggingConfig) {
    let registry = tracing_subscriber::registry();

    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_file(true)
        .with_target(false);
    let fmt_filter = filter(DEFAULT_LOG_LEVEL_CONSOLE);

    let result = if cfg.use_json {
        registry.with(fmt_layer_base.json().with_filter(fmt_filter)).try_init()
    } else {
        registry.with(fmt_layer_base.with_filter(fmt_filter)).try_init()
    };
    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
}

fn init_logging_to_file(path: &Path, use_json: bool) -> Result<(), std::io::Error> {
    let (path, file_name) = match path.file_name() {
        Some(name) => (path.to_path_buf(), name),
        None => (path.join(DEFAULT_LOG_FILE_NAME), OsStr::new(DEFAULT_LOG_FILE_NAME)),
    };

    let log_directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            parent
        },
        _ => Path::new("."),
    };

    // Fail here, before installing anything, if the file cannot be opened for appending.
    std::fs::OpenOptions::new().create(true).append(true).open(&path)?;

    let file_appender = rolling::never(log_directory, file_name);
    let (writer, guard) = non_blocking(file_appender);

    // The guard flushes on drop, so it has to live for the rest of the process.
    static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
    let _ = FILE_GUARD.set(guard);

    let registry = tracing_subscriber::registry();
    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);
    let fmt_filter = filter(DEFAULT_LOG_LEVEL_FILE);

    let result = if use_json {
        registry.with(fmt_layer_base.json().with_filter(fmt_filter)).try_init()
    } else {
        registry.with(fmt_layer_base.with_filter(fmt_filter)).try_init()
    };
    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }

    Ok(())
}
