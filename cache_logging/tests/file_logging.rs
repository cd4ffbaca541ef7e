use cache_logging::{init_logging, LoggingConfig, LoggingMode};
use tempfile::TempDir;

// Installs the global subscriber, so it lives in its own test binary.
#[test]
fn test_init_logging_to_file_creates_log() {
    let dir = TempDir::new().unwrap();
    let log_file = dir.path().join("nested").join("cache.log");

    init_logging(LoggingConfig {
        logging_mode: LoggingMode::File(log_file.clone()),
        use_json: true,
    });
    tracing::warn!("eviction failed");

    assert!(log_file.is_file());

    // a second call is a no-op rather than a panic
    init_logging(LoggingConfig::console());
}
