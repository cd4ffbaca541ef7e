use std::path::PathBuf;

mod log {
    utils::config_group!({
        /// The log destination. If unset or empty, logs go to the console; otherwise they are
        /// appended to this file.
        ///
        /// Use the environment variable `ASSET_CACHE_LOG_DEST` to set this value.
        ref dest: Option<String> = None;

        /// The format the logs are printed in. If "json", then logs are dumped as json blobs;
        /// otherwise they are treated as text. By default logging to a file is done in json and
        /// console logging is done with text.
        ///
        /// Use the environment variable `ASSET_CACHE_LOG_FORMAT` to set this value.
        ref format: Option<String> = None;
    });
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoggingMode {
    File(PathBuf),
    Console,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub logging_mode: LoggingMode,
    pub use_json: bool,
}

impl LoggingConfig {
    pub fn console() -> Self {
        Self {
            logging_mode: LoggingMode::Console,
            use_json: false,
        }
    }

    /// Reads `ASSET_CACHE_LOG_DEST` and `ASSET_CACHE_LOG_FORMAT`.
    pub fn from_env() -> Self {
        let values = log::ConfigValueGroup::from_env();

        let logging_mode = match values.dest.as_deref().map(str::trim) {
            None | Some("") => LoggingMode::Console,
            Some(dest) => LoggingMode::File(PathBuf::from(dest)),
        };

        let use_json = match &values.format {
            Some(format) => format.to_ascii_lowercase().trim() == "json",
            None => logging_mode != LoggingMode::Console,
        };

        Self { logging_mode, use_json }
    }
}
