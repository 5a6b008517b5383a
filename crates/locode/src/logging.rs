//! Logging initialization.
//!
//! Logs go to a file so the terminal transcript stays readable.

use locode_util::log::{self, LogConfig, LogLevel};
use std::path::PathBuf;

/// Initialize file logging. Returns the log file path on success.
pub fn init_logging(verbose: bool) -> Option<PathBuf> {
    let log_file = log::default_log_path()?;

    let config = LogConfig {
        print: false,
        level: if verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        },
        include_location: verbose,
        file: Some(log_file.clone()),
    };

    match log::init(config) {
        Ok(()) => Some(log_file),
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            None
        }
    }
}
