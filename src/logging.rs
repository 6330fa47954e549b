//! Tracing subscriber setup.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt};

use stint_core::config::LoggingConfig;
use stint_core::error::AppError;

/// Install the global subscriber. `RUST_LOG` overrides `logging.level`.
///
/// Logs go to stdout unless `logging.file` names a file, in which case
/// lines are appended there without ANSI colors.
pub fn init(config: &LoggingConfig) -> Result<(), AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (writer, ansi) = match &config.file {
        Some(path) => (BoxMakeWriter::new(Arc::new(open_log_file(path)?)), false),
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let installed = match config.format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .try_init(),
        _ => fmt()
            .pretty()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .try_init(),
    };

    installed.map_err(|e| AppError::internal(format!("Failed to install logger: {e}")))
}

/// Open `path` for appending, creating missing parent directories.
fn open_log_file(path: impl AsRef<Path>) -> Result<File, AppError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            AppError::configuration(format!("Cannot open log file {}: {e}", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_log_file_creates_parents_and_appends() {
        let dir = std::env::temp_dir().join(format!("stint-log-{}", std::process::id()));
        let path = dir.join("nested").join("stint.log");

        writeln!(open_log_file(&path).unwrap(), "first").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_open_log_file_rejects_directory() {
        let err = open_log_file(std::env::temp_dir()).unwrap_err();
        assert!(err.message.contains("Cannot open log file"));
    }
}
