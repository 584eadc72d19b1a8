//! Logging initialization.
//!
//! Logs go to a file so they never mix with the command output the CLI
//! prints. Each run creates its own file, e.g.
//! `logs/shellmux.2024-12-06-14-30-25.log`.
//!
//! The log level is controlled by the `RUST_LOG` environment variable:
//! - `RUST_LOG=debug` - one line per command, markers, drained output
//! - `RUST_LOG=info` - shell start and shutdown (default)
//! - `RUST_LOG=warn` - swallowed write errors, rejected shells, timeouts

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize file logging in `log_dir`.
///
/// Returns the writer guard; keep it alive until exit so buffered lines are
/// flushed. Returns `None` (after a warning on stderr) if the log file cannot
/// be created or a subscriber is already installed.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let log_path = match create_log_file(log_dir) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Warning: Failed to create log file in {}: {}", log_dir.display(), e);
            return None;
        }
    };
    let log_file = match fs::OpenOptions::new().append(true).open(&log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: Failed to open log file: {}", e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Warning: Failed to initialize logging: {}", e);
        return None;
    }

    tracing::info!("Logging initialized - writing to {}", log_path.display());
    Some(guard)
}

/// Create `log_dir` if needed and an empty, timestamped log file inside it.
fn create_log_file(log_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let timestamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
    let log_path = log_dir.join(format!("shellmux.{timestamp}.log"));
    fs::File::create(&log_path)?;
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_log_file_in_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("logs");

        let path = create_log_file(&log_dir).unwrap();
        assert!(path.exists());
        assert!(path.starts_with(&log_dir));

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("shellmux."));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_create_log_file_fails_on_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        assert!(create_log_file(&blocker).is_err());
    }
}
