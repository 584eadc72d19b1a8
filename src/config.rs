//! Runtime settings read from the environment.
//!
//! | Variable                 | Meaning                                 | Default              |
//! |--------------------------|-----------------------------------------|----------------------|
//! | `SHELLMUX_SHELL`         | shell command line                      | `sh`                 |
//! | `SHELLMUX_TIMEOUT`       | per-command timeout, seconds            | none                 |
//! | `SHELLMUX_PROBE_TIMEOUT` | launcher probe timeout, seconds         | 5                    |
//! | `SHELLMUX_LOG_DIR`       | directory for log files                 | `logs/` next to exe  |
//!
//! Command-line flags take precedence over these.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::shell::DEFAULT_PROBE_TIMEOUT;

pub const SHELL_VAR: &str = "SHELLMUX_SHELL";
pub const TIMEOUT_VAR: &str = "SHELLMUX_TIMEOUT";
pub const PROBE_TIMEOUT_VAR: &str = "SHELLMUX_PROBE_TIMEOUT";
pub const LOG_DIR_VAR: &str = "SHELLMUX_LOG_DIR";

const DEFAULT_SHELL: &str = "sh";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub shell: String,
    pub timeout: Option<Duration>,
    pub probe_timeout: Duration,
    pub log_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            timeout: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            log_dir: default_log_dir(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup. Malformed values are
    /// logged and replaced by their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(shell) = lookup(SHELL_VAR).filter(|s| !s.trim().is_empty()) {
            settings.shell = shell.trim().to_string();
        }
        if let Some(value) = lookup(TIMEOUT_VAR) {
            match parse_seconds(&value) {
                Ok(timeout) => settings.timeout = Some(timeout),
                Err(e) => warn!(var = TIMEOUT_VAR, "ignoring setting: {}", e),
            }
        }
        if let Some(value) = lookup(PROBE_TIMEOUT_VAR) {
            match parse_seconds(&value) {
                Ok(timeout) => settings.probe_timeout = timeout,
                Err(e) => warn!(var = PROBE_TIMEOUT_VAR, "ignoring setting: {}", e),
            }
        }
        if let Some(dir) = lookup(LOG_DIR_VAR).filter(|s| !s.is_empty()) {
            settings.log_dir = PathBuf::from(dir);
        }

        settings
    }
}

/// Parse a positive number of seconds, fractions allowed (`"2"`, `"0.5"`).
pub fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("'{value}' must be a positive number of seconds"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("'{value}': {e}"))
}

/// `logs/` in the executable's directory, or in the working directory when
/// that cannot be determined.
fn default_log_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"))
}
