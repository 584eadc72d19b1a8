//! Per-command configuration and results.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Exit codes, including the sentinels used for commands that never
/// reported a status of their own.
pub mod status {
    pub const SUCCESS: i32 = 0;
    /// The command did not finish within its timeout.
    pub const TIMEOUT: i32 = 124;
    pub const COMMAND_FAILED: i32 = 125;
    pub const NOT_EXECUTABLE: i32 = 126;
    pub const NOT_FOUND: i32 = 127;
    /// Waiting for the command was interrupted.
    pub const TERMINATED: i32 = 128 + 30;
    /// No stream reported a status.
    pub const INVALID: i32 = 0x100;
}

/// Callback for a single line of output.
pub type LineCallback = Box<dyn FnMut(&str) + Send>;
/// Callback fired once when a command times out or is cancelled.
pub type EventCallback = Box<dyn FnOnce() + Send>;

/// Options for a single [`Shell::run`](super::Shell::run) call.
///
/// Built with chained setters:
///
/// ```
/// use std::time::Duration;
/// use shellmux::shell::CommandConfig;
///
/// let config = CommandConfig::default()
///     .timeout(Duration::from_secs(5))
///     .merge_stderr(true)
///     .on_stdout_line(|line| println!("{line}"));
/// ```
pub struct CommandConfig {
    pub(crate) token: Uuid,
    pub(crate) merge_stderr: bool,
    pub(crate) on_stdout_line: Option<LineCallback>,
    pub(crate) on_stderr_line: Option<LineCallback>,
    pub(crate) on_cancelled: Option<EventCallback>,
    pub(crate) on_timeout: Option<EventCallback>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) notify: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            token: Uuid::new_v4(),
            merge_stderr: false,
            on_stdout_line: None,
            on_stderr_line: None,
            on_cancelled: None,
            on_timeout: None,
            timeout: None,
            notify: true,
        }
    }
}

impl CommandConfig {
    /// Config that does not notify line or result listeners.
    pub fn silent() -> Self {
        Self::default().notify(false)
    }

    /// Use a specific token instead of a random one.
    pub fn token(mut self, token: Uuid) -> Self {
        self.token = token;
        self
    }

    /// Route stderr lines into stdout (and to the stdout callback/listeners).
    pub fn merge_stderr(mut self, merge: bool) -> Self {
        self.merge_stderr = merge;
        self
    }

    pub fn on_stdout_line(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_stdout_line = Some(Box::new(f));
        self
    }

    pub fn on_stderr_line(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_stderr_line = Some(Box::new(f));
        self
    }

    pub fn on_cancelled(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancelled = Some(Box::new(f));
        self
    }

    pub fn on_timeout(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_timeout = Some(Box::new(f));
        self
    }

    /// Maximum time to wait for the command. `None` waits forever.
    pub fn timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Whether registered listeners see this command's lines and result.
    pub fn notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }
}

impl fmt::Debug for CommandConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandConfig")
            .field("token", &self.token)
            .field("merge_stderr", &self.merge_stderr)
            .field("timeout", &self.timeout)
            .field("notify", &self.notify)
            .finish_non_exhaustive()
    }
}

/// Classification of an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(i32),
    TimedOut,
    Terminated,
    Invalid,
}

impl From<i32> for Outcome {
    fn from(code: i32) -> Self {
        match code {
            status::SUCCESS => Outcome::Success,
            status::TIMEOUT => Outcome::TimedOut,
            status::TERMINATED => Outcome::Terminated,
            status::INVALID => Outcome::Invalid,
            other => Outcome::Failed(other),
        }
    }
}

/// The result of running one command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Lines of both streams in the order they were read.
    pub output: Vec<String>,
    pub exit_code: i32,
    pub details: Details,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == status::SUCCESS
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from(self.exit_code)
    }

    /// Stdout joined with newlines.
    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }

    /// Stderr joined with newlines.
    pub fn stderr_text(&self) -> String {
        self.stderr.join("\n")
    }

    /// Combined output joined with newlines.
    pub fn output_text(&self) -> String {
        self.output.join("\n")
    }
}

/// Bookkeeping for a finished command.
#[derive(Debug, Clone, Serialize)]
pub struct Details {
    pub token: Uuid,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u128(elapsed.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(exit_code: i32) -> CommandResult {
        let now = Utc::now();
        CommandResult {
            stdout: vec!["a".to_string(), "c".to_string()],
            stderr: vec!["b".to_string()],
            output: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            exit_code,
            details: Details {
                token: Uuid::new_v4(),
                command: "echo a; echo b >&2; echo c".to_string(),
                started_at: now,
                ended_at: now,
                elapsed: Duration::from_millis(12),
            },
        }
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(Outcome::from(0), Outcome::Success);
        assert_eq!(Outcome::from(status::TIMEOUT), Outcome::TimedOut);
        assert_eq!(Outcome::from(status::TERMINATED), Outcome::Terminated);
        assert_eq!(Outcome::from(status::INVALID), Outcome::Invalid);
        assert_eq!(Outcome::from(127), Outcome::Failed(127));
        assert_eq!(status::TERMINATED, 158);
    }

    #[test]
    fn test_result_text_helpers() {
        let result = result_with(0);
        assert!(result.is_success());
        assert_eq!(result.stdout_text(), "a\nc");
        assert_eq!(result.stderr_text(), "b");
        assert_eq!(result.output_text(), "a\nb\nc");

        assert!(!result_with(1).is_success());
    }

    #[test]
    fn test_result_serializes_elapsed_as_millis() {
        let result = result_with(3);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["exit_code"], 3);
        assert_eq!(json["details"]["elapsed_ms"], 12);
        assert_eq!(json["stdout"][1], "c");
    }

    #[test]
    fn test_config_defaults() {
        let a = CommandConfig::default();
        let b = CommandConfig::default();
        assert_ne!(a.token, b.token);
        assert!(a.notify);
        assert!(!a.merge_stderr);
        assert!(a.timeout.is_none());
        assert!(!CommandConfig::silent().notify);
    }

    #[test]
    fn test_config_setters() {
        let token = Uuid::new_v4();
        let config = CommandConfig::default()
            .token(token)
            .merge_stderr(true)
            .timeout(Duration::from_secs(2))
            .on_timeout(|| {});
        assert_eq!(config.token, token);
        assert!(config.merge_stderr);
        assert_eq!(config.timeout, Some(Duration::from_secs(2)));
        assert!(config.on_timeout.is_some());
        assert!(format!("{config:?}").contains("merge_stderr: true"));
    }
}
