//! Error types for shell sessions.
//!
//! Only conditions that stop a command from being attempted are errors.
//! Timeouts and cancellations are ordinary outcomes and are reported through
//! the exit code of a [`CommandResult`](crate::shell::CommandResult).

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    /// The shell process (or one of its reader threads) could not be started.
    #[error("error opening shell '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A command was submitted to a shell after `shutdown()`.
    #[error("the shell is shutdown")]
    Closed,

    /// The shell started but failed the launcher's probe command.
    #[error("shell '{path}' is not usable (probe exited with {exit_code})")]
    Unusable { path: String, exit_code: i32 },

    #[error("no shell candidates configured")]
    NoCandidates,

    /// The blocking task behind `run_async` panicked or was cancelled.
    #[error("shell worker failed: {0}")]
    Worker(String),
}

pub type Result<T, E = ShellError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_names_path_and_cause() {
        let err = ShellError::Spawn {
            path: "/no/such/sh".to_string(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let message = err.to_string();
        assert!(message.contains("/no/such/sh"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unusable_error_message() {
        let err = ShellError::Unusable {
            path: "su".to_string(),
            exit_code: 1,
        };
        assert_eq!(err.to_string(), "shell 'su' is not usable (probe exited with 1)");
    }
}
