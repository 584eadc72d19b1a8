//! shellmux - interactive shell sessions with per-command results
//!
//! This library keeps a shell process (`sh`, `su`, ...) alive and runs
//! commands in it one at a time, splitting the shell's stdout and stderr back
//! into one [`CommandResult`] per command:
//! - [`Shell`] sessions with timeouts, interrupts and line/result listeners
//! - [`ShellPool`] for sharing sessions by command line
//! - [`ShellLauncher`] for picking the first usable shell from candidates
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use shellmux::{CommandConfig, ShellPool};
//!
//! fn main() -> shellmux::Result<()> {
//!     let pool = ShellPool::new();
//!     let sh = pool.sh()?;
//!
//!     let result = sh.run(
//!         "echo out; echo err >&2",
//!         CommandConfig::default().timeout(Duration::from_secs(10)),
//!     )?;
//!     assert_eq!(result.stdout, vec!["out"]);
//!     assert_eq!(result.stderr, vec!["err"]);
//!
//!     pool.shutdown_all();
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod shell;
pub mod utils;

// Re-export commonly used types
pub use error::{Result, ShellError};
pub use shell::{CommandConfig, CommandResult, Shell, ShellBuilder, ShellLauncher, ShellPool};
