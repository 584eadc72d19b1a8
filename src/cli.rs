//! CLI argument definitions.

use std::time::Duration;

use clap::Parser;

use crate::config::{Settings, parse_seconds};
use crate::shell::env::{self, EnvironmentMap};

/// Top-level CLI parser for `shellmux`.
#[derive(Debug, Parser)]
#[command(
    name = "shellmux",
    version,
    about = "Run commands in one long-lived shell with separated stdout and stderr"
)]
pub struct Cli {
    /// Shell command line, e.g. "sh" or "su -mm" [env: SHELLMUX_SHELL]
    #[arg(short, long, value_name = "CMDLINE", conflicts_with = "root")]
    pub shell: Option<String>,

    /// Try su first and fall back to sh
    #[arg(long)]
    pub root: bool,

    /// With --root, ask su for the global mount namespace
    #[arg(long, requires = "root")]
    pub global_mount: bool,

    /// Per-command timeout in seconds [env: SHELLMUX_TIMEOUT]
    #[arg(short, long, value_name = "SECS", value_parser = parse_seconds)]
    pub timeout: Option<Duration>,

    /// Collect stderr lines together with stdout
    #[arg(long)]
    pub merge_stderr: bool,

    /// Extra environment for the shell (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Print each result as a JSON object instead of streaming its output
    #[arg(long)]
    pub json: bool,

    /// Commands to run in order; read from stdin when none are given
    #[arg(value_name = "COMMAND")]
    pub commands: Vec<String>,
}

impl Cli {
    /// The shell to open: the flag, else the configured default.
    pub fn shell_command_line<'a>(&'a self, settings: &'a Settings) -> &'a str {
        self.shell.as_deref().unwrap_or(&settings.shell)
    }

    pub fn timeout(&self, settings: &Settings) -> Option<Duration> {
        self.timeout.or(settings.timeout)
    }

    pub fn environment(&self) -> EnvironmentMap {
        env::parse_assignments(&self.env)
    }
}
