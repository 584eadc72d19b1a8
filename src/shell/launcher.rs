//! Picking a working shell from a list of candidates.
//!
//! Root shells are unreliable: `su` may be missing, may refuse, or may hang
//! waiting for a grant. The launcher tries each candidate in order, probes
//! it with a trivial command, and returns the first one that answers. The
//! accepted shell then runs the configured init commands.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::command::CommandConfig;
use super::env::{self, EnvironmentMap};
use super::session::{Shell, ShellBuilder};
use crate::error::{Result, ShellError};

/// Probe run on every candidate; it must exit 0.
const PROBE_COMMAND: &str = "true";

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Adds the system_ext and vendor binary directories found on Android.
pub const ANDROID_PATH_INIT: &str = "export PATH=$PATH:/system_ext/bin:/vendor/bin";

#[derive(Debug, Clone)]
pub struct ShellLauncher {
    candidates: Vec<ShellBuilder>,
    init_commands: Vec<String>,
    env: EnvironmentMap,
    probe_timeout: Duration,
}

impl Default for ShellLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellLauncher {
    pub fn new() -> Self {
        Self {
            candidates: Vec::new(),
            init_commands: Vec::new(),
            env: EnvironmentMap::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// `su` (with `-mm` for the global mount namespace), falling back to `sh`.
    pub fn root(global_mount: bool) -> Self {
        let su = if global_mount {
            ShellBuilder::new("su").arg("-mm")
        } else {
            ShellBuilder::new("su")
        };
        Self::new()
            .candidate(su)
            .candidate(ShellBuilder::new("sh"))
            .init_command(ANDROID_PATH_INIT)
    }

    /// Append a candidate. Candidates are tried in insertion order.
    pub fn candidate(mut self, builder: ShellBuilder) -> Self {
        self.candidates.push(builder);
        self
    }

    pub fn init_command(mut self, command: impl Into<String>) -> Self {
        self.init_commands.push(command.into());
        self
    }

    /// Environment added to every candidate.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env.extend(env::from_pairs(vars));
        self
    }

    /// How long the probe and each init command may take.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn candidates(&self) -> impl Iterator<Item = String> + '_ {
        self.candidates.iter().map(ShellBuilder::command_line)
    }

    /// Start the first usable candidate.
    ///
    /// Returns the error of the last candidate when none works.
    pub fn launch(&self) -> Result<Shell> {
        debug!(candidates = ?self.candidates().collect::<Vec<_>>(), "launching shell");
        let mut last_error = None;
        for candidate in &self.candidates {
            match self.try_candidate(candidate) {
                Ok(shell) => {
                    info!(shell = %shell.path(), "using shell");
                    return Ok(shell);
                }
                Err(e) => {
                    warn!(shell = %candidate.command_line(), "shell candidate rejected: {}", e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(ShellError::NoCandidates))
    }

    fn try_candidate(&self, candidate: &ShellBuilder) -> Result<Shell> {
        let shell = candidate.clone().envs(self.env.clone()).spawn()?;

        let probe = shell.run(
            PROBE_COMMAND,
            CommandConfig::silent().timeout(self.probe_timeout),
        )?;
        if !probe.is_success() {
            return Err(ShellError::Unusable {
                path: shell.path().to_string(),
                exit_code: probe.exit_code,
            });
        }

        for command in &self.init_commands {
            let result = shell.run(
                command,
                CommandConfig::silent().timeout(self.probe_timeout),
            )?;
            if !result.is_success() {
                warn!(shell = %shell.path(), command = %command, exit_code = result.exit_code, "init command failed");
            }
        }
        Ok(shell)
    }
}
