//! A registry of shells keyed by command line.
//!
//! The pool is an ordinary value owned by whoever composes the application,
//! not a global. `get("su")` hands out the cached session while its process
//! is alive and spawns a replacement once it has died or been shut down.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use super::env::EnvironmentMap;
use super::launcher::ShellLauncher;
use super::lock;
use super::session::{Shell, ShellBuilder};
use crate::error::Result;

#[derive(Default)]
pub struct ShellPool {
    /// Overlay applied to every shell the pool spawns.
    env: EnvironmentMap,
    shells: Mutex<HashMap<String, Shell>>,
}

impl ShellPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(env: EnvironmentMap) -> Self {
        Self {
            env,
            shells: Mutex::new(HashMap::new()),
        }
    }

    /// The cached shell for `command_line`, spawning one if needed.
    pub fn get(&self, command_line: &str) -> Result<Shell> {
        self.get_or_spawn(command_line, || {
            ShellBuilder::from_command_line(command_line)
                .envs(self.env.clone())
                .spawn()
        })
    }

    /// The Bourne shell.
    pub fn sh(&self) -> Result<Shell> {
        self.get("sh")
    }

    /// A root shell through `su`.
    pub fn su(&self) -> Result<Shell> {
        self.get("su")
    }

    /// The cached shell stored under `key`, or the first usable shell the
    /// launcher finds. The pool's overlay is added to the launcher's.
    pub fn launch(&self, key: &str, launcher: &ShellLauncher) -> Result<Shell> {
        self.get_or_spawn(key, || launcher.clone().envs(self.env.clone()).launch())
    }

    /// Forget the shell stored under `key` and hand it back.
    pub fn evict(&self, key: &str) -> Option<Shell> {
        lock(&self.shells).remove(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.shells).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.shells).is_empty()
    }

    /// Shut down every cached shell and empty the pool.
    pub fn shutdown_all(&self) {
        let shells: Vec<Shell> = lock(&self.shells).drain().map(|(_, shell)| shell).collect();
        for shell in shells {
            shell.shutdown();
        }
    }

    /// Spawning happens outside the pool lock, so a slow launcher probe does
    /// not hold up lookups of other keys. If two callers race for the same
    /// key, the first shell stored wins and the other one is shut down.
    fn get_or_spawn<F>(&self, key: &str, spawn: F) -> Result<Shell>
    where
        F: FnOnce() -> Result<Shell>,
    {
        if let Some(shell) = self.cached(key) {
            return Ok(shell);
        }

        let shell = spawn()?;
        let mut shells = lock(&self.shells);
        if let Some(existing) = shells.get(key).filter(|cached| is_usable(cached)).cloned() {
            drop(shells);
            debug!(shell = key, "shell spawned concurrently, discarding ours");
            shell.shutdown();
            return Ok(existing);
        }
        shells.insert(key.to_string(), shell.clone());
        Ok(shell)
    }

    fn cached(&self, key: &str) -> Option<Shell> {
        let shells = lock(&self.shells);
        let shell = shells.get(key)?;
        if is_usable(shell) {
            return Some(shell.clone());
        }
        debug!(shell = key, "replacing dead shell");
        None
    }
}

fn is_usable(shell: &Shell) -> bool {
    !shell.is_shutdown() && shell.is_alive()
}
