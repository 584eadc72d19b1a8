//! Shell sessions and the pieces they are built from.
//!
//! - `session`: the [`Shell`] handle and its [`ShellBuilder`]
//! - `reader` / `collector` / `watchdog` / `marker`: the stdout/stderr
//!   demultiplexing machinery behind [`Shell::run`]
//! - `pool` / `launcher`: owning and choosing shells
//! - `history`: a bounded log of recent results

mod collector;
mod command;
pub mod env;
mod history;
mod launcher;
mod listener;
mod marker;
mod pool;
mod reader;
mod session;
mod watchdog;


use std::sync::{Mutex, MutexGuard, PoisonError};

pub use collector::StreamKind;
pub use command::{CommandConfig, CommandResult, Details, EventCallback, LineCallback, Outcome, status};
pub use history::{HistoryEntry, ResultHistory};
pub use launcher::{ANDROID_PATH_INIT, DEFAULT_PROBE_TIMEOUT, ShellLauncher};
pub use listener::{LineListener, ListenerId};
pub use marker::Marker;
pub use pool::ShellPool;
pub use session::{Shell, ShellBuilder, State};

/// Lock a mutex, recovering the data if a listener panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
