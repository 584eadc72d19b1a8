//! Buffers and dispatch for the command currently in flight.
//!
//! A [`Collector`] is shared by the two [`CommandSink`]s of one command.
//! Every line goes through one lock so listeners, callbacks and buffers
//! observe lines in the same order.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};
use uuid::Uuid;

use super::command::{LineCallback, status};
use super::listener::LineListener;
use super::lock;
use super::marker::Marker;
use super::watchdog::Watchdog;

/// Which output stream of the shell a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Lines gathered for one command.
#[derive(Debug, Default)]
pub(crate) struct Buffers {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub output: Vec<String>,
    pub exit_code: i32,
}

pub(crate) struct Collector {
    state: Mutex<CollectorState>,
}

struct CollectorState {
    buffers: Buffers,
    merge_stderr: bool,
    notify: bool,
    on_stdout_line: Option<LineCallback>,
    on_stderr_line: Option<LineCallback>,
    stdout_listeners: Vec<LineListener>,
    stderr_listeners: Vec<LineListener>,
}

impl Collector {
    pub fn new(
        merge_stderr: bool,
        notify: bool,
        on_stdout_line: Option<LineCallback>,
        on_stderr_line: Option<LineCallback>,
        stdout_listeners: Vec<LineListener>,
        stderr_listeners: Vec<LineListener>,
    ) -> Self {
        Self {
            state: Mutex::new(CollectorState {
                buffers: Buffers {
                    exit_code: status::INVALID,
                    ..Buffers::default()
                },
                merge_stderr,
                notify,
                on_stdout_line,
                on_stderr_line,
                stdout_listeners,
                stderr_listeners,
            }),
        }
    }

    /// Record one output line read from `kind`.
    pub fn push(&self, kind: StreamKind, line: String) {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let route = if state.merge_stderr {
            StreamKind::Stdout
        } else {
            kind
        };

        let (listeners, callback, buffer) = match route {
            StreamKind::Stdout => (
                &state.stdout_listeners,
                &mut state.on_stdout_line,
                &mut state.buffers.stdout,
            ),
            StreamKind::Stderr => (
                &state.stderr_listeners,
                &mut state.on_stderr_line,
                &mut state.buffers.stderr,
            ),
        };

        if state.notify {
            for listener in listeners {
                listener(&line);
            }
        }
        if let Some(callback) = callback.as_mut() {
            callback(&line);
        }
        buffer.push(line.clone());
        state.buffers.output.push(line);
    }

    /// Keep the status carried by a marker, if it has one.
    pub fn record_status(&self, code: i32) {
        if code != status::INVALID {
            lock(&self.state).buffers.exit_code = code;
        }
    }

    pub fn exit_code(&self) -> i32 {
        lock(&self.state).buffers.exit_code
    }

    /// Move the gathered lines out. Lines arriving afterwards are not kept.
    pub fn take(&self) -> Buffers {
        let mut state = lock(&self.state);
        let exit_code = state.buffers.exit_code;
        let buffers = mem::take(&mut state.buffers);
        state.buffers.exit_code = exit_code;
        buffers
    }
}

/// The per-stream end of a running command, owned by a stream reader.
pub(crate) struct CommandSink {
    kind: StreamKind,
    token: Uuid,
    done: bool,
    collector: Arc<Collector>,
    watchdog: Arc<Watchdog>,
}

impl CommandSink {
    pub fn new(
        kind: StreamKind,
        token: Uuid,
        collector: Arc<Collector>,
        watchdog: Arc<Watchdog>,
    ) -> Self {
        Self {
            kind,
            token,
            done: false,
            collector,
            watchdog,
        }
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    /// True once this stream has seen its marker or hit end of stream.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn on_line(&mut self, line: String) {
        if self.done {
            trace!(stream = %self.kind, %line, "discarding line after marker");
            return;
        }
        self.collector.push(self.kind, line);
    }

    pub fn on_marker(&mut self, marker: Marker) {
        if marker.token != self.token {
            debug!(stream = %self.kind, token = %marker.token, "ignoring marker of another command");
            return;
        }
        if self.done {
            return;
        }
        self.done = true;
        if marker.has_status() {
            self.collector.record_status(marker.status);
        }
        self.watchdog.signal();
    }

    pub fn on_eof(&mut self) {
        if self.done {
            return;
        }
        debug!(stream = %self.kind, token = %self.token, "stream closed before marker");
        self.done = true;
        self.watchdog.signal();
    }
}
