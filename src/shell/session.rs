//! Interactive shell sessions.
//!
//! A [`Shell`] keeps one shell process alive and turns its byte streams back
//! into per-command results. Commands are written to stdin followed by two
//! marker trailers; the stdout and stderr readers each wait for their marker,
//! and the caller blocks until both have been seen, the timeout elapses, or
//! [`Shell::interrupt`] is called.
//!
//! ```no_run
//! use shellmux::shell::{CommandConfig, Shell};
//!
//! # fn example() -> shellmux::Result<()> {
//! let sh = Shell::open("sh")?;
//! let result = sh.run("echo 'Hello, World!'", CommandConfig::default())?;
//! assert!(result.is_success());
//! assert_eq!(result.stdout_text(), "Hello, World!");
//! sh.shutdown();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::collector::{Collector, CommandSink, StreamKind};
use super::command::{CommandConfig, CommandResult, Details, status};
use super::env::{self, EnvironmentMap};
use super::listener::{ListenerId, Listeners, ResultListener};
use super::lock;
use super::marker;
use super::reader::StreamReader;
use super::watchdog::{WaitOutcome, Watchdog};
use crate::error::{Result, ShellError};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lifecycle of a shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Open, no command in progress.
    Idle,
    Running,
    /// Closed for good; `run` returns [`ShellError::Closed`].
    Shutdown,
}

/// Describes how to start a shell.
#[derive(Debug, Clone)]
pub struct ShellBuilder {
    program: String,
    args: Vec<String>,
    env: EnvironmentMap,
    current_dir: Option<PathBuf>,
}

impl ShellBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: EnvironmentMap::new(),
            current_dir: None,
        }
    }

    /// Split a command line such as `"su -mm"` on whitespace into the program
    /// and its arguments.
    pub fn from_command_line(command_line: &str) -> Self {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().unwrap_or_default();
        Self::new(program).args(parts)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env.extend(env::from_pairs(vars));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Program and arguments joined by spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Start the shell process and its stream readers.
    pub fn spawn(&self) -> Result<Shell> {
        let path = self.command_line();
        let spawn_error = |source: io::Error| ShellError::Spawn {
            path: path.clone(),
            source,
        };

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        // Own process group, so a terminal's Ctrl-C reaches us and not the shell
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(spawn_error)?;
        let started = take_pipes(&mut child).and_then(|(stdin, stdout, stderr)| {
            let stdout = StreamReader::spawn(StreamKind::Stdout, stdout)?;
            let stderr = StreamReader::spawn(StreamKind::Stderr, stderr)?;
            Ok((stdin, stdout, stderr))
        });
        let (stdin, stdout, stderr) = match started {
            Ok(parts) => parts,
            Err(source) => {
                reap(&mut child);
                return Err(spawn_error(source));
            }
        };

        let pid = child.id();
        info!(shell = %path, pid, "shell started");

        Ok(Shell {
            inner: Arc::new(Inner {
                path,
                pid,
                serial: Mutex::new(()),
                state: Mutex::new(State::Idle),
                child: Mutex::new(child),
                stdin: Mutex::new(Some(stdin)),
                stdout,
                stderr,
                listeners: Mutex::new(Listeners::default()),
                watchdog: Mutex::new(None),
            }),
        })
    }
}

fn take_pipes(child: &mut Child) -> io::Result<(ChildStdin, ChildStdout, ChildStderr)> {
    let missing = |name: &str| io::Error::other(format!("{name} pipe unavailable"));
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;
    Ok((stdin, stdout, stderr))
}

/// Kill the process if it is still running and collect its status.
fn reap(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    if let Err(e) = child.kill() {
        debug!("failed to kill shell process: {}", e);
    }
    if let Err(e) = child.wait() {
        debug!("failed to reap shell process: {}", e);
    }
}

fn exit_code_of(exit: ExitStatus) -> i32 {
    if let Some(code) = exit.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = exit.signal() {
            return 128 + signal;
        }
    }
    status::INVALID
}

struct Inner {
    path: String,
    pid: u32,
    /// Held for the whole of `run` and `shutdown`.
    serial: Mutex<()>,
    state: Mutex<State>,
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: StreamReader,
    stderr: StreamReader,
    listeners: Mutex<Listeners>,
    /// Watchdog of the command in flight, so `interrupt` can reach it.
    watchdog: Mutex<Option<Arc<Watchdog>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = *self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state == State::Shutdown {
            return;
        }
        debug!(shell = %self.path, pid = self.pid, "dropping shell without shutdown");
        drop(self.stdin.get_mut().unwrap_or_else(PoisonError::into_inner).take());
        reap(self.child.get_mut().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Handle to a running shell. Clones share the same process.
#[derive(Clone)]
pub struct Shell {
    inner: Arc<Inner>,
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("path", &self.inner.path)
            .field("pid", &self.inner.pid)
            .field("state", &self.state())
            .finish()
    }
}

impl Shell {
    /// Start a shell from a command line, e.g. `"sh"` or `"su -mm"`.
    pub fn open(command_line: &str) -> Result<Self> {
        ShellBuilder::from_command_line(command_line).spawn()
    }

    /// The command line this shell was started with.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn state(&self) -> State {
        *lock(&self.inner.state)
    }

    pub fn is_idle(&self) -> bool {
        self.state() == State::Idle
    }

    pub fn is_running(&self) -> bool {
        self.state() == State::Running
    }

    pub fn is_shutdown(&self) -> bool {
        self.state() == State::Shutdown
    }

    /// Whether the shell process is still running, regardless of [`State`].
    pub fn is_alive(&self) -> bool {
        matches!(lock(&self.inner.child).try_wait(), Ok(None))
    }

    /// Listen to every stdout line of commands run with `notify` set.
    pub fn add_stdout_listener(&self, listener: impl Fn(&str) + Send + Sync + 'static) -> ListenerId {
        let mut listeners = lock(&self.inner.listeners);
        let id = listeners.next_id();
        listeners.stdout.insert(id, Arc::new(listener));
        id
    }

    /// Listen to every stderr line of commands run with `notify` set.
    pub fn add_stderr_listener(&self, listener: impl Fn(&str) + Send + Sync + 'static) -> ListenerId {
        let mut listeners = lock(&self.inner.listeners);
        let id = listeners.next_id();
        listeners.stderr.insert(id, Arc::new(listener));
        id
    }

    /// Listen to every result of commands run with `notify` set.
    pub fn add_result_listener(
        &self,
        listener: impl Fn(&CommandResult) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut listeners = lock(&self.inner.listeners);
        let id = listeners.next_id();
        listeners.results.insert(id, Arc::new(listener));
        id
    }

    /// Remove a listener of any kind. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.inner.listeners);
        listeners.stdout.remove(id) || listeners.stderr.remove(id) || listeners.results.remove(id)
    }

    /// Run a command and wait for its result.
    ///
    /// Calls are serialized: a second caller waits until the first command
    /// has finished. Timeouts and interrupts are reported through the exit
    /// code ([`status::TIMEOUT`], [`status::TERMINATED`]) and leave the shell
    /// usable. A command whose shell had already exited is not attempted and
    /// reports [`status::INVALID`].
    ///
    /// Output that does not end in a newline (`printf foo`) is split off the
    /// completion marker that follows it and kept as the stream's last line.
    ///
    /// Line callbacks and line listeners run on the reader threads and must
    /// not call back into this shell. Result listeners run on the calling
    /// thread after the shell is released and may run further commands.
    pub fn run(&self, command: &str, config: CommandConfig) -> Result<CommandResult> {
        let notify = config.notify;
        let (result, result_listeners) = self.run_serialized(command, config)?;
        if notify {
            for listener in &result_listeners {
                listener(&result);
            }
        }
        Ok(result)
    }

    fn run_serialized(
        &self,
        command: &str,
        config: CommandConfig,
    ) -> Result<(CommandResult, Vec<ResultListener>)> {
        let inner = &*self.inner;
        let _serial = lock(&inner.serial);
        if self.is_shutdown() {
            return Err(ShellError::Closed);
        }

        let CommandConfig {
            token,
            merge_stderr,
            on_stdout_line,
            on_stderr_line,
            on_cancelled,
            on_timeout,
            timeout,
            notify,
        } = config;

        let (stdout_listeners, stderr_listeners, result_listeners) = {
            let listeners = lock(&inner.listeners);
            (
                listeners.stdout.snapshot(),
                listeners.stderr.snapshot(),
                listeners.results.snapshot(),
            )
        };

        let collector = Arc::new(Collector::new(
            merge_stderr,
            notify,
            on_stdout_line,
            on_stderr_line,
            stdout_listeners,
            stderr_listeners,
        ));
        let watchdog = Arc::new(Watchdog::default());
        *lock(&inner.watchdog) = Some(watchdog.clone());
        let stdout_was_closed = inner.stdout.attach(CommandSink::new(
            StreamKind::Stdout,
            token,
            collector.clone(),
            watchdog.clone(),
        ));
        let stderr_was_closed = inner.stderr.attach(CommandSink::new(
            StreamKind::Stderr,
            token,
            collector.clone(),
            watchdog.clone(),
        ));
        let exited_before = stdout_was_closed && stderr_was_closed;

        let started_at = Utc::now();
        let started = Instant::now();
        self.set_state(State::Running);
        if exited_before {
            warn!(shell = %inner.path, %token, command, "shell has exited, command not run");
        } else {
            debug!(shell = %inner.path, %token, command, "running command");
            self.write_lines(&[
                command,
                &marker::stdout_trailer(token),
                &marker::stderr_trailer(token),
            ]);
        }
        let outcome = watchdog.wait(timeout);

        *lock(&inner.watchdog) = None;
        self.set_state(State::Idle);

        let exit_code = match outcome {
            WaitOutcome::Completed => {
                inner.stdout.detach();
                inner.stderr.detach();
                match collector.exit_code() {
                    // A stale exit status must not stand in for a command that never ran
                    status::INVALID if exited_before => status::INVALID,
                    status::INVALID => self.exit_code_if_exited().unwrap_or(status::INVALID),
                    code => code,
                }
            }
            WaitOutcome::TimedOut => {
                inner.stdout.abandon();
                inner.stderr.abandon();
                warn!(
                    shell = %inner.path,
                    %token,
                    ?timeout,
                    draining = inner.stdout.is_draining() || inner.stderr.is_draining(),
                    "command timed out"
                );
                if let Some(on_timeout) = on_timeout {
                    on_timeout();
                }
                status::TIMEOUT
            }
            WaitOutcome::Aborted => {
                inner.stdout.abandon();
                inner.stderr.abandon();
                info!(shell = %inner.path, %token, "command interrupted");
                if let Some(on_cancelled) = on_cancelled {
                    on_cancelled();
                }
                status::TERMINATED
            }
        };

        if exit_code != status::SUCCESS && !exited_before {
            // The trailers reset `$?`; restore the command's status in a subshell
            self.write_lines(&[&format!("$(exit {exit_code})")]);
        }

        let buffers = collector.take();
        let elapsed = started.elapsed();
        let result = CommandResult {
            stdout: buffers.stdout,
            stderr: buffers.stderr,
            output: buffers.output,
            exit_code,
            details: Details {
                token,
                command: command.to_string(),
                started_at,
                ended_at: Utc::now(),
                elapsed,
            },
        };
        debug!(
            shell = %inner.path,
            %token,
            exit_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "command finished"
        );

        Ok((result, result_listeners))
    }

    /// [`run`](Self::run) on tokio's blocking pool.
    pub async fn run_async(
        &self,
        command: impl Into<String>,
        config: CommandConfig,
    ) -> Result<CommandResult> {
        let shell = self.clone();
        let command = command.into();
        tokio::task::spawn_blocking(move || shell.run(&command, config))
            .await
            .map_err(|e| ShellError::Worker(e.to_string()))?
    }

    /// Stop waiting for the command in flight, if any. The process itself
    /// keeps running; its remaining output is discarded.
    pub fn interrupt(&self) {
        if let Some(watchdog) = lock(&self.inner.watchdog).as_ref() {
            watchdog.abort();
        }
    }

    /// Check for root by running `id -u`.
    pub fn is_root(&self) -> Result<bool> {
        let result = self.run(
            "id -u",
            CommandConfig::silent().timeout(Duration::from_secs(5)),
        )?;
        Ok(result.is_success() && result.stdout.first().is_some_and(|uid| uid.trim() == "0"))
    }

    /// Exit the shell and release its process. Later calls do nothing.
    ///
    /// Waits for the process to exit, so a command that is still running
    /// after a timeout delays the shutdown until it finishes.
    pub fn shutdown(&self) {
        let inner = &*self.inner;
        let _serial = lock(&inner.serial);
        if self.is_shutdown() {
            return;
        }

        info!(shell = %inner.path, pid = inner.pid, "shutting down shell");
        self.write_lines(&["exit"]);
        drop(lock(&inner.stdin).take());
        self.wait_for_exit();

        {
            let mut listeners = lock(&inner.listeners);
            listeners.stdout.clear();
            listeners.stderr.clear();
        }
        inner.stdout.join();
        inner.stderr.join();
        self.set_state(State::Shutdown);
    }

    /// Wait for the process to exit without holding the child lock between
    /// polls, so `is_alive` stays responsive.
    fn wait_for_exit(&self) {
        loop {
            match lock(&self.inner.child).try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => {}
                Err(e) => {
                    warn!(shell = %self.inner.path, "failed to wait for shell: {}", e);
                    return;
                }
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    fn set_state(&self, state: State) {
        *lock(&self.inner.state) = state;
    }

    /// Exit status of the shell process once both of its streams are closed.
    fn exit_code_if_exited(&self) -> Option<i32> {
        if !(self.inner.stdout.is_closed() && self.inner.stderr.is_closed()) {
            return None;
        }
        match lock(&self.inner.child).wait() {
            Ok(exit) => Some(exit_code_of(exit)),
            Err(e) => {
                warn!(shell = %self.inner.path, "failed to read exit status: {}", e);
                None
            }
        }
    }

    /// Write lines to the shell's stdin. Failures are logged and otherwise
    /// ignored.
    fn write_lines(&self, lines: &[&str]) {
        let mut stdin = lock(&self.inner.stdin);
        let Some(pipe) = stdin.as_mut() else {
            debug!(shell = %self.inner.path, "stdin already closed");
            return;
        };

        let mut payload = String::new();
        for line in lines {
            payload.push_str(line);
            payload.push('\n');
        }

        if let Err(e) = pipe.write_all(payload.as_bytes()).and_then(|()| pipe.flush()) {
            if e.kind() == ErrorKind::BrokenPipe {
                debug!(shell = %self.inner.path, "shell stdin closed: {}", e);
            } else {
                warn!(shell = %self.inner.path, "failed to write to shell: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_from_command_line() {
        let builder = ShellBuilder::from_command_line("  su  -mm ");
        assert_eq!(builder.program, "su");
        assert_eq!(builder.args, vec!["-mm"]);
        assert_eq!(builder.command_line(), "su -mm");
    }

    #[test]
    fn test_builder_collects_env_and_args() {
        let builder = ShellBuilder::new("sh")
            .arg("-i")
            .args(["-x"])
            .env("A", "1")
            .envs([("B", "2")])
            .current_dir("/");
        assert_eq!(builder.command_line(), "sh -i -x");
        assert_eq!(builder.env.len(), 2);
        assert_eq!(builder.current_dir, Some(PathBuf::from("/")));
    }

    #[test]
    fn test_spawn_failure_reports_path() {
        let err = ShellBuilder::new("/definitely/not/a/shell").spawn().unwrap_err();
        match err {
            ShellError::Spawn { path, .. } => assert_eq!(path, "/definitely/not/a/shell"),
            other => panic!("Expected Spawn error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_of_signal() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_code_of(ExitStatus::from_raw(7 << 8)), 7);
        assert_eq!(exit_code_of(ExitStatus::from_raw(9)), 137);
    }
}
