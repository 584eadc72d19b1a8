//! Background readers for the shell's stdout and stderr.
//!
//! Each reader owns one pipe and a thread doing blocking line reads. Lines go
//! to whichever [`CommandSink`] is attached. After a command is abandoned
//! (timeout or interrupt) a reader can be put in drain mode, in which it
//! discards everything up to the abandoned command's marker so that late
//! output never ends up in the next command's result.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::collector::{CommandSink, StreamKind};
use super::lock;
use super::marker::{self, Marker};

#[derive(Default)]
struct ReaderState {
    sink: Option<CommandSink>,
    /// Token of an abandoned command whose marker has not been seen yet.
    drain: Option<Uuid>,
    closed: bool,
}

impl ReaderState {
    fn dispatch(&mut self, kind: StreamKind, line: String) {
        let partial = self
            .expected_token()
            .and_then(|token| marker::split_trailing(&line, token))
            .map(|(output, marker)| (output.to_string(), marker));
        if let Some((output, marker)) = partial {
            trace!(stream = %kind, "marker trailing unterminated output");
            self.dispatch_line(kind, output);
            self.dispatch_marker(kind, marker);
            return;
        }

        match Marker::parse(&line) {
            Some(marker) => self.dispatch_marker(kind, marker),
            None => self.dispatch_line(kind, line),
        }
    }

    /// The token whose marker this stream is waiting for.
    fn expected_token(&self) -> Option<Uuid> {
        self.drain.or_else(|| self.sink.as_ref().map(CommandSink::token))
    }

    fn dispatch_line(&mut self, kind: StreamKind, line: String) {
        if self.drain.is_some() {
            trace!(stream = %kind, %line, "draining late output");
            return;
        }
        match self.sink.as_mut() {
            Some(sink) => sink.on_line(line),
            None => debug!(stream = %kind, %line, "output with no command attached"),
        }
    }

    fn dispatch_marker(&mut self, kind: StreamKind, marker: Marker) {
        if let Some(abandoned) = self.drain {
            if marker.token == abandoned {
                debug!(stream = %kind, token = %abandoned, "drained abandoned command");
                self.drain = None;
            } else {
                trace!(stream = %kind, token = %marker.token, "draining late marker");
            }
            return;
        }
        match self.sink.as_mut() {
            Some(sink) => sink.on_marker(marker),
            None => debug!(stream = %kind, token = %marker.token, "marker with no command attached"),
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.drain = None;
        if let Some(sink) = self.sink.as_mut() {
            sink.on_eof();
        }
    }
}

pub(crate) struct StreamReader {
    kind: StreamKind,
    state: Arc<Mutex<ReaderState>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StreamReader {
    /// Start a thread reading lines from `stream`.
    pub fn spawn<R>(kind: StreamKind, stream: R) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let state = Arc::new(Mutex::new(ReaderState::default()));
        let thread_state = state.clone();

        let handle = thread::Builder::new()
            .name(format!("shellmux-{kind}"))
            .spawn(move || read_lines(kind, stream, &thread_state))?;

        Ok(Self {
            kind,
            state,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Attach the sink of a new command. If the stream is already closed the
    /// sink completes immediately and `true` is returned.
    pub fn attach(&self, mut sink: CommandSink) -> bool {
        let mut state = lock(&self.state);
        let was_closed = state.closed;
        if was_closed {
            sink.on_eof();
        }
        state.sink = Some(sink);
        was_closed
    }

    /// Detach the sink after the command completed normally.
    pub fn detach(&self) {
        lock(&self.state).sink = None;
    }

    /// Detach the sink of a command that is no longer waited for. If its
    /// marker has not arrived yet, discard output until it does.
    pub fn abandon(&self) {
        let mut state = lock(&self.state);
        if let Some(sink) = state.sink.take() {
            if !sink.is_done() && !state.closed {
                debug!(stream = %self.kind, token = %sink.token(), "draining until abandoned marker");
                state.drain = Some(sink.token());
            }
        }
    }

    pub fn is_draining(&self) -> bool {
        lock(&self.state).drain.is_some()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Wait for the reader thread to reach end of stream.
    pub fn join(&self) {
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(stream = %self.kind, "reader thread panicked");
            }
        }
    }
}

fn read_lines<R: Read>(kind: StreamKind, stream: R, state: &Mutex<ReaderState>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&buf);
                lock(state).dispatch(kind, line);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(stream = %kind, "read error: {}", e);
                break;
            }
        }
    }

    debug!(stream = %kind, "end of stream");
    lock(state).close();
}

/// Decode one raw line, replacing invalid UTF-8 and dropping the line ending.
fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
