//! Countdown the submitting thread waits on while a command runs.
//!
//! Each stream reader signals once when it has seen the command's marker.
//! The waiter is released when the count reaches zero, when its timeout
//! elapses, or when another thread aborts the wait.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::lock;

/// Number of stream readers that must signal before a command is complete.
pub const STREAM_READER_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    TimedOut,
    Aborted,
}

#[derive(Debug)]
struct Countdown {
    remaining: usize,
    aborted: bool,
}

#[derive(Debug)]
pub struct Watchdog {
    state: Mutex<Countdown>,
    released: Condvar,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(STREAM_READER_COUNT)
    }
}

impl Watchdog {
    pub fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(Countdown {
                remaining: count,
                aborted: false,
            }),
            released: Condvar::new(),
        }
    }

    /// One stream finished.
    pub fn signal(&self) {
        let mut state = lock(&self.state);
        if state.remaining > 0 {
            state.remaining -= 1;
            if state.remaining == 0 {
                self.released.notify_all();
            }
        }
    }

    /// Release the waiter now. Has no effect once the countdown completed.
    pub fn abort(&self) {
        let mut state = lock(&self.state);
        if state.remaining == 0 {
            return;
        }
        state.aborted = true;
        state.remaining = 0;
        self.released.notify_all();
    }

    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        lock(&self.state).remaining
    }

    /// Block until released or until `timeout` elapses.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let mut state = lock(&self.state);
        match timeout {
            None => {
                while state.remaining > 0 {
                    state = self
                        .released
                        .wait(state)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while state.remaining > 0 {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    let (guard, _) = self
                        .released
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    state = guard;
                }
            }
        }

        if state.aborted {
            WaitOutcome::Aborted
        } else {
            WaitOutcome::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_completes_after_two_signals() {
        let watchdog = Arc::new(Watchdog::default());
        let signaller = watchdog.clone();
        let handle = thread::spawn(move || {
            signaller.signal();
            signaller.signal();
        });
        assert_eq!(watchdog.wait(None), WaitOutcome::Completed);
        handle.join().unwrap();
        assert_eq!(watchdog.remaining(), 0);
    }

    #[test]
    fn test_extra_signals_are_ignored() {
        let watchdog = Watchdog::new(1);
        watchdog.signal();
        watchdog.signal();
        assert_eq!(watchdog.remaining(), 0);
        assert_eq!(watchdog.wait(Some(Duration::ZERO)), WaitOutcome::Completed);
    }

    #[test]
    fn test_times_out_with_one_signal_missing() {
        let watchdog = Watchdog::default();
        watchdog.signal();
        let started = Instant::now();
        assert_eq!(
            watchdog.wait(Some(Duration::from_millis(100))),
            WaitOutcome::TimedOut
        );
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(watchdog.remaining(), 1);
    }

    #[test]
    fn test_abort_releases_waiter() {
        let watchdog = Arc::new(Watchdog::default());
        let aborter = watchdog.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            aborter.abort();
        });
        assert_eq!(watchdog.wait(None), WaitOutcome::Aborted);
        handle.join().unwrap();
    }

    #[test]
    fn test_abort_after_completion_is_noop() {
        let watchdog = Watchdog::default();
        watchdog.signal();
        watchdog.signal();
        watchdog.abort();
        assert_eq!(watchdog.wait(None), WaitOutcome::Completed);
    }
}
