//! Bounded log of recently finished commands.
//!
//! Register [`ResultHistory::listener`] on a shell to record every result
//! that is run with `notify` set.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::command::CommandResult;
use super::lock;

/// One finished command, reduced to what a history view needs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub command: String,
    /// Combined output with ANSI escape codes removed.
    pub output: String,
    pub exit_code: i32,
}

impl From<&CommandResult> for HistoryEntry {
    fn from(result: &CommandResult) -> Self {
        Self {
            command: result.details.command.clone(),
            output: strip_ansi_codes(&result.output_text()),
            exit_code: result.exit_code,
        }
    }
}

pub struct ResultHistory {
    entries: VecDeque<HistoryEntry>,
    max_len: usize,
}

impl Default for ResultHistory {
    fn default() -> Self {
        Self::new(50)
    }
}

impl ResultHistory {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    /// A result listener that appends to `history`.
    pub fn listener(history: Arc<Mutex<ResultHistory>>) -> impl Fn(&CommandResult) + Send + Sync + 'static {
        move |result| lock(&history).record(result)
    }

    pub fn record(&mut self, result: &CommandResult) {
        self.push(HistoryEntry::from(result));
    }

    /// Add an entry, dropping the oldest one when full.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.max_len == 0 {
            return;
        }
        while self.entries.len() >= self.max_len {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&HistoryEntry> {
        let start = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(start).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Strip ANSI escape codes (CSI and OSC sequences) from text.
fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\x1b' {
            result.push(ch);
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                // CSI ends at its first letter
                for next in chars.by_ref() {
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                // OSC ends at BEL or ST (ESC \)
                while let Some(next) = chars.next() {
                    if next == '\x07' {
                        break;
                    }
                    if next == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::shell::Details;

    fn result(command: &str, output: &[&str], exit_code: i32) -> CommandResult {
        let now = Utc::now();
        CommandResult {
            stdout: output.iter().map(|s| s.to_string()).collect(),
            stderr: Vec::new(),
            output: output.iter().map(|s| s.to_string()).collect(),
            exit_code,
            details: Details {
                token: Uuid::new_v4(),
                command: command.to_string(),
                started_at: now,
                ended_at: now,
                elapsed: Duration::ZERO,
            },
        }
    }

    #[test]
    fn test_strip_ansi_codes() {
        assert_eq!(strip_ansi_codes("\x1b[31mRed text\x1b[0m Normal text"), "Red text Normal text");
        assert_eq!(strip_ansi_codes("Line 1\x1b[2J\x1b[HCleared"), "Line 1Cleared");
        assert_eq!(strip_ansi_codes("Before\x1b]7;file://host/path\x07After"), "BeforeAfter");
        assert_eq!(strip_ansi_codes("Before\x1b]0;title\x1b\\After"), "BeforeAfter");
        assert_eq!(strip_ansi_codes("Plain text"), "Plain text");
    }

    #[test]
    fn test_record_strips_ansi() {
        let mut history = ResultHistory::new(10);
        history.record(&result("ls --color", &["\x1b[34mdir\x1b[0m", "file"], 0));

        let entry = &history.recent(1)[0];
        assert_eq!(entry.command, "ls --color");
        assert_eq!(entry.output, "dir\nfile");
        assert_eq!(entry.exit_code, 0);
    }

    #[test]
    fn test_bounded_history() {
        let mut history = ResultHistory::new(3);
        for i in 1..=4 {
            history.record(&result(&format!("cmd{i}"), &[], 0));
        }

        assert_eq!(history.len(), 3);
        let commands: Vec<_> = history.entries().map(|e| e.command.as_str()).collect();
        assert_eq!(commands, vec!["cmd2", "cmd3", "cmd4"]);
    }

    #[test]
    fn test_recent() {
        let mut history = ResultHistory::new(10);
        for i in 1..=4 {
            history.record(&result(&format!("cmd{i}"), &[], i));
        }

        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].command, "cmd3");
        assert_eq!(recent[1].exit_code, 4);
        assert_eq!(history.recent(10).len(), 4);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut history = ResultHistory::new(0);
        history.record(&result("cmd", &[], 0));
        assert!(history.is_empty());
    }

    #[test]
    fn test_listener_records_into_shared_history() {
        let history = Arc::new(Mutex::new(ResultHistory::default()));
        let listener = ResultHistory::listener(history.clone());
        listener(&result("echo hi", &["hi"], 0));
        listener(&result("false", &[], 1));

        let history = history.lock().unwrap();
        assert_eq!(history.len(), 2);
        let codes: Vec<_> = history.entries().map(|e| e.exit_code).collect();
        assert_eq!(codes, vec![0, 1]);
    }
}
