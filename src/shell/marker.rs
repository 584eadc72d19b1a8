//! Completion markers.
//!
//! Every command is followed by two trailer lines that echo a per-command
//! token, one on stdout (with the command's `$?`) and one on stderr. A reader
//! that sees `<token>[ <status>]` knows the command is done on that stream.

use std::sync::LazyLock;

use regex_lite::Regex;
use uuid::Uuid;

use super::command::status;

// <UUID><optional whitespace><optional exit status>
static MARKER_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^([a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12})\s?([0-9]{1,3})?$",
    )
    .ok()
});

/// A parsed marker line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub token: Uuid,
    /// Exit status carried by the marker, or [`status::INVALID`] if none.
    pub status: i32,
}

impl Marker {
    /// Parse a line read from the shell. Returns `None` for ordinary output.
    pub fn parse(line: &str) -> Option<Self> {
        let captures = MARKER_PATTERN.as_ref()?.captures(line)?;
        let token = Uuid::parse_str(captures.get(1)?.as_str()).ok()?;
        let status = captures
            .get(2)
            .and_then(|code| code.as_str().parse::<i32>().ok())
            .unwrap_or(status::INVALID);
        Some(Self { token, status })
    }

    /// True if the marker carries a real exit status.
    pub fn has_status(&self) -> bool {
        self.status != status::INVALID
    }
}

/// Split a line on which command output without a final newline was
/// followed by the trailer for `token`: `"foo<token> 0"` gives `"foo"` and
/// the marker. Only `token` is looked for, so other UUIDs in output are
/// left alone.
pub fn split_trailing(line: &str, token: Uuid) -> Option<(&str, Marker)> {
    let at = line.rfind(&token.to_string())?;
    if at == 0 {
        return None;
    }
    let marker = Marker::parse(&line[at..])?;
    (marker.token == token).then(|| (&line[..at], marker))
}

/// Trailer that prints the token and the previous command's status on stdout.
pub fn stdout_trailer(token: Uuid) -> String {
    format!("echo '{token}' $?")
}

/// Trailer that prints the bare token on stderr.
pub fn stderr_trailer(token: Uuid) -> String {
    format!("echo '{token}' >&2")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_marker_with_status() {
        let token = Uuid::new_v4();
        let marker = Marker::parse(&format!("{token} 0")).unwrap();
        assert_eq!(marker.token, token);
        assert_eq!(marker.status, 0);
        assert!(marker.has_status());

        let marker = Marker::parse(&format!("{token} 127")).unwrap();
        assert_eq!(marker.status, 127);
    }

    #[test]
    fn test_parse_bare_marker() {
        let token = Uuid::new_v4();
        let marker = Marker::parse(&token.to_string()).unwrap();
        assert_eq!(marker.token, token);
        assert_eq!(marker.status, status::INVALID);
        assert!(!marker.has_status());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let token = Uuid::new_v4();
        let upper = token.to_string().to_uppercase();
        let marker = Marker::parse(&format!("{upper} 3")).unwrap();
        assert_eq!(marker.token, token);
        assert_eq!(marker.status, 3);
    }

    #[test]
    fn test_ordinary_lines_are_not_markers() {
        let token = Uuid::new_v4();
        assert!(Marker::parse("hello").is_none());
        assert!(Marker::parse("").is_none());
        // Four digit status does not fit the pattern
        assert!(Marker::parse(&format!("{token} 1000")).is_none());
        // Surrounding text
        assert!(Marker::parse(&format!("x{token}")).is_none());
        assert!(Marker::parse(&format!("{token} 1 extra")).is_none());
        // Truncated uuid
        assert!(Marker::parse("0123abcd-0000-0000-0000-00000000").is_none());
    }

    #[test]
    fn test_split_trailing_marker() {
        let token = Uuid::new_v4();
        let line = format!("foo{token} 0");
        let (output, marker) = split_trailing(&line, token).unwrap();
        assert_eq!(output, "foo");
        assert_eq!(marker.status, 0);

        let line = format!("err{token}");
        let (output, marker) = split_trailing(&line, token).unwrap();
        assert_eq!(output, "err");
        assert!(!marker.has_status());

        // A whole-line marker is not a split
        assert!(split_trailing(&format!("{token} 0"), token).is_none());
        // Somebody else's token
        assert!(split_trailing(&format!("foo{} 0", Uuid::new_v4()), token).is_none());
        // Token followed by more output
        assert!(split_trailing(&format!("foo{token} 0 bar"), token).is_none());
    }

    #[test]
    fn test_trailers_echo_the_token() {
        let token = Uuid::new_v4();
        assert_eq!(stdout_trailer(token), format!("echo '{token}' $?"));
        assert_eq!(stderr_trailer(token), format!("echo '{token}' >&2"));
    }
}
