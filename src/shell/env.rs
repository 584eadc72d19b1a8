//! Environment overlays for spawned shells.
//!
//! A shell inherits the current process environment; the overlay is applied
//! on top of it.

use std::collections::BTreeMap;

/// Variables added to (or overriding) the inherited environment.
pub type EnvironmentMap = BTreeMap<String, String>;

/// Build an overlay from `KEY=VALUE` strings.
///
/// Entries without `=` or with an empty key are skipped. Only the first `=`
/// separates key and value, so values may contain `=`.
pub fn parse_assignments<I, S>(assignments: I) -> EnvironmentMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    assignments
        .into_iter()
        .filter_map(|entry| {
            let (key, value) = entry.as_ref().split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Build an overlay from key/value pairs.
pub fn from_pairs<I, K, V>(pairs: I) -> EnvironmentMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignments() {
        let env = parse_assignments(["A=1", "B=two words", "C=x=y", "bogus", "=nokey", "D="]);
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
        assert_eq!(env.get("B").map(String::as_str), Some("two words"));
        assert_eq!(env.get("C").map(String::as_str), Some("x=y"));
        assert_eq!(env.get("D").map(String::as_str), Some(""));
        assert_eq!(env.len(), 4);
    }

    #[test]
    fn test_later_assignments_win() {
        let env = parse_assignments(vec!["A=1".to_string(), "A=2".to_string()]);
        assert_eq!(env["A"], "2");
    }

    #[test]
    fn test_from_pairs() {
        let env = from_pairs([("PATH", "/system/bin"), ("HOME", "/data")]);
        assert_eq!(env["PATH"], "/system/bin");
        assert_eq!(env.len(), 2);
    }
}
