//! Append-only record of the distinct code snapshots a user has submitted.

use serde::Serialize;

#[derive(Clone, Debug, Default, Serialize)]
pub struct SubmissionHistory {
    entries: Vec<String>,
}

impl SubmissionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `code` unless it equals the most recent entry.
    /// Returns whether an entry was added.
    pub fn record(&mut self, code: &str) -> bool {
        if self.last() == Some(code) {
            return false;
        }
        self.entries.push(code.to_string());
        true
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    /// Oldest first.
    pub fn all(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_submission_is_not_recorded_twice() {
        let mut h = SubmissionHistory::new();
        assert!(h.record("a"));
        assert!(!h.record("a"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn only_immediate_predecessor_is_compared() {
        let mut h = SubmissionHistory::new();
        h.record("a");
        h.record("b");
        h.record("a");
        assert_eq!(h.all(), ["a", "b", "a"]);
        assert_eq!(h.last(), Some("a"));
    }

    #[test]
    fn empty_history_has_no_last() {
        let h = SubmissionHistory::new();
        assert!(h.is_empty());
        assert_eq!(h.last(), None);
    }

    #[test]
    fn empty_string_is_a_valid_first_submission() {
        let mut h = SubmissionHistory::new();
        assert!(h.record(""));
        assert_eq!(h.last(), Some(""));
    }
}
