use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Status of one test-execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Tests ran and every assertion held.
    Passed,
    /// Tests ran and at least one assertion did not hold.
    Failed,
    /// The process could not start, timed out, or there was nothing to run it on.
    Error,
    /// No test artifacts were found.
    Skipped,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Error => "error",
            TestStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running a test command. Immutable once built.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    /// Label of what produced this outcome (framework or runner mode).
    pub name: String,
    pub status: TestStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub details: BTreeMap<String, u64>,
}

impl TestOutcome {
    pub fn new(name: impl Into<String>, status: TestStatus) -> Self {
        Self {
            name: name.into(),
            status,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            details: BTreeMap::new(),
        }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, TestStatus::Error).with_stderr(message)
    }

    pub fn skipped(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, TestStatus::Skipped).with_stderr(message)
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_details(mut self, details: BTreeMap<String, u64>) -> Self {
        self.details = details;
        self
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    /// Text to diagnose: stderr when present, stdout otherwise.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }

    /// True when either stream contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text_prefers_stderr() {
        let outcome = TestOutcome::new("pytest", TestStatus::Failed)
            .with_stdout("collected 1 item")
            .with_stderr("NameError: name 'x' is not defined");
        assert!(outcome.error_text().starts_with("NameError"));
    }

    #[test]
    fn test_error_text_falls_back_to_stdout() {
        let outcome = TestOutcome::new("pytest", TestStatus::Failed)
            .with_stdout("E   AssertionError")
            .with_stderr("  \n");
        assert_eq!(outcome.error_text(), "E   AssertionError");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TestStatus::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
