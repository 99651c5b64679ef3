//! Terminal-status parsing and failure-context extraction

use lazy_static::lazy_static;
use regex::Regex;

/// Literal marker for a completed task in raw status text
pub const STATUS_COMPLETED: &str = "Status:     completed";

/// Literal marker for a failed task in raw status text
pub const STATUS_FAILED: &str = "Status:     failed";

/// Window of accumulated output scanned for error shapes
const ERROR_SCAN_CHARS: usize = 500;

/// Maximum length of an extracted error context
const ERROR_CONTEXT_CHARS: usize = 200;

/// Terminal state reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Completed,
    Failed,
}

impl TerminalStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalStatus::Completed)
    }
}

/// Detect a terminal status marker in raw status text.
pub fn parse_terminal_status(status_text: &str) -> Option<TerminalStatus> {
    if status_text.contains(STATUS_COMPLETED) {
        Some(TerminalStatus::Completed)
    } else if status_text.contains(STATUS_FAILED) {
        Some(TerminalStatus::Failed)
    } else {
        None
    }
}

lazy_static! {
    static ref STATUS_ERROR: Regex = Regex::new(r"Error:\s*(.+)").unwrap();
    static ref OUTPUT_ERROR_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"Error:\s*(.+)").unwrap(),
        Regex::new(r"(?i)error:\s*(.+)").unwrap(),
        Regex::new(r"(?i)failed:\s*(.+)").unwrap(),
        Regex::new(r"(?i)Exception:\s*(.+)").unwrap(),
    ];
}

/// Best-effort failure context for a task that reached a failed status.
///
/// Prefers an explicit `Error:` line in the status text, then scans the
/// tail of the accumulated output for common error shapes, and finally
/// falls back to the raw output tail.
pub fn extract_error_context(status_text: &str, output: &str) -> String {
    if let Some(m) = STATUS_ERROR.captures(status_text).and_then(|c| c.get(1)) {
        return m.as_str().trim().to_string();
    }

    let last_output = tail_chars(output, ERROR_SCAN_CHARS).trim();
    if last_output.is_empty() {
        return "Task failed with no output".to_string();
    }

    for pattern in OUTPUT_ERROR_PATTERNS.iter() {
        if let Some(m) = pattern.captures(last_output).and_then(|c| c.get(1)) {
            return truncate_chars(m.as_str(), ERROR_CONTEXT_CHARS);
        }
    }

    format!(
        "Task failed. Last output: {}",
        tail_chars(last_output, ERROR_CONTEXT_CHARS)
    )
}

/// Last `n` chars of `s` (n >= 1), on char boundaries.
fn tail_chars(s: &str, n: usize) -> &str {
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// First `n` chars of `s`, on char boundaries.
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_terminal_status() {
        assert_eq!(
            parse_terminal_status("Task: t1\nStatus:     completed\n"),
            Some(TerminalStatus::Completed)
        );
        assert_eq!(
            parse_terminal_status("Status:     failed\nError: disk full"),
            Some(TerminalStatus::Failed)
        );
        assert_eq!(parse_terminal_status("Status:     running"), None);
        // Loose spacing does not match the marker
        assert_eq!(parse_terminal_status("Status: completed"), None);
    }

    #[test]
    fn test_error_from_status_text() {
        let context =
            extract_error_context("Status:     failed\nError: disk full", "some output");
        assert_eq!(context, "disk full");
    }

    #[test]
    fn test_error_from_output_tail() {
        let output = "step 1 ok\nstep 2 ok\nError: compile failure in main.rs\n";
        let context = extract_error_context("Status:     failed", output);
        assert_eq!(context, "compile failure in main.rs");
    }

    #[test]
    fn test_error_patterns_case_insensitive() {
        let output = "line\nexception: index out of range\n";
        let context = extract_error_context("Status:     failed", output);
        assert_eq!(context, "index out of range");
    }

    #[test]
    fn test_fallback_is_output_suffix() {
        let mut output = "x".repeat(600);
        output.push_str("...connection reset");
        let context = extract_error_context("Status:     failed", &output);

        assert!(context.starts_with("Task failed. Last output: "));
        assert!(context.contains("connection reset"));
    }

    #[test]
    fn test_no_output_message() {
        let context = extract_error_context("Status:     failed", "");
        assert_eq!(context, "Task failed with no output");

        let context = extract_error_context("Status:     failed", "   \n  ");
        assert_eq!(context, "Task failed with no output");
    }

    #[test]
    fn test_match_truncated_to_200_chars() {
        let output = format!("Error: {}", "e".repeat(400));
        let context = extract_error_context("Status:     failed", &output);
        assert_eq!(context.chars().count(), 200);
    }
}
