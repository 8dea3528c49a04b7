//! Task file conventions.
//!
//! A task file is plain markdown: a `# <name>` heading and a line carrying a
//! literal checkbox marker. Only the first marker is ever toggled; a file is
//! considered complete as soon as any checked marker is present.

use once_cell::sync::Lazy;
use regex::Regex;

pub const UNCHECKED_MARKER: &str = "[ ]";
pub const CHECKED_MARKER: &str = "[x]";
pub const TASK_FILE_EXTENSION: &str = "md";

static INVALID_FILE_NAME_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid file name regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Returns whether the content carries a checked marker.
pub fn is_checked(content: &str) -> bool {
    content.contains(CHECKED_MARKER)
}

/// Flips the first marker towards `completed`.
///
/// Returns the rewritten content with trailing whitespace trimmed, or `None`
/// when no marker in the opposite state exists (nothing to write).
pub fn apply_completion(content: &str, completed: bool) -> Option<String> {
    let (from, to) = if completed {
        (UNCHECKED_MARKER, CHECKED_MARKER)
    } else {
        (CHECKED_MARKER, UNCHECKED_MARKER)
    };
    if !content.contains(from) {
        return None;
    }
    Some(content.replacen(from, to, 1).trim_end().to_string())
}

/// Initial content of a freshly created task file.
pub fn task_file_template(name: &str) -> String {
    format!("# {name}\n\n{UNCHECKED_MARKER} Task status")
}

/// Derives a `.md` file name from a user supplied task name.
///
/// Path separators and characters rejected by common filesystems become
/// `_`; runs of whitespace collapse to one space. Returns `None` for names
/// that are blank after normalization.
pub fn task_file_name(name: &str) -> Option<String> {
    let collapsed = WHITESPACE_RE.replace_all(name, " ");
    let replaced = INVALID_FILE_NAME_CHARS_RE.replace_all(&collapsed, "_");
    let stem = replaced.trim().trim_end_matches('.');
    let stem = stem
        .strip_suffix(".md")
        .map(str::trim_end)
        .unwrap_or(stem);
    if stem.is_empty() || stem.chars().all(|ch| ch == '_' || ch == '.') {
        return None;
    }
    Some(format!("{stem}.{TASK_FILE_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::{apply_completion, is_checked, task_file_name, task_file_template};

    #[test]
    fn apply_completion_toggles_first_marker_only() {
        let content = "# T\n\n[ ] one\n[ ] two\n";
        let checked = apply_completion(content, true).expect("unchecked marker exists");
        assert_eq!(checked, "# T\n\n[x] one\n[ ] two");

        let unchecked = apply_completion(&checked, false).expect("checked marker exists");
        assert_eq!(unchecked, "# T\n\n[ ] one\n[ ] two");
    }

    #[test]
    fn apply_completion_without_matching_marker_is_none() {
        assert!(apply_completion("# T\n\n[x] done", true).is_none());
        assert!(apply_completion("no markers", false).is_none());
    }

    #[test]
    fn template_starts_unchecked() {
        let content = task_file_template("Ship it");
        assert!(content.starts_with("# Ship it\n"));
        assert!(!is_checked(&content));
        assert!(apply_completion(&content, true).is_some());
    }

    #[test]
    fn task_file_name_sanitizes_and_rejects_blank() {
        assert_eq!(task_file_name("Fix: a/b").as_deref(), Some("Fix_ a_b.md"));
        assert_eq!(task_file_name("  plan\tnext  ").as_deref(), Some("plan next.md"));
        assert_eq!(task_file_name("notes.md").as_deref(), Some("notes.md"));
        assert!(task_file_name("   ").is_none());
        assert!(task_file_name("/").is_none());
    }
}
