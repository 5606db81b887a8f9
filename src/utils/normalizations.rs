use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

pub fn normalize_name(name: &str) -> String {
    name
        .trim()
        .nfkc()
        .collect::<String>()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

pub fn normalize_path(path: &Path) -> PathBuf {
    path.to_string_lossy()
        .to_lowercase()
        .replace('\\', "/")
        .into()
}

const MAX_FILENAME_LENGTH: usize = 200;

/// Replaces characters illegal in filenames on at least one common
/// filesystem, strips leading/trailing whitespace and dots, then truncates.
/// An empty result becomes `Unknown` so canonical paths are never degenerate.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if (c as u32) <= 0x1f => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');
    let truncated: String = trimmed.chars().take(MAX_FILENAME_LENGTH).collect();

    if truncated.is_empty() {
        "Unknown".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_reserved_characters() {
        assert_eq!(sanitize_filename("AC/DC: Thunder?"), "AC_DC_ Thunder_");
    }

    #[test]
    fn strips_leading_and_trailing_dots_and_whitespace() {
        assert_eq!(sanitize_filename("  .hidden name.  "), "hidden name");
    }

    #[test]
    fn truncates_to_max_length() {
        let long = "a".repeat(300);
        assert_eq!(sanitize_filename(&long).len(), MAX_FILENAME_LENGTH);
    }

    #[test]
    fn empty_result_becomes_unknown() {
        assert_eq!(sanitize_filename("..."), "Unknown");
        assert_eq!(sanitize_filename(""), "Unknown");
    }

    #[test]
    fn control_characters_are_replaced() {
        assert_eq!(sanitize_filename("a\u{0007}b"), "a_b");
    }
}