//! Path handling between host-relative paths and the backing store.
//!
//! The host hands out paths relative to the virtualization root using `\`.
//! Both `\` and `/` are accepted here so the engine behaves the same on
//! every platform.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Separator used in paths handed back to the host.
pub const VIRTUAL_SEP: char = '\\';

const SEPARATORS: [char; 2] = ['\\', '/'];

/// How names are matched against the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseSensitivity {
    #[default]
    Insensitive,
    Sensitive,
}

/// Join a host-relative path onto the backing store root.
///
/// Separators are normalized and empty components dropped. Nothing else is
/// canonicalized: symlinks and `..` are left for the file system to resolve.
pub fn resolve(backing_root: &Path, relative_path: &str) -> PathBuf {
    let mut full = backing_root.to_path_buf();
    for component in components(relative_path) {
        full.push(component);
    }
    full
}

/// Non-empty components of a host-relative path.
pub fn components(relative_path: &str) -> impl Iterator<Item = &str> {
    relative_path
        .split(&SEPARATORS[..])
        .filter(|component| !component.is_empty())
}

/// Split a host-relative path into its parent directory and leaf name.
///
/// The parent keeps the host's spelling. A path without separators has an
/// empty parent (the root).
pub fn split_parent(relative_path: &str) -> (&str, &str) {
    let trimmed = relative_path.trim_end_matches(&SEPARATORS[..]);
    match trimmed.rfind(&SEPARATORS[..]) {
        Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
        None => ("", trimmed),
    }
}

/// Join a parent path and a child name using the host separator.
pub fn join_virtual(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches(&SEPARATORS[..]);
    if parent.is_empty() {
        name.to_string()
    } else {
        let mut joined = String::with_capacity(parent.len() + name.len() + 1);
        joined.push_str(parent);
        joined.push(VIRTUAL_SEP);
        joined.push_str(name);
        joined
    }
}

/// Fold one character for [`compare_names`].
#[inline]
pub(crate) fn fold(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        // Multi-character expansions (e.g. `ß`) keep the original character.
        _ => c,
    }
}

/// Case-insensitive ordinal comparison of two file names.
///
/// This is the one collation used for sorting enumeration snapshots and for
/// insensitive name matching. The host merges our listings with its own and
/// assumes both are in this order.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.chars().map(fold).cmp(b.chars().map(fold))
}

/// Whether `name` starts with `prefix` under [`compare_names`].
pub fn has_name_prefix(name: &str, prefix: &str) -> bool {
    let mut name_chars = name.chars().map(fold);
    prefix
        .chars()
        .map(fold)
        .all(|p| name_chars.next() == Some(p))
}

/// Compare two names for equality.
pub fn names_equal(a: &str, b: &str, case: CaseSensitivity) -> bool {
    match case {
        CaseSensitivity::Sensitive => a == b,
        CaseSensitivity::Insensitive => compare_names(a, b) == Ordering::Equal,
    }
}

/// Convert a string to a null-terminated UTF-16 buffer.
pub fn to_wide_string(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_normalizes_separators() {
        let root = Path::new("backing");
        let expected: PathBuf = ["backing", "a", "b", "c.txt"].iter().collect();
        assert_eq!(resolve(root, "a\\b/c.txt"), expected);
        assert_eq!(resolve(root, "a\\\\b\\c.txt\\"), expected);
    }

    #[test]
    fn test_resolve_empty_is_root() {
        let root = Path::new("backing");
        assert_eq!(resolve(root, ""), PathBuf::from("backing"));
    }

    #[test]
    fn test_resolve_does_not_canonicalize() {
        let root = Path::new("backing");
        let expected: PathBuf = ["backing", "a", "..", "b"].iter().collect();
        assert_eq!(resolve(root, "a\\..\\b"), expected);
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("a\\b\\c.txt"), ("a\\b", "c.txt"));
        assert_eq!(split_parent("a/b"), ("a", "b"));
        assert_eq!(split_parent("readme.txt"), ("", "readme.txt"));
        assert_eq!(split_parent(""), ("", ""));
        assert_eq!(split_parent("dir\\"), ("", "dir"));
    }

    #[test]
    fn test_join_virtual() {
        assert_eq!(join_virtual("", "B.txt"), "B.txt");
        assert_eq!(join_virtual("a", "B.txt"), "a\\B.txt");
        assert_eq!(join_virtual("a\\", "B.txt"), "a\\B.txt");
    }

    #[test]
    fn test_compare_names_case_insensitive() {
        assert_eq!(compare_names("B.txt", "b.TXT"), Ordering::Equal);
        assert_eq!(compare_names("B.txt", "c"), Ordering::Less);
        assert_eq!(compare_names("c", "B.txt"), Ordering::Greater);
    }

    #[test]
    fn test_compare_names_uses_uppercase_folding() {
        // '_' sits between 'Z' and 'a': folding to uppercase puts it after letters.
        assert_eq!(compare_names("a", "_"), Ordering::Less);
        assert_eq!(compare_names("Z", "_"), Ordering::Less);
    }

    #[test]
    fn test_compare_names_prefix_sorts_first() {
        assert_eq!(compare_names("file", "file1"), Ordering::Less);
    }

    #[test]
    fn test_has_name_prefix() {
        assert!(has_name_prefix("Readme.md", "read"));
        assert!(has_name_prefix("Readme.md", ""));
        assert!(!has_name_prefix("Readme.md", "readme.md.bak"));
        assert!(!has_name_prefix("a", "b"));
    }

    #[test]
    fn test_names_equal() {
        assert!(names_equal("B.txt", "b.txt", CaseSensitivity::Insensitive));
        assert!(!names_equal("B.txt", "b.txt", CaseSensitivity::Sensitive));
        assert!(names_equal("B.txt", "B.txt", CaseSensitivity::Sensitive));
    }

    #[test]
    fn test_to_wide_string() {
        let wide = to_wide_string("hello");
        assert_eq!(wide.len(), 6);
        assert_eq!(wide[5], 0);
    }
}
