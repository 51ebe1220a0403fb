//! Directory enumeration session management.

use std::cmp::Ordering;

use crate::mirror::ProjectedFileInfo;
use crate::path::{compare_names, fold, has_name_prefix};

/// Decides whether a name matches a wildcard search expression.
pub type NameMatcher = fn(&str, &str) -> bool;

/// Characters the host treats as wildcards. `<`, `>` and `"` are the DOS
/// forms of `*`, `?` and `.` that `FindFirstFile` rewrites patterns into.
const WILDCARDS: [char; 5] = ['*', '?', '<', '>', '"'];

/// State for a directory enumeration session.
///
/// The host may call the enumeration callbacks many times for a single
/// directory listing (each call fills a bounded buffer). The session keeps a
/// sorted snapshot of the directory and a cursor so each call resumes where
/// the previous one stopped.
#[derive(Debug)]
pub struct EnumerationSession {
    /// Snapshot sorted with [`compare_names`].
    entries: Vec<ProjectedFileInfo>,
    /// Current position in enumeration.
    cursor: usize,
    /// Captured search expression.
    filter: Option<String>,
    /// Whether a filter has been captured for this scan.
    filter_captured: bool,
    /// Matcher for wildcard filters.
    matcher: NameMatcher,
}

impl EnumerationSession {
    /// Start a session over a directory's children.
    pub fn new(entries: impl IntoIterator<Item = ProjectedFileInfo>) -> Self {
        Self::with_matcher(entries, matches_search_expression)
    }

    /// Start a session whose wildcard filters are evaluated by `matcher`.
    pub fn with_matcher(
        entries: impl IntoIterator<Item = ProjectedFileInfo>,
        matcher: NameMatcher,
    ) -> Self {
        let mut entries: Vec<ProjectedFileInfo> = entries.into_iter().collect();
        // Sorted the way the host sorts, since it merges our list with its own.
        entries.sort_by(|a, b| compare_names(&a.name, &b.name));

        Self {
            entries,
            cursor: 0,
            filter: None,
            filter_captured: false,
            matcher,
        }
    }

    /// Replay the scan from the beginning under a new filter.
    ///
    /// The cursor lands on the first entry not less than the filter's
    /// literal prefix.
    pub fn restart(&mut self, filter: Option<&str>) {
        self.cursor = 0;
        self.filter = normalize_filter(filter);
        self.filter_captured = true;
        self.seek();
    }

    /// Capture the filter for a scan that is already under way.
    ///
    /// Only the first filter of a scan is kept; the host passes the search
    /// expression on the first call and may omit it afterwards. The cursor
    /// is never moved backwards. Returns whether the filter was taken.
    pub fn try_save_filter(&mut self, filter: Option<&str>) -> bool {
        if self.filter_captured {
            return false;
        }
        self.filter = normalize_filter(filter);
        self.filter_captured = true;
        self.seek();
        true
    }

    /// The active filter, if any.
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Get the current entry without advancing.
    pub fn current(&self) -> Option<&ProjectedFileInfo> {
        self.entries
            .get(self.cursor)
            .filter(|entry| self.matches(&entry.name))
    }

    /// Whether there is a current entry left to hand out.
    pub fn is_current_valid(&self) -> bool {
        self.current().is_some()
    }

    /// Advance to the next entry.
    pub fn advance(&mut self) {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
        self.skip_unmatched();
    }

    /// Index of the cursor into the sorted snapshot.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// The sorted snapshot.
    pub fn entries(&self) -> &[ProjectedFileInfo] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move forward to the filter's lower bound, then past non-matches.
    fn seek(&mut self) {
        if let Some(filter) = self.filter.as_deref() {
            let prefix = literal_prefix(filter);
            let lower_bound = self
                .entries
                .partition_point(|entry| compare_names(&entry.name, prefix) == Ordering::Less);
            self.cursor = self.cursor.max(lower_bound);
        }
        self.skip_unmatched();
    }

    // Plain prefixes match a contiguous run, so only wildcard filters skip.
    fn skip_unmatched(&mut self) {
        let wildcard = match self.filter.as_deref() {
            Some(filter) => has_wildcards(filter),
            None => false,
        };
        if !wildcard {
            return;
        }

        while let Some(entry) = self.entries.get(self.cursor) {
            if self.matches(&entry.name) {
                break;
            }
            self.cursor += 1;
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self.filter.as_deref() {
            None => true,
            Some(filter) if has_wildcards(filter) => (self.matcher)(name, filter),
            Some(prefix) => has_name_prefix(name, prefix),
        }
    }
}

/// Empty and `*` filters match everything and are dropped.
fn normalize_filter(filter: Option<&str>) -> Option<String> {
    match filter {
        None | Some("") | Some("*") => None,
        Some(filter) => Some(filter.to_string()),
    }
}

fn has_wildcards(filter: &str) -> bool {
    filter.contains(WILDCARDS)
}

/// The part of a filter before its first wildcard.
fn literal_prefix(filter: &str) -> &str {
    match filter.find(WILDCARDS) {
        Some(pos) => &filter[..pos],
        None => filter,
    }
}

/// Check if a filename matches a search expression with wildcards.
///
/// Supports `*` (any run of characters), `?` (one character) and the DOS
/// forms the host passes on: `<` matches like `*` but never consumes the
/// last `.` of the name, `>` matches one character other than `.` or
/// nothing before a `.` or the end, and `"` matches a `.` or nothing at the
/// end. Names are folded the same way [`compare_names`] folds them.
///
/// Runs in `O(name * expression)`: every reachable expression position is
/// tracked at once instead of backtracking.
pub fn matches_search_expression(name: &str, search: &str) -> bool {
    // Empty search or "*" matches everything
    if search.is_empty() || search == "*" {
        return true;
    }

    let name: Vec<char> = name.chars().map(fold).collect();
    let pattern: Vec<char> = search.chars().map(fold).collect();
    let last_dot = name.iter().rposition(|&c| c == '.');

    // states[i]: the first i expression characters match the name so far.
    let mut states = vec![false; pattern.len() + 1];
    states[0] = true;
    skip_empty_matches(&pattern, &mut states, name.first().copied());

    for (pos, &c) in name.iter().enumerate() {
        let mut next = vec![false; pattern.len() + 1];
        for (i, &p) in pattern.iter().enumerate() {
            if !states[i] {
                continue;
            }
            match p {
                '*' => next[i] = true,
                '<' if Some(pos) != last_dot => next[i] = true,
                '<' => {}
                '?' => next[i + 1] = true,
                '>' if c != '.' => next[i + 1] = true,
                '>' => {}
                '"' if c == '.' => next[i + 1] = true,
                '"' => {}
                _ if p == c => next[i + 1] = true,
                _ => {}
            }
        }
        skip_empty_matches(&pattern, &mut next, name.get(pos + 1).copied());

        if !next.contains(&true) {
            return false;
        }
        states = next;
    }

    states[pattern.len()]
}

/// Follow wildcards that may match nothing before `upcoming`.
fn skip_empty_matches(pattern: &[char], states: &mut [bool], upcoming: Option<char>) {
    for (i, &p) in pattern.iter().enumerate() {
        if !states[i] {
            continue;
        }
        let empty = match p {
            '*' | '<' => true,
            '>' => matches!(upcoming, None | Some('.')),
            '"' => upcoming.is_none(),
            _ => false,
        };
        if empty {
            states[i + 1] = true;
        }
    }
}
