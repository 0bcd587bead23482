//! Parses `git diff -U0 -M` output into per-file added-line sets (§4.D).
//!
//! This is a small imperative line scanner rather than a `winnow` grammar:
//! the input is diff *output*, already well-formed by git, so there is no
//! adversarial input to defend a combinator grammar against. Ported from
//! `_parse_unified_diff` (`original_source/coverage-platform/diff_coverage.py`):
//! the file path comes from the `diff --git a/... b/...` header, not from
//! `+++`, since an added source line can itself read `+++ whatever` and would
//! otherwise be mistaken for a new file marker.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    /// Post-image line numbers touched by a `+` in some hunk. Includes
    /// lines from modified hunks (delete+add) under their new numbering.
    pub added_lines: Vec<i64>,
}

struct HunkHeader {
    new_start: i64,
}

/// `@@ -old_start[,old_count] +new_start[,new_count] @@ ...`
fn parse_hunk_header(line: &str) -> Option<HunkHeader> {
    let rest = line.strip_prefix("@@ ")?;
    let plus_idx = rest.find('+')?;
    let new_part = &rest[plus_idx + 1..];
    let new_part = new_part.split(' ').next()?; // up to the next space or trailing "@@"
    let new_start_str = new_part.split(',').next()?;
    let new_start: i64 = new_start_str.parse().ok()?;
    Some(HunkHeader { new_start })
}

/// Parses the post-image path out of a `diff --git a/<old> b/<new>` header,
/// stripping exactly the two-character `b/` prefix off the new-path token
/// (never arbitrary prefix stripping, and never derived from `+++`).
fn parse_diff_git_header(line: &str) -> Option<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    let new_path = parts[3];
    Some(
        new_path
            .strip_prefix("b/")
            .unwrap_or(new_path)
            .to_string(),
    )
}

/// Parses unified diff output into one [`FileDiff`] per changed file that
/// has at least one added line. Deleted-only and context-only files are
/// absent from the result, not present-with-an-empty-list.
pub fn parse_unified_diff(diff_text: &str) -> Vec<FileDiff> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<usize> = None; // index into `files`
    let mut new_line: i64 = 0;
    let mut in_hunk = false;

    for line in diff_text.lines() {
        if line.starts_with("diff --git") {
            in_hunk = false;
            current = parse_diff_git_header(line).map(|path| {
                files.push(FileDiff {
                    path,
                    added_lines: Vec::new(),
                });
                files.len() - 1
            });
            continue;
        }
        if line.starts_with("@@") {
            if let Some(header) = parse_hunk_header(line) {
                new_line = header.new_start;
                in_hunk = current.is_some();
            } else {
                in_hunk = false;
            }
            continue;
        }
        if !in_hunk {
            continue;
        }
        let Some(idx) = current else { continue };
        if line.starts_with('+') && !line.starts_with("+++") {
            files[idx].added_lines.push(new_line);
            new_line += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            // deleted line: doesn't touch new_line
        } else if line.starts_with(' ') {
            new_line += 1;
        }
        // "+++"/"---" file markers, "\ No newline at end of file", and
        // anything else: ignore, no counters move.
    }

    files.retain(|f| !f.added_lines.is_empty());
    files
}

/// Convenience view keyed by path, for callers that want direct lookup.
pub fn added_lines_by_file(diff_text: &str) -> HashMap<String, Vec<i64>> {
    parse_unified_diff(diff_text)
        .into_iter()
        .map(|f| (f.path, f.added_lines))
        .collect()
}
