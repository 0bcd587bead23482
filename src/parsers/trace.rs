//! Parses `goc`/`pyca`/`jacoco` coverage traces.
//!
//! All three formats share one line-oriented grammar:
//!
//! ```text
//! <file_path>:<startLine>.<startCol>,<endLine>.<endCol> <statements> <count>
//! ```
//!
//! `mode:` header lines and blank lines are skipped. A malformed line is
//! skipped rather than aborting the whole trace; a trace that yields no
//! blocks at all is itself not an error (the caller decides whether an
//! empty result is acceptable).

use std::collections::HashMap;

use winnow::{
    ascii::dec_uint,
    combinator::separated_pair,
    PResult, Parser,
};

use crate::model::Range;

/// Splits `line` on its *last* colon, since a file path may itself contain
/// colons (Windows drive letters, some CI path mangling). Returns
/// `(file_path, rest)`.
fn rsplit_once_colon(line: &str) -> Option<(&str, &str)> {
    let idx = line.rfind(':')?;
    Some((&line[..idx], &line[idx + 1..]))
}

/// `<startLine>.<startCol>,<endLine>.<endCol> <statements> <count>`
fn parse_range_tuple(input: &mut &str) -> PResult<Range> {
    let (start_line, _, start_col) = (dec_uint, '.', dec_uint).parse_next(input)?;
    let _ = ','.parse_next(input)?;
    let (end_line, _, end_col) = (dec_uint, '.', dec_uint).parse_next(input)?;
    let _ = ' '.parse_next(input)?;
    let (statements, _, hit) = separated_pair(dec_uint, ' ', dec_uint).parse_next(input)?;

    Ok(Range {
        start_line,
        start_col,
        end_line,
        end_col,
        statements,
        hit,
    })
}

fn parse_data_line(line: &str) -> Option<(String, Range)> {
    let (file_path, rest) = rsplit_once_colon(line.trim_end())?;
    if file_path.is_empty() {
        return None;
    }
    let mut rest = rest.trim_start();
    let range = parse_range_tuple(&mut rest).ok()?;
    if !rest.trim().is_empty() {
        // trailing garbage after the tuple: treat the whole line as malformed
        return None;
    }
    Some((file_path.to_string(), range))
}

/// Decodes a trace into `file_path -> blocks`. Never errors; a malformed
/// line is simply absent from the result.
pub fn parse_trace(raw: &str) -> HashMap<String, Vec<Range>> {
    let mut out: HashMap<String, Vec<Range>> = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("mode:") {
            continue;
        }
        if let Some((file_path, range)) = parse_data_line(line) {
            out.entry(file_path).or_default().push(range);
        }
    }
    out
}
