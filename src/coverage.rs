//! Line-level coverage indexing and diff-coverage merging (§4.E).

use std::collections::HashMap;

use serde::Serialize;

use crate::model::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    NewCovered,
    NewUncovered,
    /// Defined for future base-vs-target comparison; never emitted by
    /// [`merge_diff_and_coverage`] (§9 open question (a)).
    CoverageDegraded,
    CoverageImproved,
}

/// `line -> blocks covering it`, built by expanding each [`Range`] over its
/// inclusive line span.
pub struct CoverageIndex {
    by_line: HashMap<i64, Vec<Range>>,
}

impl CoverageIndex {
    pub fn build(ranges: &[Range]) -> CoverageIndex {
        let mut by_line: HashMap<i64, Vec<Range>> = HashMap::new();
        for range in ranges {
            for line in range.start_line..=range.end_line {
                by_line.entry(line).or_default().push(*range);
            }
        }
        CoverageIndex { by_line }
    }

    /// `None` means the line is non-executable (unknown verdict); `Some(hit)`
    /// gives the max hit count across all blocks covering the line.
    pub fn verdict(&self, line: i64) -> Option<i64> {
        let blocks = self.by_line.get(&line)?;
        if blocks.is_empty() {
            return None;
        }
        Some(blocks.iter().map(|b| b.hit).max().unwrap_or(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiffCoverageLine {
    pub line: i64,
    pub status: LineStatus,
    pub hit: i64,
    pub is_new: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffCoverageFile {
    pub path: String,
    pub lines: Vec<DiffCoverageLine>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiffCoverageSummary {
    pub new_covered: i64,
    pub new_uncovered: i64,
}

impl DiffCoverageSummary {
    pub fn rate(&self) -> f64 {
        let denom = self.new_covered + self.new_uncovered;
        if denom == 0 {
            0.0
        } else {
            (self.new_covered as f64 / denom as f64) * 100.0
        }
    }
}

/// Intersects `added_lines` with the indexed coverage of the target commit.
/// Lines with an unknown verdict (not present in the index) are silently
/// dropped.
pub fn merge_diff_and_coverage(added_lines: &[i64], index: &CoverageIndex) -> Vec<DiffCoverageLine> {
    added_lines
        .iter()
        .filter_map(|&line| {
            let hit = index.verdict(line)?;
            let status = if hit > 0 {
                LineStatus::NewCovered
            } else {
                LineStatus::NewUncovered
            };
            Some(DiffCoverageLine {
                line,
                status,
                hit,
                is_new: true,
            })
        })
        .collect()
}

pub fn summarize(files: &[DiffCoverageFile]) -> DiffCoverageSummary {
    let mut summary = DiffCoverageSummary::default();
    for file in files {
        for line in &file.lines {
            match line.status {
                LineStatus::NewCovered => summary.new_covered += 1,
                LineStatus::NewUncovered => summary.new_uncovered += 1,
                LineStatus::CoverageDegraded | LineStatus::CoverageImproved => {}
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(sl: i64, sc: i64, el: i64, ec: i64, statements: i64, hit: i64) -> Range {
        Range {
            start_line: sl,
            start_col: sc,
            end_line: el,
            end_col: ec,
            statements,
            hit,
        }
    }

    #[test]
    fn scenario_five_from_the_end_to_end_spec() {
        let ranges = vec![range(10, 1, 11, 9, 2, 5), range(12, 1, 12, 9, 1, 0)];
        let index = CoverageIndex::build(&ranges);
        let added = vec![10, 11, 12];
        let lines = merge_diff_and_coverage(&added, &index);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], DiffCoverageLine { line: 10, status: LineStatus::NewCovered, hit: 5, is_new: true });
        assert_eq!(lines[1], DiffCoverageLine { line: 11, status: LineStatus::NewCovered, hit: 5, is_new: true });
        assert_eq!(lines[2], DiffCoverageLine { line: 12, status: LineStatus::NewUncovered, hit: 0, is_new: true });

        let summary = summarize(&[DiffCoverageFile { path: "pkg/a.go".into(), lines }]);
        assert_eq!(summary.new_covered, 2);
        assert_eq!(summary.new_uncovered, 1);
        assert!((summary.rate() - 66.66666666666667).abs() < 1e-9);
    }

    #[test]
    fn unknown_lines_are_silently_dropped() {
        let ranges = vec![range(1, 1, 1, 5, 1, 1)];
        let index = CoverageIndex::build(&ranges);
        let lines = merge_diff_and_coverage(&[1, 2, 3], &index);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line, 1);
    }

    #[test]
    fn rate_is_zero_when_denominator_is_zero() {
        let summary = DiffCoverageSummary::default();
        assert_eq!(summary.rate(), 0.0);
    }

    #[test]
    fn verdict_monotonicity_flipping_hit_to_positive_only_moves_uncovered_to_covered() {
        let uncovered_ranges = vec![range(1, 1, 1, 5, 1, 0)];
        let index = CoverageIndex::build(&uncovered_ranges);
        let before = merge_diff_and_coverage(&[1], &index);
        assert_eq!(before[0].status, LineStatus::NewUncovered);

        let covered_ranges = vec![range(1, 1, 1, 5, 1, 1)];
        let index = CoverageIndex::build(&covered_ranges);
        let after = merge_diff_and_coverage(&[1], &index);
        assert_eq!(after[0].status, LineStatus::NewCovered);
    }

    #[test]
    fn a_line_covered_by_multiple_blocks_takes_the_max_hit() {
        let ranges = vec![range(1, 1, 3, 1, 1, 0), range(2, 1, 2, 5, 1, 7)];
        let index = CoverageIndex::build(&ranges);
        assert_eq!(index.verdict(2), Some(7));
    }
}
