//! The editor overlay JSON payload (§4.H step 6): `{files: {<path>: {lines:
//! {<lineno>: {status, hit}}}}}`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::coverage::{DiffCoverageFile, LineStatus};

#[derive(Debug, Clone, Serialize)]
pub struct OverlayLine {
    pub status: LineStatus,
    pub hit: i64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct OverlayFile {
    pub lines: BTreeMap<i64, OverlayLine>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct OverlayPayload {
    pub files: BTreeMap<String, OverlayFile>,
}

pub fn build_overlay(files: &[DiffCoverageFile]) -> OverlayPayload {
    let mut payload = OverlayPayload::default();
    for file in files {
        let entry = payload.files.entry(file.path.clone()).or_default();
        for line in &file.lines {
            entry.lines.insert(
                line.line,
                OverlayLine {
                    status: line.status,
                    hit: line.hit,
                },
            );
        }
    }
    payload
}
