//! The wire schema published to `coverage_exchange` (§6). Strongly typed
//! in place of the duck-typed message wrappers of the source this was
//! distilled from (§9's "dynamic attribute access" note).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CiMetadataMessage {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub pipeline_id: String,
    #[serde(default)]
    pub job_id: String,
}

/// `format` is left as a raw string rather than an enum so that an
/// unrecognized value can be distinguished, at the call site, from a
/// structurally malformed envelope: the former marks the [`crate::model::Report`]
/// `failed` and retries (§4.G step 5); the latter is nacked outright (step 2).
#[derive(Debug, Clone, Deserialize)]
pub struct CoverageMessage {
    pub repo: String,
    #[serde(with = "repo_id_as_string")]
    pub repo_id: String,
    pub branch: String,
    pub commit: String,
    #[serde(default)]
    pub ci: CiMetadataMessage,
    pub coverage: CoverageMessagePayload,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverageMessagePayload {
    pub format: String,
    pub raw: String,
}

impl Default for CiMetadataMessage {
    fn default() -> Self {
        CiMetadataMessage {
            provider: String::new(),
            pipeline_id: String::new(),
            job_id: String::new(),
        }
    }
}

/// `repo_id` arrives as either a JSON string or a JSON number (§6); this
/// normalizes both to a `String` at decode time.
mod repo_id_as_string {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!(
                "repo_id must be a string or number, got {other}"
            ))),
        }
    }
}

impl CoverageMessage {
    pub fn decode(body: &[u8]) -> serde_json::Result<CoverageMessage> {
        serde_json::from_slice(body)
    }
}
