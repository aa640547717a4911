use serde_json::{Map, Value};
use std::collections::BTreeMap;

const COUNT_PREFIX: &str = "cited_by_";
const COUNT_SUFFIX: &str = "_count";

/// Attention data for one DOI, as returned by `/v1/doi/<doi>`.
///
/// Counts are kept as raw JSON values: the API has been seen returning both
/// numbers and numeric strings, and the aggregation layer decides what is
/// usable.
#[derive(Debug, Clone, PartialEq)]
pub struct AltmetricRecord {
    pub raw: Value,
}

impl AltmetricRecord {
    pub fn from_raw(raw: Value) -> Self {
        Self { raw }
    }

    fn object(&self) -> Option<&Map<String, Value>> {
        self.raw.as_object()
    }

    /// Per-source mention counts keyed by source name (`cited_by_tweeters_count` → `tweeters`).
    pub fn counts(&self) -> BTreeMap<String, Value> {
        let Some(obj) = self.object() else {
            return BTreeMap::new();
        };

        obj.iter()
            .filter_map(|(key, value)| {
                let source = key.strip_prefix(COUNT_PREFIX)?.strip_suffix(COUNT_SUFFIX)?;
                if source.is_empty() || value.is_null() {
                    return None;
                }
                Some((source.to_string(), value.clone()))
            })
            .collect()
    }

    /// The overall attention score, if present and numeric.
    pub fn score(&self) -> Option<f64> {
        self.object()?.get("score")?.as_f64()
    }

    /// `posted_on` timestamps of every post, across all post types.
    pub fn event_dates(&self) -> Vec<String> {
        let Some(posts) = self
            .object()
            .and_then(|o| o.get("posts"))
            .and_then(Value::as_object)
        else {
            return Vec::new();
        };

        posts
            .values()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(|post| post.get("posted_on").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}
