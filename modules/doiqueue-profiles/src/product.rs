use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ProfileError, Result};
use crate::sources::IdentityWork;

/// Attention data fetched for one product during a refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductMetrics {
    /// Source name → raw count as returned upstream (not necessarily numeric).
    pub counts: BTreeMap<String, Value>,
    pub score: Option<f64>,
    pub event_dates: Vec<String>,
    pub raw: Option<Value>,
}

/// A work attached to a person, keyed by DOI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub doi: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    #[serde(default)]
    pub event_dates: Vec<String>,
    #[serde(default)]
    pub altmetric_counts: BTreeMap<String, Value>,
    pub altmetric_score: Option<f64>,
    #[serde(skip_serializing)]
    pub altmetric_api_raw: Option<Value>,
}

impl Product {
    pub fn new(doi: &str) -> Self {
        Self {
            doi: doi.to_string(),
            title: None,
            year: None,
            event_dates: Vec::new(),
            altmetric_counts: BTreeMap::new(),
            altmetric_score: None,
            altmetric_api_raw: None,
        }
    }

    /// Build a product from a registry work. Works without a DOI are not products.
    pub fn from_work(work: &IdentityWork) -> Result<Self> {
        let doi = work.doi.as_deref().ok_or(ProfileError::NoDoi)?;
        Ok(Self {
            title: work.title.clone(),
            year: work.year,
            ..Self::new(doi)
        })
    }

    /// Replace attention data with a fresh lookup. `None` means the metrics
    /// API has nothing for this DOI, which clears previous values.
    pub fn apply_metrics(&mut self, metrics: Option<ProductMetrics>) {
        let metrics = metrics.unwrap_or_default();
        self.altmetric_counts = metrics.counts;
        self.altmetric_score = metrics.score;
        self.event_dates = metrics.event_dates;
        self.altmetric_api_raw = metrics.raw;
    }
}
