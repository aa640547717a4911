//! Profile summary numbers.
//!
//! Every figure is computed independently from the same product snapshot, so
//! the order they are evaluated in never matters.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::product::Product;
use crate::sources::IdentityWork;

/// Source whose counts feed the t-index.
pub const TWEETERS: &str = "tweeters";

/// Most recent works kept per person.
pub const MAX_PRODUCTS: usize = 100;

pub const DEFAULT_EVENT_MONTHS: [&str; 3] = ["2015-10", "2015-11", "2015-12"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileMetrics {
    pub t_index: i64,
    pub num_products: i64,
    pub metric_sums: BTreeMap<String, i64>,
    pub num_with_metrics: BTreeMap<String, i64>,
    pub num_sources: i64,
    pub altmetric_score: f64,
    pub monthly_event_count: i64,
}

/// Largest `h` such that `h` of the counts are at least `h`.
pub fn h_index(counts: &[i64]) -> i64 {
    let mut sorted = counts.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted
        .iter()
        .zip(1..)
        .take_while(|(count, rank)| **count >= *rank)
        .count() as i64
}

/// Read an upstream count. Integers, integral floats and numeric strings are
/// accepted; anything else is malformed and yields `None`.
pub fn parse_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn t_index(products: &[Product]) -> i64 {
    let counts: Vec<i64> = products
        .iter()
        .map(|p| p.altmetric_counts.get(TWEETERS).and_then(parse_count).unwrap_or(0))
        .collect();
    h_index(&counts)
}

/// Per-source totals of the well-formed counts. Sums saturate at `i64::MAX`.
pub fn metric_sums(products: &[Product]) -> BTreeMap<String, i64> {
    let mut sums = BTreeMap::new();
    let counts = products.iter().flat_map(|p| {
        p.altmetric_counts
            .iter()
            .filter_map(|(source, raw)| parse_count(raw).map(|count| (source.as_str(), count)))
    });
    for (source, count) in counts {
        let sum = sums.entry(source.to_string()).or_insert(0i64);
        *sum = sum.saturating_add(count);
    }
    sums
}

/// Per source, how many products carry a value for it, well-formed or not.
pub fn num_with_metrics(products: &[Product]) -> BTreeMap<String, i64> {
    let mut contributing = BTreeMap::new();
    let present = products.iter().flat_map(|p| {
        p.altmetric_counts
            .iter()
            .filter(|(_, raw)| !raw.is_null())
            .map(|(source, _)| source.as_str())
    });
    for source in present {
        *contributing.entry(source.to_string()).or_insert(0) += 1;
    }
    contributing
}

pub fn total_altmetric_score(products: &[Product]) -> f64 {
    products.iter().filter_map(|p| p.altmetric_score).sum()
}

/// Minimum, across `months` (`YYYY-MM` prefixes), of the number of events
/// dated in that month. A month without events counts as zero.
pub fn monthly_event_count(products: &[Product], months: &[&str]) -> i64 {
    months
        .iter()
        .map(|month| {
            products
                .iter()
                .flat_map(|p| p.event_dates.iter())
                .filter(|date| date.starts_with(month))
                .count() as i64
        })
        .min()
        .unwrap_or(0)
}

pub fn summarize(products: &[Product], event_months: &[&str]) -> ProfileMetrics {
    let metric_sums = metric_sums(products);
    ProfileMetrics {
        t_index: t_index(products),
        num_products: products.len() as i64,
        num_sources: metric_sums.len() as i64,
        metric_sums,
        num_with_metrics: num_with_metrics(products),
        altmetric_score: total_altmetric_score(products),
        monthly_event_count: monthly_event_count(products, event_months),
    }
}

/// Turn registry works into products: drop works without a DOI, keep the
/// first occurrence of each DOI, order by year (newest first, undated last)
/// and keep the newest [`MAX_PRODUCTS`].
///
/// Returns the deduplicated count before truncation alongside the kept set.
pub fn select_recent_products(works: &[IdentityWork]) -> (usize, Vec<Product>) {
    let mut seen = HashSet::new();
    let mut products: Vec<Product> = works
        .iter()
        .filter_map(|work| Product::from_work(work).ok())
        .filter(|product| seen.insert(product.doi.clone()))
        .collect();

    let deduplicated = products.len();
    // Stable, so equal years keep registry order.
    products.sort_by(|a, b| b.year.cmp(&a.year));
    products.truncate(MAX_PRODUCTS);
    (deduplicated, products)
}
