//! External collaborators of the refresh workflow.
//!
//! [`IdentityRegistry`]: researcher name parts plus work history (ORCID).
//! [`AttentionMetrics`]: per-DOI mention counts, score and event dates (Altmetric).
//!
//! Both are traits so the workflow can be tested with in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use altmetric_client::AltmetricClient;
use orcid_client::OrcidClient;

use crate::product::ProductMetrics;

#[derive(Debug, Clone, PartialEq)]
pub struct IdentityWork {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub given_names: Option<String>,
    pub family_name: Option<String>,
    pub works: Vec<IdentityWork>,
    pub api_raw: Value,
}

#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    async fn fetch(&self, external_id: &str) -> Result<IdentityRecord>;
}

#[async_trait]
pub trait AttentionMetrics: Send + Sync {
    /// `Ok(None)` when the source has no data for this DOI.
    async fn lookup(&self, doi: &str) -> Result<Option<ProductMetrics>>;
}

#[async_trait]
impl IdentityRegistry for OrcidClient {
    async fn fetch(&self, external_id: &str) -> Result<IdentityRecord> {
        let profile = self.fetch_profile(external_id).await?;
        Ok(IdentityRecord {
            given_names: profile.given_names,
            family_name: profile.family_name,
            works: profile
                .works
                .into_iter()
                .map(|w| IdentityWork {
                    title: w.title,
                    year: w.year,
                    doi: w.doi,
                })
                .collect(),
            api_raw: profile.api_raw,
        })
    }
}

#[async_trait]
impl AttentionMetrics for AltmetricClient {
    async fn lookup(&self, doi: &str) -> Result<Option<ProductMetrics>> {
        let record = self.lookup_doi(doi).await?;
        Ok(record.map(|r| ProductMetrics {
            counts: r.counts(),
            score: r.score(),
            event_dates: r.event_dates(),
            raw: Some(r.raw),
        }))
    }
}
