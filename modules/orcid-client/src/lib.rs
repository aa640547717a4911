pub mod error;
pub mod types;

pub use error::{OrcidError, Result};
pub use types::{normalize_doi, OrcidProfile, OrcidWork};

use serde_json::Value;
use std::time::Duration;
use types::RecordResponse;

const BASE_URL: &str = "https://pub.orcid.org/v3.0";

pub struct OrcidClient {
    client: reqwest::Client,
    base_url: String,
}

impl OrcidClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the public record for an ORCID iD and flatten it into names plus works.
    pub async fn fetch_profile(&self, orcid_id: &str) -> Result<OrcidProfile> {
        let orcid_id = orcid_id.trim();
        if orcid_id.is_empty() || orcid_id.contains('/') {
            return Err(OrcidError::InvalidId(orcid_id.to_string()));
        }

        tracing::debug!(orcid_id, "Fetching ORCID record");

        let url = format!("{}/{}/record", self.base_url, orcid_id);
        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OrcidError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_raw: Value = resp.json().await?;
        let record: RecordResponse = serde_json::from_value(api_raw.clone())?;
        let profile = record.into_profile(orcid_id, api_raw);

        tracing::info!(orcid_id, works = profile.works.len(), "Fetched ORCID record");
        Ok(profile)
    }
}
