pub mod error;
pub mod types;

pub use error::{AltmetricError, Result};
pub use types::AltmetricRecord;

use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

const BASE_URL: &str = "https://api.altmetric.com/v1";

/// Fallback wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

const DEFAULT_MAX_RATE_LIMIT_WAITS: u32 = 5;

pub struct AltmetricClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_rate_limit_waits: u32,
}

impl AltmetricClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
        })
    }

    pub fn max_rate_limit_waits(mut self, waits: u32) -> Self {
        self.max_rate_limit_waits = waits;
        self
    }

    /// Look up attention data for a DOI. `Ok(None)` means the API has no record for it.
    ///
    /// Blocks (sleeps) while the API reports rate limiting, up to the configured
    /// number of waits.
    pub async fn lookup_doi(&self, doi: &str) -> Result<Option<AltmetricRecord>> {
        let url = format!("{}/doi/{}", self.base_url, doi);
        let mut waits = 0;

        loop {
            let mut request = self.client.get(&url);
            if let Some(ref key) = self.api_key {
                request = request.query(&[("key", key.as_str())]);
            }
            let resp = request.send().await?;

            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                tracing::debug!(doi, "No altmetric record");
                return Ok(None);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if waits >= self.max_rate_limit_waits {
                    return Err(AltmetricError::RateLimited { waits });
                }
                let wait = retry_after(resp.headers()).unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
                waits += 1;
                tracing::warn!(
                    doi,
                    wait_secs = wait.as_secs(),
                    waits,
                    "Altmetric rate limited, waiting"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(AltmetricError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let raw: Value = resp.json().await?;
            return Ok(Some(AltmetricRecord::from_raw(raw)));
        }
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
