use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;

use crate::strategy::UpdateStrategy;
use crate::types::CorpusTable;

pub const REALTIME_SCRAPE: &str = "crossref.realtime_scrape";

/// Re-runs the open-access lookup for a DOI and stores the response on the
/// corpus row (`response_with_hybrid`), which the export view reads.
pub struct RealtimeScrape {
    pool: PgPool,
    corpus: CorpusTable,
    client: reqwest::Client,
    base_url: String,
    email: Option<String>,
}

impl RealtimeScrape {
    pub fn new(
        pool: PgPool,
        corpus: CorpusTable,
        base_url: &str,
        email: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            pool,
            corpus,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
        })
    }

    async fn lookup(&self, doi: &str) -> anyhow::Result<Value> {
        let url = format!("{}/v2/{}", self.base_url, doi);
        let mut request = self.client.get(&url);
        if let Some(ref email) = self.email {
            request = request.query(&[("email", email.as_str())]);
        }

        let resp = request.send().await.context("lookup request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("lookup returned {}: {}", status.as_u16(), body);
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl UpdateStrategy for RealtimeScrape {
    fn name(&self) -> &'static str {
        REALTIME_SCRAPE
    }

    async fn update(&self, id: &str) -> anyhow::Result<()> {
        let response = self.lookup(id).await?;

        let sql = format!(
            "UPDATE {} SET response_with_hybrid = $2 WHERE id = $1",
            self.corpus
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(&response)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(doi = %id, corpus = %self.corpus, "No corpus row to update");
        }
        Ok(())
    }
}
