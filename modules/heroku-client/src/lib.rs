pub mod error;
pub mod types;

pub use error::{HerokuError, Result};
pub use types::{count_of_type, Dyno, Formation, FormationUpdate};

use std::time::Duration;

const BASE_URL: &str = "https://api.heroku.com";
const ACCEPT: &str = "application/vnd.heroku+json; version=3";

pub struct HerokuClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HerokuClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            api_key,
        })
    }

    /// List every dyno currently running for an app.
    pub async fn dynos(&self, app: &str) -> Result<Vec<Dyno>> {
        let url = format!("{}/apps/{}/dynos", self.base_url, app);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", ACCEPT)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HerokuError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.json().await?)
    }

    /// Number of running dynos for one process type (zero if the type has none).
    pub async fn dyno_count(&self, app: &str, process_type: &str) -> Result<usize> {
        let dynos = self.dynos(app).await?;
        Ok(count_of_type(&dynos, process_type))
    }

    /// Request a new quantity for a process type.
    pub async fn scale(&self, app: &str, process_type: &str, quantity: usize) -> Result<Formation> {
        tracing::info!(app, process_type, quantity, "Scaling formation");

        let url = format!("{}/apps/{}/formation/{}", self.base_url, app, process_type);
        let resp = self
            .client
            .patch(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", ACCEPT)
            .json(&FormationUpdate { quantity })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HerokuError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.json().await?)
    }
}
