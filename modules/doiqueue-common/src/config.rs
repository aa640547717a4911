use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,
    /// Upstream relation the queue is populated from.
    pub corpus_table: String,

    // Control plane
    pub heroku_api_key: Option<String>,
    pub heroku_app: String,
    pub worker_process: String,

    // Export
    pub export_bucket: String,
    pub export_key: String,
    pub export_dir: String,

    // External APIs
    pub altmetric_api_key: Option<String>,
    pub oadoi_api_url: String,
    pub contact_email: Option<String>,

    // Auth
    pub jwt_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            corpus_table: env_or("CORPUS_TABLE", "crossref"),
            heroku_api_key: env_opt("HEROKU_API_KEY"),
            heroku_app: env_or("HEROKU_APP", "oadoi"),
            worker_process: env_or("WORKER_PROCESS", "run_all"),
            export_bucket: env_or("EXPORT_BUCKET", "oadoi-export"),
            export_key: env_or("EXPORT_KEY", "data/export_queue.csv.gz"),
            export_dir: env_or("EXPORT_DIR", "data"),
            altmetric_api_key: env_opt("ALTMETRIC_API_KEY"),
            oadoi_api_url: env_or("OADOI_API_URL", "https://api.oadoi.org"),
            contact_email: env_opt("CONTACT_EMAIL"),
            jwt_key: env_opt("JWT_KEY"),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  CORPUS_TABLE: {}", self.corpus_table);
        tracing::info!("  HEROKU_APP: {} ({})", self.heroku_app, self.worker_process);
        tracing::info!("  HEROKU_API_KEY: {}", preview_opt(&self.heroku_api_key));
        tracing::info!("  ALTMETRIC_API_KEY: {}", preview_opt(&self.altmetric_api_key));
        tracing::info!("  JWT_KEY: {}", preview_opt(&self.jwt_key));
        tracing::info!("  EXPORT: s3://{}/{}", self.export_bucket, self.export_key);
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn preview(val: &str) -> String {
    let n = val.char_indices().nth(5).map(|(i, _)| i).unwrap_or(val.len());
    format!("{}...({} chars)", &val[..n], val.len())
}

fn preview_opt(val: &Option<String>) -> String {
    match val {
        Some(v) if !v.is_empty() => preview(v),
        _ => "<not set>".to_string(),
    }
}
