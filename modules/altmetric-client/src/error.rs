use thiserror::Error;

pub type Result<T> = std::result::Result<T, AltmetricError>;

#[derive(Debug, Error)]
pub enum AltmetricError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited after {waits} waits")]
    RateLimited { waits: u32 },
}

impl From<reqwest::Error> for AltmetricError {
    fn from(err: reqwest::Error) -> Self {
        AltmetricError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AltmetricError {
    fn from(err: serde_json::Error) -> Self {
        AltmetricError::Parse(err.to_string())
    }
}
