use thiserror::Error;

pub type Result<T> = std::result::Result<T, HerokuError>;

#[derive(Debug, Error)]
pub enum HerokuError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for HerokuError {
    fn from(err: reqwest::Error) -> Self {
        HerokuError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for HerokuError {
    fn from(err: serde_json::Error) -> Self {
        HerokuError::Parse(err.to_string())
    }
}
