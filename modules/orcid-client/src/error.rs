use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrcidError>;

#[derive(Debug, Error)]
pub enum OrcidError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid ORCID iD: {0}")]
    InvalidId(String),
}

impl From<reqwest::Error> for OrcidError {
    fn from(err: reqwest::Error) -> Self {
        OrcidError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for OrcidError {
    fn from(err: serde_json::Error) -> Self {
        OrcidError::Parse(err.to_string())
    }
}
