use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Work has no DOI")]
    NoDoi,

    #[error("Person has no email")]
    NoEmail,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
