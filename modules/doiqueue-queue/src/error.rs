use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate identifier in load: {0}")]
    DuplicateIdentifier(String),

    #[error("Queue is empty")]
    EmptyQueue,

    #[error("Unknown update strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid corpus table name: {0}")]
    InvalidCorpus(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Control plane error: {0}")]
    ControlPlane(String),
}

impl From<csv::Error> for QueueError {
    fn from(err: csv::Error) -> Self {
        QueueError::Input(err.to_string())
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        QueueError::Input(err.to_string())
    }
}
