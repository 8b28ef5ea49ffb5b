use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecallError {
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Recall not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RecallError>;
