use thiserror::Error;

#[derive(Debug, Error)]
pub enum MinoriError {
    #[error("config error: {0}")]
    Config(String),

    #[error("catalog input not found: {0}")]
    MissingInput(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
