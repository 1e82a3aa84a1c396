use thiserror::Error;

#[derive(Error, Debug)]
pub enum StratoError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate key on {column}: {value}")]
    DuplicateKey { column: String, value: String },

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Run conflict: another collection run is in progress")]
    RunBusy,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl StratoError {
    /// True for the insert race recovered by the merge path.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StratoError::DuplicateKey { .. })
    }
}
