use thiserror::Error;

use crate::alerts::ChannelError;
use crate::extractor::ExtractError;
use crate::fetcher::FetchError;
use crate::store::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
