use thiserror::Error;
use utils::singleflight::SingleflightError;

/// Failure of the fetch capability. Any of these means "unable to produce this asset right
/// now"; the cache never retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} fetching {identifier}")]
    Status { identifier: String, status: u16 },

    #[error("empty body fetching {0}")]
    EmptyBody(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum AssetCacheError {
    #[error("IO: {0}")]
    IO(#[from] std::io::Error),

    #[error("Fetch: {0}")]
    Fetch(#[from] FetchError),

    #[error("Decode: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid content key: {0}")]
    InvalidKey(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Singleflight: {0}")]
    Singleflight(#[from] SingleflightError),
}

impl AssetCacheError {
    pub fn decode<T: ToString>(value: T) -> AssetCacheError {
        AssetCacheError::Decode(value.to_string())
    }

    pub fn config<T: ToString>(value: T) -> AssetCacheError {
        AssetCacheError::Config(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssetCacheError>;
