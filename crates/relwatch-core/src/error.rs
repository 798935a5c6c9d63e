//! Relwatch error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelwatchError>;

#[derive(Debug, Error)]
pub enum RelwatchError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("channel error: {0}")]
    Channel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the release-listing source. Transient variants are retried by
/// the next scheduled cycle, never inside one.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limited by the release source")]
    RateLimited,

    #[error("repository not found upstream")]
    NotFound,

    #[error("network error: {0}")]
    Network(String),
}
