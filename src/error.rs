//! Error types for sequencer-monitor.

use thiserror::Error;

/// Boxed source error carried by collaborator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("chain read failed ({call}): {source}")]
    ChainRead {
        call: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("failed to read streak state for scope {scope}: {source}")]
    StateRead {
        scope: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to write streak state for scope {scope}: {source}")]
    StateWrite {
        scope: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a failed chain call.
    pub fn chain_read(call: &'static str, source: impl Into<BoxError>) -> Self {
        Error::ChainRead {
            call,
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
