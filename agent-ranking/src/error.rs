//! Error types for relevance ranking.

use agent_adapters::traits::AdapterError;
use thiserror::Error;

/// Errors emitted by rankers.
#[derive(Debug, Error)]
pub enum RankingError {
    /// The embedding backend failed.
    #[error("embedding backend error: {source}")]
    Embedding {
        /// Source adapter error.
        #[from]
        source: AdapterError,
    },
    /// The backend returned a vector that cannot be compared.
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(&'static str),
}

/// Result type alias for ranking operations.
pub type RankingResult<T> = Result<T, RankingError>;
