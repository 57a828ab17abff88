//! Relevance ranking used to narrow the tool set advertised in a prompt.
//!
//! A [`ToolRanker`] receives the query and every tool descriptor and returns
//! the names of the `top_k` most relevant tools, best first.

#![warn(missing_docs, clippy::pedantic)]

mod embeddings;
mod error;
mod keyword;
mod ranker;

pub use embeddings::EmbeddingVector;
pub use error::{RankingError, RankingResult};
pub use keyword::KeywordRanker;
pub use ranker::{EmbeddingRanker, ToolDescriptor, ToolRanker};
