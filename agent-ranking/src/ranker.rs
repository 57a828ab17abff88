//! Ranker trait and the embedding-backed implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use agent_adapters::traits::EmbeddingAdapter;
use async_trait::async_trait;
use tracing::debug;

use crate::{EmbeddingVector, RankingError, RankingResult};

/// A tool as seen by a ranker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// Registered tool name.
    pub name: String,
    /// Free-text description of what the tool does.
    pub description: String,
}

impl ToolDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Text compared against the query.
    #[must_use]
    pub fn text(&self) -> String {
        format!("{}: {}", self.name.replace('_', " "), self.description)
    }
}

/// Selects the tools most relevant to a query.
#[async_trait]
pub trait ToolRanker: Send + Sync {
    /// Returns up to `top_k` tool names, most relevant first.
    async fn rank(
        &self,
        query: &str,
        tools: &[ToolDescriptor],
        top_k: usize,
    ) -> RankingResult<Vec<String>>;
}

/// Ranks tools by cosine similarity between query and tool embeddings.
///
/// Tool embeddings are cached by descriptor text, so a fixed registry is
/// embedded once per ranker.
pub struct EmbeddingRanker {
    embedder: Arc<dyn EmbeddingAdapter>,
    cache: RwLock<HashMap<String, EmbeddingVector>>,
}

impl fmt::Debug for EmbeddingRanker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingRanker")
            .field("model", &self.embedder.metadata().model())
            .finish_non_exhaustive()
    }
}

impl EmbeddingRanker {
    /// Creates a ranker backed by the supplied embedder.
    #[must_use]
    pub fn new(embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        Self {
            embedder,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn tool_embeddings(
        &self,
        texts: &[String],
    ) -> RankingResult<Vec<EmbeddingVector>> {
        let missing: Vec<String> = {
            let cache = self
                .cache
                .read()
                .map_err(|_| RankingError::InvalidEmbedding("embedding cache poisoned"))?;
            texts
                .iter()
                .filter(|text| !cache.contains_key(*text))
                .cloned()
                .collect()
        };

        if !missing.is_empty() {
            debug!(count = missing.len(), "embedding tool descriptions");
            let vectors = self.embedder.embed(&missing).await?;
            let mut cache = self
                .cache
                .write()
                .map_err(|_| RankingError::InvalidEmbedding("embedding cache poisoned"))?;
            for (text, values) in missing.into_iter().zip(vectors) {
                cache.insert(text, EmbeddingVector::new(values)?);
            }
        }

        let cache = self
            .cache
            .read()
            .map_err(|_| RankingError::InvalidEmbedding("embedding cache poisoned"))?;
        texts
            .iter()
            .map(|text| {
                cache
                    .get(text)
                    .cloned()
                    .ok_or(RankingError::InvalidEmbedding("missing tool embedding"))
            })
            .collect()
    }
}

#[async_trait]
impl ToolRanker for EmbeddingRanker {
    async fn rank(
        &self,
        query: &str,
        tools: &[ToolDescriptor],
        top_k: usize,
    ) -> RankingResult<Vec<String>> {
        if tools.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = tools.iter().map(ToolDescriptor::text).collect();
        let tool_vectors = self.tool_embeddings(&texts).await?;

        let query_vector = self
            .embedder
            .embed(&[query.to_owned()])
            .await?
            .into_iter()
            .next()
            .ok_or(RankingError::InvalidEmbedding("no embedding returned for query"))?;
        let query_vector = EmbeddingVector::new(query_vector)?;

        let scores: Vec<f32> = tool_vectors
            .iter()
            .map(|vector| query_vector.cosine(vector))
            .collect();
        Ok(top_names(tools, &scores, top_k))
    }
}

/// Orders tools by descending score; ties keep registration order.
pub(crate) fn top_names(tools: &[ToolDescriptor], scores: &[f32], top_k: usize) -> Vec<String> {
    let mut order: Vec<usize> = (0..tools.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
        .into_iter()
        .take(top_k)
        .map(|index| tools[index].name.clone())
        .collect()
}
