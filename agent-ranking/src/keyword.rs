//! Offline ranker scoring tools by shared words with the query.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::ranker::top_names;
use crate::{RankingResult, ToolDescriptor, ToolRanker};

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "what", "how", "can", "you", "are",
    "get", "into", "its", "please", "given", "returns", "return", "str",
];

/// Keyword-overlap ranker. Needs no model, so it is the fallback for
/// backends without an embedding endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordRanker;

impl KeywordRanker {
    /// Creates the ranker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRanker for KeywordRanker {
    async fn rank(
        &self,
        query: &str,
        tools: &[ToolDescriptor],
        top_k: usize,
    ) -> RankingResult<Vec<String>> {
        let query_words = words(query);
        #[allow(clippy::cast_precision_loss)]
        let scores: Vec<f32> = tools
            .iter()
            .map(|tool| {
                let tool_words = words(&tool.text());
                query_words.intersection(&tool_words).count() as f32
            })
            .collect();
        Ok(top_names(tools, &scores, top_k))
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| word.len() > 2)
        .map(str::to_lowercase)
        .filter(|word| !STOP_WORDS.contains(&word.as_str()))
        .map(|word| stem(&word))
        .collect()
}

// Plural and gerund endings only; enough for "headlines"/"headline".
fn stem(word: &str) -> String {
    for suffix in ["ing", "s"] {
        if let Some(stripped) = word.strip_suffix(suffix) {
            if stripped.len() > 2 {
                return stripped.to_owned();
            }
        }
    }
    word.to_owned()
}
