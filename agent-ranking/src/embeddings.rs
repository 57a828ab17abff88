//! Embedding vectors and similarity.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{RankingError, RankingResult};

/// Wrapper type around an immutable floating-point embedding.
#[derive(Clone, PartialEq)]
pub struct EmbeddingVector {
    values: Arc<[f32]>,
}

impl EmbeddingVector {
    /// Creates a new embedding from owned values.
    ///
    /// # Errors
    ///
    /// Returns [`RankingError::InvalidEmbedding`] when the supplied vector is
    /// empty or contains non-finite values.
    pub fn new(values: Vec<f32>) -> RankingResult<Self> {
        if values.is_empty() {
            return Err(RankingError::InvalidEmbedding(
                "embedding vector must not be empty",
            ));
        }
        if !values.iter().all(|value| value.is_finite()) {
            return Err(RankingError::InvalidEmbedding(
                "embedding vector contains non-finite values",
            ));
        }
        Ok(Self {
            values: Arc::<[f32]>::from(values.into_boxed_slice()),
        })
    }

    /// Returns an immutable view of the embedding data.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Returns the dimensionality of the embedding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`; [`EmbeddingVector::new`] rejects empty inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cosine similarity in `[-1, 1]`; zero when either vector has no
    /// magnitude or the dimensions differ.
    #[must_use]
    pub fn cosine(&self, other: &Self) -> f32 {
        if self.len() != other.len() {
            return 0.0;
        }
        let denominator = self.magnitude() * other.magnitude();
        if denominator == 0.0 {
            0.0
        } else {
            self.dot(other) / denominator
        }
    }

    fn dot(&self, other: &Self) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    fn magnitude(&self) -> f32 {
        self.values
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt()
    }
}

impl std::fmt::Debug for EmbeddingVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingVector")
            .field("dimensions", &self.len())
            .finish()
    }
}

impl Serialize for EmbeddingVector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.values.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EmbeddingVector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<f32>::deserialize(deserializer)?;
        Self::new(values).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_vectors() {
        let err = EmbeddingVector::new(vec![]).expect_err("empty vector should error");
        assert!(matches!(err, RankingError::InvalidEmbedding(_)));
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = EmbeddingVector::new(vec![1.0, f32::NAN]).expect_err("nan not allowed");
        assert!(matches!(err, RankingError::InvalidEmbedding(_)));
    }

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let a = EmbeddingVector::new(vec![1.0, 2.0]).unwrap();
        let b = EmbeddingVector::new(vec![2.0, 4.0]).unwrap();
        assert!((a.cosine(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        let zero = EmbeddingVector::new(vec![0.0, 0.0]).unwrap();
        let other = EmbeddingVector::new(vec![1.0, 0.0]).unwrap();
        let longer = EmbeddingVector::new(vec![1.0, 0.0, 0.0]).unwrap();
        assert!(zero.cosine(&other).abs() < f32::EPSILON);
        assert!(other.cosine(&longer).abs() < f32::EPSILON);
    }

    #[test]
    fn deserialization_validates() {
        let err = serde_json::from_str::<EmbeddingVector>("[]");
        assert!(err.is_err());
        let ok: EmbeddingVector = serde_json::from_str("[0.5, 0.5]").unwrap();
        assert_eq!(ok.len(), 2);
    }
}
