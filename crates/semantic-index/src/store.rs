//! Storage contracts the retrieval and inference code depend on.
//!
//! Implementations are read-only at request time and shared behind `Arc`, so
//! every method takes `&self` and the traits require `Send + Sync`.

use core_types::{ComplexEmbedding, EntityKey, RelationSignature, Vector};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::metric::DistanceMetric;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The backing store cannot be reached; fatal for the current call.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("vector length {got} does not match store dimension {expected}")]
    Dimension { expected: usize, got: usize },
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub key: EntityKey,
    pub distance: f64,
}

/// k-NN request against concatenated embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborQuery {
    pub vector: Vector,
    pub metric: DistanceMetric,
    /// Keep only hits strictly closer than this (zero selects exact matches).
    pub max_distance: Option<f64>,
    pub limit: usize,
    /// Entity left out of the result, typically the one the query vector came from.
    pub exclude: Option<EntityKey>,
}

impl NeighborQuery {
    pub fn new(vector: Vector, limit: usize) -> Self {
        Self {
            vector,
            metric: DistanceMetric::default(),
            max_distance: None,
            limit,
            exclude: None,
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_max_distance(mut self, max: Option<f64>) -> Self {
        self.max_distance = max;
        self
    }

    pub fn excluding(mut self, key: EntityKey) -> Self {
        self.exclude = Some(key);
        self
    }
}

/// Entity embeddings with point lookup and exact nearest-neighbor search.
pub trait VectorStore: Send + Sync {
    /// Per-half dimension D; concatenated vectors have length `2 * D`.
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenated `real ++ imag` embedding of one entity.
    fn embedding(&self, key: &EntityKey) -> Result<Option<Vector>, StoreError>;

    /// Real and imaginary halves for a batch of entities in one round trip.
    /// Keys without an embedding are absent from the result.
    fn complex_embeddings(
        &self,
        keys: &[EntityKey],
    ) -> Result<BTreeMap<EntityKey, ComplexEmbedding>, StoreError>;

    /// Hits ordered by ascending distance, ties broken by ascending key.
    fn nearest(&self, query: &NeighborQuery) -> Result<Vec<Neighbor>, StoreError>;

    fn embeddings(&self, keys: &[EntityKey]) -> Result<BTreeMap<EntityKey, Vector>, StoreError> {
        let mut out = BTreeMap::new();
        for key in keys {
            if let Some(v) = self.embedding(key)? {
                out.insert(key.clone(), v);
            }
        }
        Ok(out)
    }

    /// Distance between two stored entities; `None` if either is missing.
    fn distance(
        &self,
        a: &EntityKey,
        b: &EntityKey,
        metric: DistanceMetric,
    ) -> Result<Option<f64>, StoreError> {
        let (Some(va), Some(vb)) = (self.embedding(a)?, self.embedding(b)?) else {
            return Ok(None);
        };
        Ok(Some(metric.distance(&va, &vb)))
    }

    /// Distance between a stored entity and an arbitrary vector.
    fn distance_to(
        &self,
        key: &EntityKey,
        vector: &[f64],
        metric: DistanceMetric,
    ) -> Result<Option<f64>, StoreError> {
        let expected = 2 * self.dimension();
        if vector.len() != expected {
            return Err(StoreError::Dimension {
                expected,
                got: vector.len(),
            });
        }
        Ok(self
            .embedding(key)?
            .map(|stored| metric.distance(&stored, vector)))
    }
}

/// Relation angle vectors keyed by the full five-field signature.
pub trait PredicateTable: Send + Sync {
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exact-match lookup; unknown signatures yield `None`.
    fn angles(&self, signature: &RelationSignature) -> Result<Option<Vector>, StoreError>;
}
