//! Embedding retrieval: point lookups, neighbor searches and pairwise
//! distances over the concatenated embedding space.

use core_types::{EntityKey, Vector};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::metric::DistanceMetric;
use crate::store::{NeighborQuery, StoreError, VectorStore};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetrievalError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Read-only retrieval over an injected vector store.
#[derive(Clone)]
pub struct EmbeddingRetrieval {
    store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for EmbeddingRetrieval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingRetrieval")
            .field("dimension", &self.store.dimension())
            .field("entities", &self.store.len())
            .finish()
    }
}

impl EmbeddingRetrieval {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Length of a concatenated embedding (2D).
    pub fn vector_len(&self) -> usize {
        2 * self.store.dimension()
    }

    pub fn get_embedding(&self, key: &EntityKey) -> RetrievalResult<Vector> {
        self.store
            .embedding(key)?
            .ok_or_else(|| RetrievalError::NotFound(format!("no embedding for {key}")))
    }

    /// Batch lookup; missing keys are left out, all-missing is `NotFound`.
    pub fn get_embeddings(&self, keys: &[EntityKey]) -> RetrievalResult<BTreeMap<EntityKey, Vector>> {
        if keys.is_empty() {
            return Err(RetrievalError::InvalidInput("no entity keys given".into()));
        }
        let found = self.store.embeddings(keys)?;
        if found.is_empty() {
            return Err(RetrievalError::NotFound(format!(
                "no embeddings for {} requested keys",
                keys.len()
            )));
        }
        Ok(found)
    }

    pub fn find_neighbors(
        &self,
        key: &EntityKey,
        distance_threshold: Option<f64>,
        limit: usize,
    ) -> RetrievalResult<Vec<EntityKey>> {
        self.find_neighbors_with(key, DistanceMetric::Euclidean, distance_threshold, limit)
    }

    /// Up to `limit` other entities ordered by ascending distance from `key`.
    pub fn find_neighbors_with(
        &self,
        key: &EntityKey,
        metric: DistanceMetric,
        distance_threshold: Option<f64>,
        limit: usize,
    ) -> RetrievalResult<Vec<EntityKey>> {
        check_threshold(distance_threshold)?;
        let origin = self.get_embedding(key)?;
        let query = NeighborQuery::new(origin, limit)
            .with_metric(metric)
            .with_max_distance(distance_threshold)
            .excluding(key.clone());
        let hits = self.store.nearest(&query)?;
        tracing::debug!(curie = %key, %metric, hits = hits.len(), "neighbors found");
        Ok(hits.into_iter().map(|n| n.key).collect())
    }

    pub fn find_entities_by_embedding(
        &self,
        vector: &[f64],
        distance_threshold: Option<f64>,
        limit: usize,
    ) -> RetrievalResult<Vec<EntityKey>> {
        self.find_entities_by_embedding_with(
            vector,
            DistanceMetric::Euclidean,
            distance_threshold,
            limit,
        )
    }

    /// Up to `limit` entities ordered by ascending distance from `vector`.
    pub fn find_entities_by_embedding_with(
        &self,
        vector: &[f64],
        metric: DistanceMetric,
        distance_threshold: Option<f64>,
        limit: usize,
    ) -> RetrievalResult<Vec<EntityKey>> {
        self.check_vector(vector)?;
        check_threshold(distance_threshold)?;
        let query = NeighborQuery::new(vector.to_vec(), limit)
            .with_metric(metric)
            .with_max_distance(distance_threshold);
        let hits = self.store.nearest(&query)?;
        Ok(hits.into_iter().map(|n| n.key).collect())
    }

    pub fn distance_between(&self, a: &EntityKey, b: &EntityKey) -> RetrievalResult<f64> {
        self.distance_between_with(a, b, DistanceMetric::Euclidean)
    }

    pub fn distance_between_with(
        &self,
        a: &EntityKey,
        b: &EntityKey,
        metric: DistanceMetric,
    ) -> RetrievalResult<f64> {
        self.store
            .distance(a, b, metric)?
            .ok_or_else(|| RetrievalError::NotFound(format!("no embedding for {a} or {b}")))
    }

    pub fn distance_from(&self, key: &EntityKey, vector: &[f64]) -> RetrievalResult<f64> {
        self.check_vector(vector)?;
        self.store
            .distance_to(key, vector, DistanceMetric::Euclidean)?
            .ok_or_else(|| RetrievalError::NotFound(format!("no embedding for {key}")))
    }

    fn check_vector(&self, vector: &[f64]) -> RetrievalResult<()> {
        let expected = self.vector_len();
        if vector.len() != expected {
            return Err(RetrievalError::InvalidInput(format!(
                "embedding must have {expected} components, got {}",
                vector.len()
            )));
        }
        if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
            return Err(RetrievalError::InvalidInput(format!(
                "embedding component {pos} is not finite"
            )));
        }
        Ok(())
    }
}

fn check_threshold(threshold: Option<f64>) -> RetrievalResult<()> {
    match threshold {
        Some(t) if !t.is_finite() => Err(RetrievalError::InvalidInput(format!(
            "distance threshold must be finite, got {t}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryVectorStore;
    use core_types::ComplexEmbedding;
    use proptest::prelude::*;

    fn retrieval(points: &[(&str, [f64; 4])]) -> EmbeddingRetrieval {
        let store = MemoryVectorStore::from_embeddings(
            2,
            points.iter().map(|(k, v)| {
                (
                    EntityKey::from(*k),
                    ComplexEmbedding::from_concatenated(v, 2).unwrap(),
                )
            }),
        )
        .unwrap();
        EmbeddingRetrieval::new(Arc::new(store))
    }

    fn sample() -> EmbeddingRetrieval {
        retrieval(&[
            ("CHEBI:1", [0.0, 0.0, 0.0, 0.0]),
            ("CHEBI:2", [1.0, 0.0, 0.0, 0.0]),
            ("CHEBI:3", [0.0, 2.0, 0.0, 0.0]),
            ("CHEBI:4", [0.0, 0.0, 3.0, 0.0]),
            ("MONDO:1", [0.0, 0.0, 0.0, 1.0]),
        ])
    }

    fn strs(keys: &[EntityKey]) -> Vec<&str> {
        keys.iter().map(EntityKey::as_str).collect()
    }

    #[test]
    fn get_embedding_and_not_found() {
        let r = sample();
        assert_eq!(r.get_embedding(&"CHEBI:2".into()).unwrap(), vec![1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(
            r.get_embedding(&"nope".into()),
            Err(RetrievalError::NotFound(_))
        ));
    }

    #[test]
    fn get_embeddings_skips_missing() {
        let r = sample();
        let got = r
            .get_embeddings(&["CHEBI:3".into(), "nope".into()])
            .unwrap();
        assert_eq!(got.len(), 1);
        assert!(matches!(
            r.get_embeddings(&["nope".into()]),
            Err(RetrievalError::NotFound(_))
        ));
        assert!(matches!(
            r.get_embeddings(&[]),
            Err(RetrievalError::InvalidInput(_))
        ));
    }

    #[test]
    fn neighbors_exclude_self_and_tie_break_on_key() {
        let r = sample();
        let hits = r.find_neighbors(&"CHEBI:1".into(), None, 5).unwrap();
        // CHEBI:2 and MONDO:1 are both at distance 1.
        assert_eq!(strs(&hits), vec!["CHEBI:2", "MONDO:1", "CHEBI:3", "CHEBI:4"]);

        let hits = r.find_neighbors(&"CHEBI:1".into(), Some(2.0), 5).unwrap();
        assert_eq!(strs(&hits), vec!["CHEBI:2", "MONDO:1"]);

        let hits = r.find_neighbors(&"CHEBI:1".into(), None, 1).unwrap();
        assert_eq!(strs(&hits), vec!["CHEBI:2"]);
    }

    #[test]
    fn neighbors_of_unknown_key_is_not_found() {
        assert!(matches!(
            sample().find_neighbors(&"nope".into(), None, 5),
            Err(RetrievalError::NotFound(_))
        ));
    }

    #[test]
    fn zero_threshold_returns_exact_match_only() {
        let r = sample();
        let hits = r
            .find_entities_by_embedding(&[0.0, 2.0, 0.0, 0.0], Some(0.0), 5)
            .unwrap();
        assert_eq!(strs(&hits), vec!["CHEBI:3"]);
    }

    #[test]
    fn vector_inputs_are_length_checked() {
        let r = sample();
        assert!(matches!(
            r.find_entities_by_embedding(&[0.0; 3], None, 5),
            Err(RetrievalError::InvalidInput(_))
        ));
        assert!(matches!(
            r.distance_from(&"CHEBI:1".into(), &[0.0; 5]),
            Err(RetrievalError::InvalidInput(_))
        ));
        assert!(matches!(
            r.find_entities_by_embedding(&[0.0; 4], Some(f64::NAN), 5),
            Err(RetrievalError::InvalidInput(_))
        ));
    }

    #[test]
    fn non_finite_inputs_are_rejected() {
        let r = sample();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let v = [bad, 0.0, 0.0, 0.0];
            assert!(matches!(
                r.find_entities_by_embedding(&v, None, 5),
                Err(RetrievalError::InvalidInput(_))
            ));
            assert!(matches!(
                r.find_entities_by_embedding_with(&v, DistanceMetric::Cosine, None, 5),
                Err(RetrievalError::InvalidInput(_))
            ));
            assert!(matches!(
                r.distance_from(&"CHEBI:1".into(), &v),
                Err(RetrievalError::InvalidInput(_))
            ));
            assert!(matches!(
                r.find_neighbors(&"CHEBI:1".into(), Some(bad), 5),
                Err(RetrievalError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn distances() {
        let r = sample();
        assert_eq!(r.distance_between(&"CHEBI:2".into(), &"CHEBI:3".into()).unwrap(), 5f64.sqrt());
        assert_eq!(r.distance_from(&"CHEBI:4".into(), &[0.0, 0.0, 0.0, 0.0]).unwrap(), 3.0);
        assert!(matches!(
            r.distance_between(&"CHEBI:2".into(), &"nope".into()),
            Err(RetrievalError::NotFound(_))
        ));
    }

    #[test]
    fn metric_variants_reach_the_store() {
        let r = sample();
        let hits = r
            .find_entities_by_embedding_with(&[1.0, 1.0, 1.0, 1.0], DistanceMetric::InnerProduct, None, 1)
            .unwrap();
        assert_eq!(strs(&hits), vec!["CHEBI:4"]);
        assert_eq!(
            r.distance_between_with(&"CHEBI:2".into(), &"CHEBI:3".into(), DistanceMetric::L1)
                .unwrap(),
            3.0
        );
    }

    proptest! {
        #[test]
        fn neighbor_results_are_bounded_distinct_and_sorted(
            points in prop::collection::vec(prop::array::uniform4(-5.0f64..5.0), 2..30),
            limit in 0usize..10,
            threshold in prop::option::of(0.0f64..8.0),
        ) {
            let names: Vec<String> = (0..points.len()).map(|i| format!("E:{i:03}")).collect();
            let pairs: Vec<(&str, [f64; 4])> =
                names.iter().map(String::as_str).zip(points.iter().copied()).collect();
            let r = retrieval(&pairs);
            let origin = EntityKey::from("E:000");
            let hits = r.find_neighbors(&origin, threshold, limit).unwrap();

            prop_assert!(hits.len() <= limit);
            prop_assert!(!hits.contains(&origin));
            let mut dedup = hits.clone();
            dedup.sort();
            dedup.dedup();
            prop_assert_eq!(dedup.len(), hits.len());

            let dists: Vec<f64> = hits
                .iter()
                .map(|k| r.distance_between(&origin, k).unwrap())
                .collect();
            prop_assert!(dists.windows(2).all(|w| w[0] <= w[1]));
            for (a, b) in names.iter().zip(names.iter().skip(1)) {
                let (a, b) = (EntityKey::from(a.as_str()), EntityKey::from(b.as_str()));
                prop_assert_eq!(r.distance_between(&a, &a).unwrap(), 0.0);
                prop_assert_eq!(r.distance_between(&a, &b).unwrap(), r.distance_between(&b, &a).unwrap());
            }
        }
    }
}
