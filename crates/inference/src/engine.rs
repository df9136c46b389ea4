use core_types::{ComplexEmbedding, EntityKey, InferenceRequest, RelationSignature, Vector};
use semantic_index::{PredicateTable, StoreError, VectorStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::complex::Rotation;

/// Predicted target embedding per source entity.
pub type Predictions = BTreeMap<EntityKey, Vector>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// RotatE-style inference: the predicted embedding of the entity standing in
/// `relation` to `e` is the elementwise complex product `e * r`, where `r` is
/// the unit rotation built from the relation's stored angles.
///
/// Batches are all-or-nothing. A missing relation or a single missing source
/// embedding yields an empty result rather than a partial one.
#[derive(Clone)]
pub struct RelationalInference {
    store: Arc<dyn VectorStore>,
    predicates: Arc<dyn PredicateTable>,
}

impl std::fmt::Debug for RelationalInference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalInference")
            .field("dimension", &self.store.dimension())
            .field("relations", &self.predicates.len())
            .finish()
    }
}

impl RelationalInference {
    pub fn new(
        store: Arc<dyn VectorStore>,
        predicates: Arc<dyn PredicateTable>,
    ) -> Result<Self, InferenceError> {
        if store.dimension() != predicates.dimension() {
            return Err(StoreError::Corrupt(format!(
                "entity dimension {} differs from relation dimension {}",
                store.dimension(),
                predicates.dimension()
            ))
            .into());
        }
        Ok(Self { store, predicates })
    }

    /// Per-half dimension D.
    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    /// Number of relation signatures in the predicate table.
    pub fn relations(&self) -> usize {
        self.predicates.len()
    }

    pub fn infer(
        &self,
        request: &InferenceRequest,
        relation: &RelationSignature,
    ) -> Result<Predictions, InferenceError> {
        match request {
            InferenceRequest::ByKeys(keys) => self.infer_from_curies(keys, relation),
            InferenceRequest::ByEmbeddings(map) => self.infer_from_embeddings(map, relation),
        }
    }

    /// Rotate the stored embeddings of `keys` by `relation`.
    pub fn infer_from_curies(
        &self,
        keys: &[EntityKey],
        relation: &RelationSignature,
    ) -> Result<Predictions, InferenceError> {
        if keys.is_empty() {
            return Err(InferenceError::InvalidInput("no entity keys given".into()));
        }

        let sources = self.store.complex_embeddings(keys)?;
        if let Some(missing) = keys.iter().find(|k| !sources.contains_key(*k)) {
            tracing::debug!(curie = %missing, "missing source embedding; dropping batch");
            return Ok(Predictions::new());
        }

        let Some(rotation) = self.rotation(relation)? else {
            return Ok(Predictions::new());
        };
        self.check_rotation(&rotation)?;

        Ok(sources
            .iter()
            .map(|(key, emb)| (key.clone(), rotation.apply(emb)))
            .collect())
    }

    /// Rotate caller-supplied concatenated embeddings by `relation`.
    pub fn infer_from_embeddings(
        &self,
        embeddings: &BTreeMap<EntityKey, Vector>,
        relation: &RelationSignature,
    ) -> Result<Predictions, InferenceError> {
        if embeddings.is_empty() {
            return Err(InferenceError::InvalidInput("no embeddings given".into()));
        }

        let dim = self.dimension();
        let mut sources = Vec::with_capacity(embeddings.len());
        for (key, vector) in embeddings {
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(InferenceError::InvalidInput(format!(
                    "{key}: embedding has non-finite components"
                )));
            }
            let emb = ComplexEmbedding::from_concatenated(vector, dim)
                .map_err(|e| InferenceError::InvalidInput(format!("{key}: {e}")))?;
            sources.push((key, emb));
        }

        let Some(rotation) = self.rotation(relation)? else {
            return Ok(Predictions::new());
        };
        self.check_rotation(&rotation)?;

        Ok(sources
            .into_iter()
            .map(|(key, emb)| (key.clone(), rotation.apply(&emb)))
            .collect())
    }

    fn rotation(&self, relation: &RelationSignature) -> Result<Option<Rotation>, InferenceError> {
        let angles = self.predicates.angles(relation)?;
        if angles.is_none() {
            tracing::debug!(%relation, "unknown relation signature");
        }
        Ok(angles.map(|theta| Rotation::from_angles(&theta)))
    }

    fn check_rotation(&self, rotation: &Rotation) -> Result<(), InferenceError> {
        if rotation.dim() != self.dimension() {
            return Err(StoreError::Dimension {
                expected: self.dimension(),
                got: rotation.dim(),
            }
            .into());
        }
        Ok(())
    }
}
