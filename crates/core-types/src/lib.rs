//! Core identifiers and shared lightweight types for embserve.
//!
//! These types intentionally avoid heavy dependencies and aim to be
//! serialization-friendly for bincode and JSON payloads.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod config;

/// Dense real vector; all embedding arithmetic is done in double precision.
pub type Vector = Vec<f64>;

/// Per-half embedding dimension D of the reference deployment (concatenated vectors are 2D).
pub const DEFAULT_DIMENSION: usize = 20;

/// Result count used when a caller does not ask for a specific limit.
pub const DEFAULT_LIMIT: usize = 5;

/// Literal stored in the predicate table for a qualifier that is not set.
pub const QUALIFIER_SENTINEL: &str = "None";

/// Compact URI identifying a biomedical entity (e.g. `CHEBI:45783`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for EntityKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Aspect/direction modifier narrowing a predicate.
///
/// `Unset` is written as the `"None"` sentinel so it can be matched exactly
/// against the predicate table; reading `"None"` back yields `Unset`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Qualifier {
    #[default]
    Unset,
    Value(String),
}

impl Qualifier {
    pub fn as_str(&self) -> &str {
        match self {
            Qualifier::Unset => QUALIFIER_SENTINEL,
            Qualifier::Value(v) => v,
        }
    }

    pub const fn is_unset(&self) -> bool {
        matches!(self, Qualifier::Unset)
    }
}

impl From<String> for Qualifier {
    fn from(value: String) -> Self {
        if value.is_empty() || value == QUALIFIER_SENTINEL {
            Qualifier::Unset
        } else {
            Qualifier::Value(value)
        }
    }
}

impl From<Option<String>> for Qualifier {
    fn from(value: Option<String>) -> Self {
        value.map_or(Qualifier::Unset, Qualifier::from)
    }
}

impl From<&str> for Qualifier {
    fn from(value: &str) -> Self {
        Qualifier::from(value.to_string())
    }
}

impl From<Qualifier> for String {
    fn from(value: Qualifier) -> Self {
        match value {
            Qualifier::Unset => QUALIFIER_SENTINEL.to_string(),
            Qualifier::Value(v) => v,
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact-match key into the predicate embedding table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationSignature {
    pub predicate: String,
    #[serde(default)]
    pub object_aspect_qualifier: Qualifier,
    #[serde(default)]
    pub object_direction_qualifier: Qualifier,
    #[serde(default)]
    pub subject_aspect_qualifier: Qualifier,
    #[serde(default)]
    pub subject_direction_qualifier: Qualifier,
}

impl RelationSignature {
    /// Signature with every qualifier unset.
    pub fn predicate(predicate: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
            object_aspect_qualifier: Qualifier::Unset,
            object_direction_qualifier: Qualifier::Unset,
            subject_aspect_qualifier: Qualifier::Unset,
            subject_direction_qualifier: Qualifier::Unset,
        }
    }

    pub fn with_object_aspect(mut self, q: impl Into<Qualifier>) -> Self {
        self.object_aspect_qualifier = q.into();
        self
    }

    pub fn with_object_direction(mut self, q: impl Into<Qualifier>) -> Self {
        self.object_direction_qualifier = q.into();
        self
    }

    pub fn with_subject_aspect(mut self, q: impl Into<Qualifier>) -> Self {
        self.subject_aspect_qualifier = q.into();
        self
    }

    pub fn with_subject_direction(mut self, q: impl Into<Qualifier>) -> Self {
        self.subject_direction_qualifier = q.into();
        self
    }
}

impl fmt::Display for RelationSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[oa={}, od={}, sa={}, sd={}]",
            self.predicate,
            self.object_aspect_qualifier,
            self.object_direction_qualifier,
            self.subject_aspect_qualifier,
            self.subject_direction_qualifier
        )
    }
}

/// Source entities for an inference call: looked up by key or supplied inline
/// as concatenated `real ++ imag` vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InferenceRequest {
    ByKeys(Vec<EntityKey>),
    ByEmbeddings(BTreeMap<EntityKey, Vector>),
}

impl InferenceRequest {
    pub fn len(&self) -> usize {
        match self {
            InferenceRequest::ByKeys(keys) => keys.len(),
            InferenceRequest::ByEmbeddings(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("real part has {real} components but imaginary part has {imag}")]
    HalfMismatch { real: usize, imag: usize },
    #[error("expected a vector of length {expected}, got {got}")]
    Length { expected: usize, got: usize },
}

/// Entity embedding as a complex vector `real + i*imag`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexEmbedding {
    real: Vector,
    imag: Vector,
}

impl ComplexEmbedding {
    pub fn new(real: Vector, imag: Vector) -> Result<Self, ShapeError> {
        if real.len() != imag.len() {
            return Err(ShapeError::HalfMismatch {
                real: real.len(),
                imag: imag.len(),
            });
        }
        Ok(Self { real, imag })
    }

    /// Split a `real ++ imag` vector of length `2 * dim` into its halves.
    pub fn from_concatenated(vector: &[f64], dim: usize) -> Result<Self, ShapeError> {
        if vector.len() != 2 * dim {
            return Err(ShapeError::Length {
                expected: 2 * dim,
                got: vector.len(),
            });
        }
        let (real, imag) = vector.split_at(dim);
        Ok(Self {
            real: real.to_vec(),
            imag: imag.to_vec(),
        })
    }

    pub fn dim(&self) -> usize {
        self.real.len()
    }

    pub fn real(&self) -> &[f64] {
        &self.real
    }

    pub fn imag(&self) -> &[f64] {
        &self.imag
    }

    /// `real ++ imag`, the form used for similarity search.
    pub fn concatenated(&self) -> Vector {
        let mut out = Vec::with_capacity(self.real.len() * 2);
        out.extend_from_slice(&self.real);
        out.extend_from_slice(&self.imag);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifier_sentinel_normalizes() {
        assert_eq!(Qualifier::from("None"), Qualifier::Unset);
        assert_eq!(Qualifier::from(None::<String>), Qualifier::Unset);
        assert_eq!(Qualifier::from(""), Qualifier::Unset);
        assert_eq!(
            Qualifier::from("activity"),
            Qualifier::Value("activity".into())
        );
        assert_eq!(String::from(Qualifier::Unset), "None");
    }

    #[test]
    fn signature_json_uses_sentinel() {
        let sig = RelationSignature::predicate("biolink:affects").with_object_aspect("activity");
        let json = serde_json::to_value(&sig).unwrap();
        assert_eq!(json["object_aspect_qualifier"], "activity");
        assert_eq!(json["subject_direction_qualifier"], "None");

        let back: RelationSignature =
            serde_json::from_str(r#"{"predicate":"biolink:affects","object_aspect_qualifier":"activity"}"#)
                .unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn concatenated_split_keeps_halves() {
        let emb = ComplexEmbedding::from_concatenated(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(emb.real(), &[1.0, 2.0]);
        assert_eq!(emb.imag(), &[3.0, 4.0]);
        assert_eq!(emb.concatenated(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn shape_errors_are_reported() {
        assert_eq!(
            ComplexEmbedding::new(vec![1.0], vec![]),
            Err(ShapeError::HalfMismatch { real: 1, imag: 0 })
        );
        assert_eq!(
            ComplexEmbedding::from_concatenated(&[1.0, 2.0, 3.0], 2),
            Err(ShapeError::Length {
                expected: 4,
                got: 3
            })
        );
    }
}
