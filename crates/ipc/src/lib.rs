//! Wire protocol models for embserve.
//!
//! Requests and responses are bincode-encoded inside length-prefixed frames
//! (see [`framing`]). The models mirror the service operations without
//! pulling in index or inference dependencies; the service maps them onto
//! the retrieval and inference components.

use core_types::{EntityKey, InferenceRequest, Qualifier, RelationSignature, Vector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub mod client;
pub mod framing;

pub use client::TcpClient;

/// Distance functions a caller may ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    #[default]
    Euclidean,
    InnerProduct,
    Cosine,
    L1,
    Hamming,
    Jaccard,
}

/// Relation as sent by callers; qualifiers are optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub predicate: String,
    pub object_aspect_qualifier: Option<String>,
    pub object_direction_qualifier: Option<String>,
    pub subject_aspect_qualifier: Option<String>,
    pub subject_direction_qualifier: Option<String>,
}

impl Relation {
    pub fn new(predicate: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
            ..Self::default()
        }
    }

    /// Normalized lookup key: absent qualifiers become the unset sentinel.
    pub fn signature(&self) -> RelationSignature {
        RelationSignature {
            predicate: self.predicate.clone(),
            object_aspect_qualifier: Qualifier::from(self.object_aspect_qualifier.clone()),
            object_direction_qualifier: Qualifier::from(self.object_direction_qualifier.clone()),
            subject_aspect_qualifier: Qualifier::from(self.subject_aspect_qualifier.clone()),
            subject_direction_qualifier: Qualifier::from(self.subject_direction_qualifier.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestKind {
    /// Concatenated embeddings for one or more curies.
    GetEmbedding { curies: Vec<EntityKey> },
    FindNeighbors {
        curie: EntityKey,
        distance_threshold: Option<f64>,
        /// `None` or zero means the service default.
        curie_limit: Option<u32>,
        metric: MetricKind,
    },
    FindCuries {
        embedding: Vector,
        distance_threshold: Option<f64>,
        curie_limit: Option<u32>,
        metric: MetricKind,
    },
    DistanceBetween { a: EntityKey, b: EntityKey },
    DistanceFrom { curie: EntityKey, embedding: Vector },
    /// Predict the embedding reached from each source through `relation`.
    PredictNode {
        source: InferenceRequest,
        relation: Option<Relation>,
    },
    Status,
    /// Prometheus text exposition of the service counters.
    Metrics,
}

impl RequestKind {
    /// Stable operation label for logs and metrics.
    pub const fn op(&self) -> &'static str {
        match self {
            RequestKind::GetEmbedding { .. } => "get_embedding",
            RequestKind::FindNeighbors { .. } => "find_neighbors",
            RequestKind::FindCuries { .. } => "find_curies",
            RequestKind::DistanceBetween { .. } => "distance_between",
            RequestKind::DistanceFrom { .. } => "distance_from",
            RequestKind::PredictNode { .. } => "predict_node",
            RequestKind::Status => "status",
            RequestKind::Metrics => "metrics",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub kind: RequestKind,
}

impl Request {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub empty_results_total: u64,
    pub mean_latency_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub entities: u64,
    pub relations: u64,
    pub dimension: u32,
    pub uptime_secs: u64,
    pub metrics: Option<MetricsSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ResponseBody {
    Embeddings(BTreeMap<EntityKey, Vector>),
    Curies(Vec<EntityKey>),
    Distance(f64),
    NodeEmbeddings(BTreeMap<EntityKey, Vector>),
    Status(StatusInfo),
    Metrics(String),
    /// Nothing to report; `logs` says why.
    #[default]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub body: ResponseBody,
    pub logs: Vec<String>,
    pub took_ms: u32,
    pub served_by: Option<String>,
}

impl Response {
    pub fn new(id: Uuid, body: ResponseBody) -> Self {
        Self {
            id,
            body,
            logs: Vec::new(),
            took_ms: 0,
            served_by: None,
        }
    }

    pub fn empty(id: Uuid, log: impl Into<String>) -> Self {
        Self {
            logs: vec![log.into()],
            ..Self::new(id, ResponseBody::Empty)
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.body {
            ResponseBody::Empty => true,
            ResponseBody::Embeddings(m) | ResponseBody::NodeEmbeddings(m) => m.is_empty(),
            ResponseBody::Curies(c) => c.is_empty(),
            ResponseBody::Metrics(text) => text.is_empty(),
            ResponseBody::Distance(_) | ResponseBody::Status(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bincode_roundtrip_request() {
        let req = Request::new(RequestKind::PredictNode {
            source: InferenceRequest::ByEmbeddings(BTreeMap::from([(
                EntityKey::from("CHEBI:45783"),
                vec![0.5; 40],
            )])),
            relation: Some(Relation {
                object_direction_qualifier: Some("increased".into()),
                ..Relation::new("biolink:treats")
            }),
        });

        let bytes = bincode::serialize(&req).expect("serialize");
        let back: Request = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(back, req);
        assert_eq!(back.kind.op(), "predict_node");
    }

    #[test]
    fn relation_signature_fills_sentinels() {
        let rel = Relation {
            subject_aspect_qualifier: Some("None".into()),
            object_aspect_qualifier: Some("activity".into()),
            ..Relation::new("biolink:affects")
        };
        let sig = rel.signature();
        assert_eq!(
            sig,
            RelationSignature::predicate("biolink:affects").with_object_aspect("activity")
        );
        assert!(sig.subject_aspect_qualifier.is_unset());
    }

    #[test]
    fn relation_accepts_json_with_missing_qualifiers() {
        let rel: Relation = serde_json::from_str(
            r#"{"predicate":"biolink:treats","object_aspect_qualifier":null,
                "object_direction_qualifier":null,"subject_aspect_qualifier":null,
                "subject_direction_qualifier":null}"#,
        )
        .unwrap();
        assert_eq!(rel.signature(), RelationSignature::predicate("biolink:treats"));
    }

    #[test]
    fn emptiness_follows_body() {
        let id = Uuid::nil();
        assert!(Response::empty(id, "nothing").is_empty());
        assert!(Response::new(id, ResponseBody::Curies(vec![])).is_empty());
        assert!(!Response::new(id, ResponseBody::Distance(0.0)).is_empty());
    }
}
