//! Maps wire requests onto retrieval and inference.
//!
//! Handlers never fail: every error becomes an empty response whose `logs`
//! carry the reason, and is also emitted as a tracing event.

use std::sync::Arc;
use std::time::Instant;

use inference::{InferenceError, RelationalInference};
use ipc::{MetricKind, Request, RequestKind, Response, ResponseBody};
use semantic_index::{DistanceMetric, EmbeddingRetrieval, RetrievalError, StoreError};
use thiserror::Error;

use crate::metrics::{ServiceMetrics, scrape_metrics};
use crate::status::{host_label, make_status};

/// Executes requests arriving over the wire.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, req: Request) -> Response;
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(StoreError),
    #[error("{0} is disabled")]
    Disabled(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RetrievalError> for DispatchError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::InvalidInput(m) => DispatchError::InvalidInput(m),
            RetrievalError::NotFound(m) => DispatchError::NotFound(m),
            RetrievalError::Storage(e) => DispatchError::Storage(e),
        }
    }
}

impl From<InferenceError> for DispatchError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::InvalidInput(m) => DispatchError::InvalidInput(m),
            InferenceError::Storage(e) => DispatchError::Storage(e),
        }
    }
}

pub fn distance_metric(kind: MetricKind) -> DistanceMetric {
    match kind {
        MetricKind::Euclidean => DistanceMetric::Euclidean,
        MetricKind::InnerProduct => DistanceMetric::InnerProduct,
        MetricKind::Cosine => DistanceMetric::Cosine,
        MetricKind::L1 => DistanceMetric::L1,
        MetricKind::Hamming => DistanceMetric::Hamming,
        MetricKind::Jaccard => DistanceMetric::Jaccard,
    }
}

/// The embserve request handler.
#[derive(Debug)]
pub struct EmbeddingService {
    retrieval: EmbeddingRetrieval,
    inference: RelationalInference,
    default_limit: usize,
    metrics: Option<Arc<ServiceMetrics>>,
    started: Instant,
    served_by: String,
}

impl EmbeddingService {
    pub fn new(
        retrieval: EmbeddingRetrieval,
        inference: RelationalInference,
        default_limit: usize,
    ) -> Self {
        Self {
            retrieval,
            inference,
            default_limit: default_limit.max(1),
            metrics: None,
            started: Instant::now(),
            served_by: host_label(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&Arc<ServiceMetrics>> {
        self.metrics.as_ref()
    }

    /// `None` or zero selects the configured default.
    fn limit(&self, requested: Option<u32>) -> usize {
        match requested {
            Some(n) if n > 0 => n as usize,
            _ => self.default_limit,
        }
    }

    fn execute(&self, kind: &RequestKind) -> Result<(ResponseBody, Vec<String>), DispatchError> {
        let mut logs = Vec::new();
        let body = match kind {
            RequestKind::GetEmbedding { curies } => {
                let found = self.retrieval.get_embeddings(curies)?;
                let missing = curies.iter().filter(|k| !found.contains_key(*k)).count();
                if missing > 0 {
                    logs.push(format!("{missing} curies had no embedding"));
                }
                ResponseBody::Embeddings(found)
            }
            RequestKind::FindNeighbors {
                curie,
                distance_threshold,
                curie_limit,
                metric,
            } => ResponseBody::Curies(self.retrieval.find_neighbors_with(
                curie,
                distance_metric(*metric),
                *distance_threshold,
                self.limit(*curie_limit),
            )?),
            RequestKind::FindCuries {
                embedding,
                distance_threshold,
                curie_limit,
                metric,
            } => ResponseBody::Curies(self.retrieval.find_entities_by_embedding_with(
                embedding,
                distance_metric(*metric),
                *distance_threshold,
                self.limit(*curie_limit),
            )?),
            RequestKind::DistanceBetween { a, b } => {
                ResponseBody::Distance(self.retrieval.distance_between(a, b)?)
            }
            RequestKind::DistanceFrom { curie, embedding } => {
                ResponseBody::Distance(self.retrieval.distance_from(curie, embedding)?)
            }
            RequestKind::PredictNode { source, relation } => {
                let relation = relation
                    .as_ref()
                    .ok_or_else(|| DispatchError::InvalidInput("no relation given".into()))?;
                let predictions = self.inference.infer(source, &relation.signature())?;
                if predictions.is_empty() {
                    logs.push(format!(
                        "no prediction: relation {} or a source embedding is unknown",
                        relation.predicate
                    ));
                    ResponseBody::Empty
                } else {
                    ResponseBody::NodeEmbeddings(predictions)
                }
            }
            RequestKind::Status => ResponseBody::Status(make_status(
                self.retrieval.store().len(),
                self.inference.relations(),
                self.inference.dimension(),
                self.started,
                self.metrics.as_ref().map(|m| m.snapshot()),
            )),
            RequestKind::Metrics => {
                let metrics = self.metrics.as_ref().ok_or(DispatchError::Disabled("metrics"))?;
                let text =
                    scrape_metrics(metrics).map_err(|e| DispatchError::Internal(e.to_string()))?;
                ResponseBody::Metrics(text)
            }
        };
        Ok((body, logs))
    }
}

impl RequestHandler for EmbeddingService {
    fn handle(&self, req: Request) -> Response {
        let started = Instant::now();
        let op = req.kind.op();

        let mut resp = match self.execute(&req.kind) {
            Ok((body, logs)) => Response {
                logs,
                ..Response::new(req.id, body)
            },
            Err(err) => {
                match &err {
                    DispatchError::Storage(e) => {
                        tracing::warn!(op, id = %req.id, error = %e, "storage failure")
                    }
                    DispatchError::Internal(e) => {
                        tracing::error!(op, id = %req.id, error = %e, "request failed")
                    }
                    _ => tracing::debug!(op, id = %req.id, error = %err, "request rejected"),
                }
                Response::empty(req.id, err.to_string())
            }
        };

        let elapsed = started.elapsed();
        resp.took_ms = u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX);
        resp.served_by = Some(self.served_by.clone());
        if let Some(metrics) = &self.metrics {
            metrics.record(op, elapsed, resp.is_empty());
        }
        tracing::debug!(op, id = %req.id, took_ms = resp.took_ms, empty = resp.is_empty(), "request served");
        resp
    }
}
