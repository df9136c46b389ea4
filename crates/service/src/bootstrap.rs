//! Wiring from config to a running server.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use core_serialization::{Snapshot, read_snapshot};
use core_types::config::AppConfig;
use inference::RelationalInference;
use semantic_index::{EmbeddingRetrieval, MemoryPredicateTable, MemoryVectorStore};

use crate::dispatcher::EmbeddingService;
use crate::metrics::ServiceMetrics;
use crate::server;

/// Build the request handler over in-memory tables loaded from `snapshot`.
pub fn build_service(snapshot: &Snapshot, default_limit: usize) -> Result<EmbeddingService> {
    let store = Arc::new(MemoryVectorStore::from_snapshot(snapshot)?);
    let predicates = Arc::new(MemoryPredicateTable::from_snapshot(snapshot)?);
    let inference = RelationalInference::new(store.clone(), predicates)?;
    Ok(EmbeddingService::new(
        EmbeddingRetrieval::new(store),
        inference,
        default_limit,
    ))
}

/// Read the configured snapshot and build the handler, with metrics if enabled.
pub fn load_service(cfg: &AppConfig) -> Result<EmbeddingService> {
    let path = Path::new(&cfg.embeddings.snapshot);
    let snapshot =
        read_snapshot(path).with_context(|| format!("load snapshot {}", path.display()))?;
    if snapshot.dimension != cfg.embeddings.dimension {
        bail!(
            "snapshot {} has dimension {}, config expects {}",
            path.display(),
            snapshot.dimension,
            cfg.embeddings.dimension
        );
    }
    tracing::info!(
        path = %path.display(),
        entities = snapshot.nodes.len(),
        relations = snapshot.edges.len(),
        dimension = snapshot.dimension,
        "snapshot loaded"
    );

    let service = build_service(&snapshot, cfg.embeddings.default_limit)?;
    if cfg.metrics.enabled {
        Ok(service.with_metrics(Arc::new(ServiceMetrics::new()?)))
    } else {
        Ok(service)
    }
}

/// Load everything, bind, and serve until `shutdown` resolves.
pub async fn run_app<F>(cfg: &AppConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let service = load_service(cfg)?;
    let listener = server::bind(&cfg.server.bind_addr).await?;
    server::serve(
        listener,
        Arc::new(service),
        cfg.server.max_message_bytes,
        shutdown,
    )
    .await
}
