//! Semantic / vector search over entity embeddings.
//!
//! `store` holds the collaborator contracts (vector store, predicate table),
//! `memory` an exact in-memory implementation of both, and `retrieval` the
//! nearest-neighbor and distance operations built on top of them.

pub mod memory;
pub mod metric;
pub mod retrieval;
pub mod store;

pub use memory::{MemoryPredicateTable, MemoryVectorStore};
pub use metric::{DistanceMetric, UnknownMetric};
pub use retrieval::{EmbeddingRetrieval, RetrievalError, RetrievalResult};
pub use store::{Neighbor, NeighborQuery, PredicateTable, StoreError, VectorStore};
