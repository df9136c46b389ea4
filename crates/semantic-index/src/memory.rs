use core_serialization::Snapshot;
use core_types::{ComplexEmbedding, EntityKey, RelationSignature, Vector};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

use crate::metric::within_threshold;
use crate::store::{Neighbor, NeighborQuery, PredicateTable, StoreError, VectorStore};

/// Stores at least this large are scanned in parallel.
const PARALLEL_SCAN_MIN: usize = 4096;

/// Exact (brute-force) in-memory vector store.
///
/// Entries are kept sorted by key so a stable sort on distance leaves ties in
/// key order. The store is immutable once built.
#[derive(Debug, Clone)]
pub struct MemoryVectorStore {
    dimension: usize,
    keys: Vec<EntityKey>,
    vectors: Vec<Vector>,
    index: HashMap<EntityKey, usize>,
}

impl MemoryVectorStore {
    pub fn from_embeddings<I>(dimension: usize, embeddings: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (EntityKey, ComplexEmbedding)>,
    {
        let mut sorted = BTreeMap::new();
        for (key, emb) in embeddings {
            if emb.dim() != dimension {
                return Err(StoreError::Dimension {
                    expected: dimension,
                    got: emb.dim(),
                });
            }
            if sorted.insert(key.clone(), emb.concatenated()).is_some() {
                return Err(StoreError::Corrupt(format!("duplicate entity {key}")));
            }
        }

        let mut keys = Vec::with_capacity(sorted.len());
        let mut vectors = Vec::with_capacity(sorted.len());
        let mut index = HashMap::with_capacity(sorted.len());
        for (pos, (key, vector)) in sorted.into_iter().enumerate() {
            index.insert(key.clone(), pos);
            keys.push(key);
            vectors.push(vector);
        }
        Ok(Self {
            dimension,
            keys,
            vectors,
            index,
        })
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, StoreError> {
        let mut embeddings = Vec::with_capacity(snapshot.nodes.len());
        for node in &snapshot.nodes {
            let emb = ComplexEmbedding::new(node.real.clone(), node.imag.clone())
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", node.curie)))?;
            embeddings.push((node.curie.clone(), emb));
        }
        Self::from_embeddings(snapshot.dimension, embeddings)
    }

    fn scored(&self, query: &NeighborQuery) -> Vec<(usize, f64)> {
        self.scan(query, self.vectors.len() >= PARALLEL_SCAN_MIN)
    }

    fn scan(&self, query: &NeighborQuery, parallel: bool) -> Vec<(usize, f64)> {
        let excluded = query.exclude.as_ref().and_then(|k| self.index.get(k).copied());
        let score = |(pos, stored): (usize, &Vector)| {
            if Some(pos) == excluded {
                return None;
            }
            let d = query.metric.distance(stored, &query.vector);
            within_threshold(d, query.max_distance).then_some((pos, d))
        };
        if parallel {
            self.vectors
                .par_iter()
                .enumerate()
                .filter_map(score)
                .collect()
        } else {
            self.vectors.iter().enumerate().filter_map(score).collect()
        }
    }
}

impl VectorStore for MemoryVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn embedding(&self, key: &EntityKey) -> Result<Option<Vector>, StoreError> {
        Ok(self.index.get(key).map(|&pos| self.vectors[pos].clone()))
    }

    fn complex_embeddings(
        &self,
        keys: &[EntityKey],
    ) -> Result<BTreeMap<EntityKey, ComplexEmbedding>, StoreError> {
        let mut out = BTreeMap::new();
        for key in keys {
            if let Some(&pos) = self.index.get(key) {
                let emb = ComplexEmbedding::from_concatenated(&self.vectors[pos], self.dimension)
                    .map_err(|e| StoreError::Corrupt(format!("{key}: {e}")))?;
                out.insert(key.clone(), emb);
            }
        }
        Ok(out)
    }

    fn nearest(&self, query: &NeighborQuery) -> Result<Vec<Neighbor>, StoreError> {
        let expected = 2 * self.dimension;
        if query.vector.len() != expected {
            return Err(StoreError::Dimension {
                expected,
                got: query.vector.len(),
            });
        }
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits = self.scored(query);
        // Positions follow key order, so a stable sort keeps ties sorted by key.
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(query.limit);
        Ok(hits
            .into_iter()
            .map(|(pos, distance)| Neighbor {
                key: self.keys[pos].clone(),
                distance,
            })
            .collect())
    }
}

/// In-memory predicate embedding table.
#[derive(Debug, Clone, Default)]
pub struct MemoryPredicateTable {
    dimension: usize,
    angles: HashMap<RelationSignature, Vector>,
}

impl MemoryPredicateTable {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            angles: HashMap::new(),
        }
    }

    pub fn insert(&mut self, signature: RelationSignature, angles: Vector) -> Result<(), StoreError> {
        if angles.len() != self.dimension {
            return Err(StoreError::Dimension {
                expected: self.dimension,
                got: angles.len(),
            });
        }
        self.angles.insert(signature, angles);
        Ok(())
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, StoreError> {
        let mut table = Self::new(snapshot.dimension);
        for edge in &snapshot.edges {
            table.insert(edge.relation.clone(), edge.angles.clone())?;
        }
        Ok(table)
    }
}

impl PredicateTable for MemoryPredicateTable {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.angles.len()
    }

    fn angles(&self, signature: &RelationSignature) -> Result<Option<Vector>, StoreError> {
        Ok(self.angles.get(signature).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::DistanceMetric;
    use core_serialization::{EdgeRecord, NodeRecord};

    fn emb(real: [f64; 1], imag: [f64; 1]) -> ComplexEmbedding {
        ComplexEmbedding::new(real.to_vec(), imag.to_vec()).unwrap()
    }

    fn store() -> MemoryVectorStore {
        MemoryVectorStore::from_embeddings(
            1,
            [
                ("d".into(), emb([3.0], [0.0])),
                ("b".into(), emb([1.0], [0.0])),
                ("a".into(), emb([0.0], [0.0])),
                ("c".into(), emb([1.0], [0.0])),
            ],
        )
        .unwrap()
    }

    fn keys(hits: &[Neighbor]) -> Vec<&str> {
        hits.iter().map(|h| h.key.as_str()).collect()
    }

    #[test]
    fn nearest_orders_by_distance_then_key() {
        let s = store();
        let hits = s.nearest(&NeighborQuery::new(vec![0.0, 0.0], 10)).unwrap();
        assert_eq!(keys(&hits), vec!["a", "b", "c", "d"]);
        assert_eq!(hits[3].distance, 3.0);
    }

    #[test]
    fn nearest_applies_exclusion_threshold_and_limit() {
        let s = store();
        let q = NeighborQuery::new(vec![0.0, 0.0], 2)
            .excluding("a".into())
            .with_max_distance(Some(2.0));
        assert_eq!(keys(&s.nearest(&q).unwrap()), vec!["b", "c"]);

        let q = NeighborQuery::new(vec![0.0, 0.0], 10).with_max_distance(Some(1.0));
        assert_eq!(keys(&s.nearest(&q).unwrap()), vec!["a"]);

        let q = NeighborQuery::new(vec![0.0, 0.0], 0);
        assert!(s.nearest(&q).unwrap().is_empty());
    }

    #[test]
    fn parallel_scan_keeps_key_order_on_ties() {
        let n = PARALLEL_SCAN_MIN + 904;
        let s = MemoryVectorStore::from_embeddings(
            1,
            (0..n).map(|i| (EntityKey::new(format!("K{i:05}")), emb([(i % 3) as f64], [0.0]))),
        )
        .unwrap();

        let hits = s.nearest(&NeighborQuery::new(vec![0.0, 0.0], 4)).unwrap();
        assert_eq!(keys(&hits), vec!["K00000", "K00003", "K00006", "K00009"]);

        let q = NeighborQuery::new(vec![0.0, 0.0], n).excluding("K00000".into());
        let all = s.nearest(&q).unwrap();
        assert_eq!(all.len(), n - 1);
        assert!(all.windows(2).all(|w| {
            w[0].distance < w[1].distance || (w[0].distance == w[1].distance && w[0].key < w[1].key)
        }));

        let q = q.with_max_distance(Some(2.0));
        assert_eq!(s.scan(&q, true), s.scan(&q, false));
    }

    #[test]
    fn nearest_rejects_wrong_length() {
        let err = store().nearest(&NeighborQuery::new(vec![0.0], 1)).unwrap_err();
        assert_eq!(err, StoreError::Dimension { expected: 2, got: 1 });
    }

    #[test]
    fn other_metrics_are_honoured() {
        let s = store();
        let q = NeighborQuery::new(vec![1.0, 0.0], 1).with_metric(DistanceMetric::InnerProduct);
        // Largest inner product wins.
        assert_eq!(keys(&s.nearest(&q).unwrap()), vec!["d"]);
    }

    #[test]
    fn halves_come_back_split() {
        let s = MemoryVectorStore::from_embeddings(
            2,
            [(
                "x".into(),
                ComplexEmbedding::new(vec![1.0, 2.0], vec![3.0, 4.0]).unwrap(),
            )],
        )
        .unwrap();
        let got = s
            .complex_embeddings(&["x".into(), "missing".into()])
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[&EntityKey::from("x")].imag(), &[3.0, 4.0]);
        assert_eq!(s.embedding(&"x".into()).unwrap(), Some(vec![1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn rejects_duplicates_and_bad_dimensions() {
        let dup = MemoryVectorStore::from_embeddings(
            1,
            [("a".into(), emb([0.0], [0.0])), ("a".into(), emb([1.0], [0.0]))],
        );
        assert!(matches!(dup, Err(StoreError::Corrupt(_))));

        let mut table = MemoryPredicateTable::new(2);
        assert!(table
            .insert(RelationSignature::predicate("p"), vec![0.0])
            .is_err());
    }

    #[test]
    fn snapshot_builds_both_tables() {
        let snap = Snapshot {
            dimension: 1,
            nodes: vec![NodeRecord {
                curie: "n".into(),
                real: vec![1.0],
                imag: vec![2.0],
            }],
            edges: vec![EdgeRecord {
                relation: RelationSignature::predicate("p").with_subject_direction("increased"),
                angles: vec![0.25],
            }],
        };
        let store = MemoryVectorStore::from_snapshot(&snap).unwrap();
        let table = MemoryPredicateTable::from_snapshot(&snap).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            table
                .angles(&RelationSignature::predicate("p").with_subject_direction("increased"))
                .unwrap(),
            Some(vec![0.25])
        );
        assert_eq!(table.angles(&RelationSignature::predicate("p")).unwrap(), None);
    }
}
