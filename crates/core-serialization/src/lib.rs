//! On-disk snapshot of the trained node and edge embeddings.
//!
//! The offline training job produces one snapshot; the service loads it once at
//! startup. JSON is convenient for small fixtures, bincode for full exports.

use core_types::{EntityKey, RelationSignature, Vector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot bincode: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("unsupported snapshot extension for {0} (expected .json or .bin)")]
    UnknownFormat(String),
    #[error("snapshot dimension must be greater than zero")]
    ZeroDimension,
    #[error("node {curie}: expected {expected} components per half, got real={real} imag={imag}")]
    NodeShape {
        curie: EntityKey,
        expected: usize,
        real: usize,
        imag: usize,
    },
    #[error("relation {relation}: expected {expected} angles, got {got}")]
    EdgeShape {
        relation: RelationSignature,
        expected: usize,
        got: usize,
    },
    #[error("duplicate node {0}")]
    DuplicateNode(EntityKey),
    #[error("duplicate relation {0}")]
    DuplicateRelation(RelationSignature),
}

/// Real and imaginary halves of one entity embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub curie: EntityKey,
    pub real: Vector,
    pub imag: Vector,
}

/// Rotation angles (radians) of one relation signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub relation: RelationSignature,
    pub angles: Vector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub dimension: usize,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Bincode,
}

impl SnapshotFormat {
    pub fn from_path(path: &Path) -> Result<Self, SnapshotError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("bin") => Ok(Self::Bincode),
            _ => Err(SnapshotError::UnknownFormat(path.display().to_string())),
        }
    }
}

impl Snapshot {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Check half lengths, angle lengths and key uniqueness.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.dimension == 0 {
            return Err(SnapshotError::ZeroDimension);
        }
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if node.real.len() != self.dimension || node.imag.len() != self.dimension {
                return Err(SnapshotError::NodeShape {
                    curie: node.curie.clone(),
                    expected: self.dimension,
                    real: node.real.len(),
                    imag: node.imag.len(),
                });
            }
            if !seen.insert(&node.curie) {
                return Err(SnapshotError::DuplicateNode(node.curie.clone()));
            }
        }
        let mut seen = HashSet::with_capacity(self.edges.len());
        for edge in &self.edges {
            if edge.angles.len() != self.dimension {
                return Err(SnapshotError::EdgeShape {
                    relation: edge.relation.clone(),
                    expected: self.dimension,
                    got: edge.angles.len(),
                });
            }
            if !seen.insert(&edge.relation) {
                return Err(SnapshotError::DuplicateRelation(edge.relation.clone()));
            }
        }
        Ok(())
    }
}

/// Read and validate a snapshot; the format follows the file extension.
pub fn read_snapshot(path: &Path) -> Result<Snapshot, SnapshotError> {
    let format = SnapshotFormat::from_path(path)?;
    let reader = BufReader::new(File::open(path)?);
    let snapshot: Snapshot = match format {
        SnapshotFormat::Json => serde_json::from_reader(reader)?,
        SnapshotFormat::Bincode => bincode::deserialize_from(reader)?,
    };
    snapshot.validate()?;
    tracing::debug!(
        path = %path.display(),
        nodes = snapshot.nodes.len(),
        edges = snapshot.edges.len(),
        dimension = snapshot.dimension,
        "snapshot read"
    );
    Ok(snapshot)
}

pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    snapshot.validate()?;
    let format = SnapshotFormat::from_path(path)?;
    let writer = BufWriter::new(File::create(path)?);
    match format {
        SnapshotFormat::Json => serde_json::to_writer(writer, snapshot)?,
        SnapshotFormat::Bincode => bincode::serialize_into(writer, snapshot)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Snapshot {
        Snapshot {
            dimension: 2,
            nodes: vec![NodeRecord {
                curie: "CHEBI:1".into(),
                real: vec![1.0, 0.0],
                imag: vec![0.0, 1.0],
            }],
            edges: vec![EdgeRecord {
                relation: RelationSignature::predicate("biolink:treats"),
                angles: vec![0.5, -0.5],
            }],
        }
    }

    #[test]
    fn bincode_and_json_files_load() {
        let dir = tempdir().unwrap();
        for name in ["snap.json", "snap.bin"] {
            let path = dir.path().join(name);
            write_snapshot(&path, &sample()).unwrap();
            assert_eq!(read_snapshot(&path).unwrap(), sample());
        }
    }

    #[test]
    fn json_qualifiers_default_to_sentinel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(
            &path,
            r#"{"dimension":1,"nodes":[],"edges":[{"relation":{"predicate":"biolink:treats"},"angles":[0.1]}]}"#,
        )
        .unwrap();
        let snap = read_snapshot(&path).unwrap();
        assert!(snap.edges[0].relation.object_aspect_qualifier.is_unset());
    }

    #[test]
    fn rejects_bad_shapes_and_duplicates() {
        let mut snap = sample();
        snap.nodes[0].imag.push(3.0);
        assert!(matches!(snap.validate(), Err(SnapshotError::NodeShape { .. })));

        let mut snap = sample();
        snap.nodes.push(snap.nodes[0].clone());
        assert!(matches!(snap.validate(), Err(SnapshotError::DuplicateNode(_))));

        let mut snap = sample();
        snap.edges[0].angles.clear();
        assert!(matches!(snap.validate(), Err(SnapshotError::EdgeShape { .. })));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            SnapshotFormat::from_path(Path::new("x.csv")),
            Err(SnapshotError::UnknownFormat(_))
        ));
    }
}
