//! Argument helpers shared by the embserve CLI.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use core_types::{EntityKey, Vector};
use ipc::{MetricKind, Relation};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MetricArg {
    #[default]
    Euclidean,
    InnerProduct,
    Cosine,
    L1,
    Hamming,
    Jaccard,
}

impl From<MetricArg> for MetricKind {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Euclidean => MetricKind::Euclidean,
            MetricArg::InnerProduct => MetricKind::InnerProduct,
            MetricArg::Cosine => MetricKind::Cosine,
            MetricArg::L1 => MetricKind::L1,
            MetricArg::Hamming => MetricKind::Hamming,
            MetricArg::Jaccard => MetricKind::Jaccard,
        }
    }
}

/// Parse a vector given either as a JSON array or as comma-separated numbers.
pub fn parse_vector(raw: &str) -> Result<Vector> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("embedding is not a JSON array of numbers");
    }
    let values = trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().with_context(|| format!("not a number: {s:?}")))
        .collect::<Result<Vector>>()?;
    if values.is_empty() {
        bail!("embedding is empty");
    }
    Ok(values)
}

/// Parse `{"curie": [..], ...}` into inline source embeddings.
pub fn parse_embedding_map(raw: &str) -> Result<BTreeMap<EntityKey, Vector>> {
    let map: BTreeMap<EntityKey, Vector> =
        serde_json::from_str(raw.trim()).context("embeddings must be a JSON object of arrays")?;
    if map.is_empty() {
        bail!("no embeddings given");
    }
    Ok(map)
}

/// Relation from a predicate plus optional qualifiers; `None` stays unset.
pub fn relation(
    predicate: &str,
    object_aspect: Option<String>,
    object_direction: Option<String>,
    subject_aspect: Option<String>,
    subject_direction: Option<String>,
) -> Relation {
    Relation {
        object_aspect_qualifier: object_aspect,
        object_direction_qualifier: object_direction,
        subject_aspect_qualifier: subject_aspect,
        subject_direction_qualifier: subject_direction,
        ..Relation::new(predicate)
    }
}
