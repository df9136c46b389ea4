use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Distance functions understood by the vector store.
///
/// Every variant is a distance: smaller means closer. Inner product is negated
/// so it sorts the same way as the others. Hamming and Jaccard treat a
/// component as set when it is non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    InnerProduct,
    Cosine,
    L1,
    Hamming,
    Jaccard,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown distance metric: {0}")]
pub struct UnknownMetric(pub String);

impl DistanceMetric {
    pub const ALL: [DistanceMetric; 6] = [
        DistanceMetric::Euclidean,
        DistanceMetric::InnerProduct,
        DistanceMetric::Cosine,
        DistanceMetric::L1,
        DistanceMetric::Hamming,
        DistanceMetric::Jaccard,
    ];

    /// Distance between two equal-length vectors. Callers check lengths.
    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            DistanceMetric::Euclidean => euclidean(a, b),
            DistanceMetric::InnerProduct => -dot(a, b),
            DistanceMetric::Cosine => {
                let norms = norm(a) * norm(b);
                if norms == 0.0 {
                    1.0
                } else {
                    1.0 - dot(a, b) / norms
                }
            }
            DistanceMetric::L1 => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Hamming => a
                .iter()
                .zip(b)
                .filter(|&(x, y)| (*x != 0.0) != (*y != 0.0))
                .count() as f64,
            DistanceMetric::Jaccard => {
                let (mut inter, mut union) = (0usize, 0usize);
                for (x, y) in a.iter().zip(b) {
                    let (x, y) = (*x != 0.0, *y != 0.0);
                    inter += usize::from(x && y);
                    union += usize::from(x || y);
                }
                if union == 0 {
                    0.0
                } else {
                    1.0 - inter as f64 / union as f64
                }
            }
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::InnerProduct => "inner_product",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L1 => "l1",
            DistanceMetric::Hamming => "hamming",
            DistanceMetric::Jaccard => "jaccard",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "inner_product" | "ip" | "dot" => Ok(DistanceMetric::InnerProduct),
            "cosine" => Ok(DistanceMetric::Cosine),
            "l1" | "manhattan" => Ok(DistanceMetric::L1),
            "hamming" => Ok(DistanceMetric::Hamming),
            "jaccard" => Ok(DistanceMetric::Jaccard),
            _ => Err(UnknownMetric(s.to_string())),
        }
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Threshold filter: strictly closer than `max`, with `max == 0` meaning exact match.
pub fn within_threshold(distance: f64, max: Option<f64>) -> bool {
    match max {
        None => true,
        Some(t) => distance < t || (t == 0.0 && distance == 0.0),
    }
}
