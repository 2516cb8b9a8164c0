//! Similarity search over descriptor collections
//!
//! A search provider answers "which documents of this collection are closest
//! to the query for my feature". Scores are distances: lower is closer.

use crate::document::{Collection, Document};
use crate::error::{Error, Result};
use crate::top_k::TopK;
use std::sync::Arc;
use tracing::trace;

/// One search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Distance to the query (lower is closer)
    pub score: f64,
    pub document: Arc<Document>,
}

/// Feature-specific similarity search
pub trait SearchProvider: Send + Sync {
    /// Feature name this provider searches on
    fn feature(&self) -> &str;

    /// Up to `max_hits` closest documents of `collection`, best first
    fn search(
        &self,
        query: &Document,
        collection: &dyn Collection,
        max_hits: usize,
    ) -> Result<Vec<SearchHit>>;
}

/// Distance function between two descriptor vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Sum of absolute differences (histogram descriptors)
    L1,
    /// Euclidean distance
    L2,
    /// `1 - tanimoto coefficient`, in [0, 1] for non-negative vectors
    Tanimoto,
}

impl DistanceMetric {
    /// Distance between `a` and `b`; `None` when the lengths differ
    pub fn distance(self, a: &[f32], b: &[f32]) -> Option<f64> {
        if a.len() != b.len() {
            return None;
        }
        let pairs = a.iter().zip(b).map(|(&x, &y)| (f64::from(x), f64::from(y)));

        let distance = match self {
            DistanceMetric::L1 => pairs.map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::L2 => pairs.map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt(),
            DistanceMetric::Tanimoto => {
                let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
                for (x, y) in pairs {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                let denominator = norm_a + norm_b - dot;
                if denominator == 0.0 {
                    // Both vectors are zero
                    0.0
                } else {
                    1.0 - dot / denominator
                }
            }
        };
        Some(distance)
    }
}

/// Exhaustive nearest-neighbour search over one descriptor
///
/// Documents lacking the descriptor, or carrying one of a different length,
/// are not candidates.
#[derive(Debug, Clone)]
pub struct DescriptorSearch {
    feature: String,
    metric: DistanceMetric,
}

impl DescriptorSearch {
    pub fn new(feature: impl Into<String>, metric: DistanceMetric) -> Self {
        Self {
            feature: feature.into(),
            metric,
        }
    }
}

impl SearchProvider for DescriptorSearch {
    fn feature(&self) -> &str {
        &self.feature
    }

    fn search(
        &self,
        query: &Document,
        collection: &dyn Collection,
        max_hits: usize,
    ) -> Result<Vec<SearchHit>> {
        let query_vector =
            query
                .descriptor(&self.feature)
                .ok_or_else(|| Error::MissingDescriptor {
                    identifier: query.identifier.clone(),
                    feature: self.feature.clone(),
                })?;

        let mut best = TopK::new(max_hits);
        for index in 0..collection.count() {
            let document = collection.document_at(index)?;
            let Some(distance) = document
                .descriptor(&self.feature)
                .and_then(|values| self.metric.distance(query_vector, values))
            else {
                continue;
            };
            best.insert(distance, document);
        }

        trace!(
            "{} search in {}: {} hits",
            self.feature,
            collection.name(),
            best.len()
        );

        Ok(best
            .into_best_first()
            .into_iter()
            .map(|(score, document)| SearchHit { score, document })
            .collect())
    }
}
