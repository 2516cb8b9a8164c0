//! Reference index set
//!
//! The labeled collections an item is compared against. For each feature the
//! matches of every reference collection compete in one best-match set, so
//! the vote always sees the overall closest `max_hits` labeled neighbours.

use crate::document::{Collection, CollectionStore, Document, LabeledCollection, LabeledSource};
use crate::error::{Error, Result};
use crate::search::SearchProvider;
use crate::top_k::TopK;
use crate::types::Label;
use tracing::{debug, info, trace};

/// Opened reference collections with their label tags
pub struct ReferenceIndexSet {
    collections: Vec<LabeledCollection>,
}

impl ReferenceIndexSet {
    pub fn new(collections: Vec<LabeledCollection>) -> Result<Self> {
        if collections.is_empty() {
            return Err(Error::Config(
                "at least one reference collection is required".to_string(),
            ));
        }
        Ok(Self { collections })
    }

    /// Open every reference source; any failure aborts before classification
    pub fn open(store: &dyn CollectionStore, sources: &[LabeledSource]) -> Result<Self> {
        let set = Self::new(LabeledCollection::open_all(store, sources)?)?;
        info!(
            "Opened {} reference collections ({} documents)",
            set.len(),
            set.document_count()
        );
        Ok(set)
    }

    fn len(&self) -> usize {
        self.collections.len()
    }

    fn document_count(&self) -> usize {
        self.collections.iter().map(|c| c.collection.count()).sum()
    }

    /// Closest labeled matches of `query` across all reference collections
    ///
    /// Matches whose label cannot be resolved are dropped before they reach
    /// the selector, so they never take a slot from a usable neighbour.
    pub fn best_matches(
        &self,
        provider: &dyn SearchProvider,
        query: &Document,
        max_hits: usize,
    ) -> Result<TopK<Label>> {
        let mut best = TopK::new(max_hits);
        for reference in &self.collections {
            let collection: &dyn Collection = reference.collection.as_ref();
            let hits = provider.search(query, collection, max_hits)?;
            for hit in hits.into_iter().take(max_hits) {
                let label = Label::resolve(
                    reference.label,
                    hit.document.label,
                    &hit.document.identifier,
                );
                if !label.is_known() {
                    trace!("Dropping unlabeled match {}", hit.document.identifier);
                    continue;
                }
                best.insert(hit.score, label);
            }
        }

        debug!(
            "{} {}: {} labeled matches",
            query.identifier,
            provider.feature(),
            best.len()
        );
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryCollection;
    use crate::search::{DescriptorSearch, DistanceMetric};
    use std::sync::Arc;

    fn doc(id: &str, value: f32) -> Document {
        Document::new(id).with_descriptor("CEDD", vec![value])
    }

    fn labeled(docs: Vec<Document>, label: Label) -> LabeledCollection {
        LabeledCollection::new(Arc::new(MemoryCollection::new("refs", docs)), label)
    }

    fn drained(mut best: TopK<Label>) -> Vec<(f64, Label)> {
        best.drain_worst_to_best().collect()
    }

    #[test]
    fn test_matches_compete_across_collections() {
        let set = ReferenceIndexSet::new(vec![
            labeled(vec![doc("a", 1.0), doc("b", 5.0)], Label::Positive),
            labeled(vec![doc("c", 2.0), doc("d", 9.0)], Label::Negative),
        ])
        .unwrap();
        let search = DescriptorSearch::new("CEDD", DistanceMetric::L1);

        let best = set.best_matches(&search, &doc("q", 0.0), 3).unwrap();
        assert_eq!(
            drained(best),
            vec![
                (5.0, Label::Positive),
                (2.0, Label::Negative),
                (1.0, Label::Positive)
            ]
        );
    }

    #[test]
    fn test_labels_resolve_from_document_then_file_name() {
        let set = ReferenceIndexSet::new(vec![labeled(
            vec![
                doc("/refs/x1.jpg", 1.0).with_label(Label::Negative),
                doc("/refs/p2.jpg", 2.0),
                doc("/refs/other.jpg", 0.5),
            ],
            Label::Unknown,
        )])
        .unwrap();
        let search = DescriptorSearch::new("CEDD", DistanceMetric::L1);

        // "other.jpg" is closest but unlabeled: it is dropped, not counted
        let best = set.best_matches(&search, &doc("q", 0.0), 5).unwrap();
        assert_eq!(
            drained(best),
            vec![(2.0, Label::Positive), (1.0, Label::Negative)]
        );
    }

    #[test]
    fn test_collection_tag_overrides_document_label() {
        let set = ReferenceIndexSet::new(vec![labeled(
            vec![doc("n1.jpg", 1.0).with_label(Label::Negative)],
            Label::Positive,
        )])
        .unwrap();
        let search = DescriptorSearch::new("CEDD", DistanceMetric::L1);

        let best = set.best_matches(&search, &doc("q", 0.0), 5).unwrap();
        assert_eq!(drained(best), vec![(1.0, Label::Positive)]);
    }

    #[test]
    fn test_empty_reference_set_is_rejected() {
        assert!(matches!(
            ReferenceIndexSet::new(Vec::new()),
            Err(Error::Config(_))
        ));
    }
}
