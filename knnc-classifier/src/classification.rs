//! Classification records and the shared result list
//!
//! A record is created and filled by the worker that classifies the item
//! (per-feature labels first, then the composite) and is read-only once it has
//! been appended to the list.

use crate::error::{Error, Result};
use crate::fusion::LATE_FUSION;
use crate::types::Label;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Outcome of classifying one item
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRecord {
    identifier: String,
    ground_truth: Label,
    per_feature: BTreeMap<String, Label>,
    composite: Label,
}

impl ClassificationRecord {
    /// Start a record; the composite label stays `Unknown` until fused
    pub fn new(identifier: impl Into<String>, ground_truth: Label) -> Self {
        Self {
            identifier: identifier.into(),
            ground_truth,
            per_feature: BTreeMap::new(),
            composite: Label::Unknown,
        }
    }

    /// Store the predicted label for one feature
    pub fn insert(&mut self, feature: impl Into<String>, label: Label) {
        self.per_feature.insert(feature.into(), label);
    }

    /// Store the late-fusion label
    pub fn set_composite(&mut self, label: Label) {
        self.composite = label;
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn ground_truth(&self) -> Label {
        self.ground_truth
    }

    pub fn composite(&self) -> Label {
        self.composite
    }

    pub fn feature_label(&self, feature: &str) -> Option<Label> {
        self.per_feature.get(feature).copied()
    }

    /// Per-feature predictions in feature-name order
    pub fn features(&self) -> impl Iterator<Item = (&str, Label)> {
        self.per_feature.iter().map(|(name, label)| (name.as_str(), *label))
    }

    /// Every prediction subject to evaluation: each feature, then the composite
    pub fn predictions(&self) -> impl Iterator<Item = (&str, Label)> {
        self.features()
            .chain(std::iter::once((LATE_FUSION, self.composite)))
    }

    /// Identifier text after the last path separator
    pub fn file_name(&self) -> &str {
        self.identifier
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.identifier)
    }

    /// Identifier as a frame position, for video results
    pub fn frame_index(&self) -> Option<u64> {
        self.identifier.parse().ok()
    }
}

impl fmt::Display for ClassificationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ->", self.file_name())?;
        for (feature, label) in self.predictions() {
            write!(f, " {}:{}", feature, label)?;
        }
        Ok(())
    }
}

/// Append-only, thread-safe collection of records
///
/// Insertion order reflects worker scheduling and carries no meaning; callers
/// that need an order sort at export time.
#[derive(Debug, Default)]
pub struct ClassificationList {
    records: Mutex<Vec<ClassificationRecord>>,
}

impl ClassificationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished record
    pub fn insert(&self, record: ClassificationRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current records
    pub fn snapshot(&self) -> Vec<ClassificationRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take ownership of the records
    pub fn into_records(self) -> Vec<ClassificationRecord> {
        self.records
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records ordered by numeric identifier (video frame position)
    pub fn sorted_by_frame(&self) -> Result<Vec<ClassificationRecord>> {
        let mut keyed = Vec::with_capacity(self.len());
        for record in self.snapshot() {
            let frame = record.frame_index().ok_or_else(|| {
                Error::Export(format!(
                    "identifier {:?} is not a frame number",
                    record.identifier()
                ))
            })?;
            keyed.push((frame, record));
        }
        keyed.sort_by_key(|(frame, _)| *frame);
        Ok(keyed.into_iter().map(|(_, record)| record).collect())
    }
}

impl From<Vec<ClassificationRecord>> for ClassificationList {
    fn from(records: Vec<ClassificationRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl FromIterator<ClassificationRecord> for ClassificationList {
    fn from_iter<I: IntoIterator<Item = ClassificationRecord>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn record(identifier: &str, composite: Label) -> ClassificationRecord {
        let mut record = ClassificationRecord::new(identifier, Label::Unknown);
        record.insert("CEDD", composite);
        record.set_composite(composite);
        record
    }

    #[test]
    fn test_record_display_lists_features_then_composite() {
        let mut record = ClassificationRecord::new("/data/input/p_0042.jpg", Label::Positive);
        record.insert("JCD", Label::Negative);
        record.insert("CEDD", Label::Positive);
        record.set_composite(Label::Positive);

        assert_eq!(
            record.to_string(),
            "p_0042.jpg -> CEDD:POSITIVE JCD:NEGATIVE LateFusion:POSITIVE"
        );
    }

    #[test]
    fn test_predictions_include_late_fusion() {
        let record = record("3", Label::Negative);
        let predictions: Vec<(&str, Label)> = record.predictions().collect();
        assert_eq!(
            predictions,
            vec![("CEDD", Label::Negative), (LATE_FUSION, Label::Negative)]
        );
    }

    #[test]
    fn test_concurrent_inserts_are_all_kept() {
        let list = Arc::new(ClassificationList::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    for i in 0..100 {
                        list.insert(record(&format!("{}", t * 100 + i), Label::Positive));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(list.len(), 800);
    }

    #[test]
    fn test_sorted_by_frame_orders_numerically() {
        let list: ClassificationList = ["10", "2", "0", "1"]
            .into_iter()
            .map(|id| record(id, Label::Negative))
            .collect();

        let ids: Vec<String> = list
            .sorted_by_frame()
            .unwrap()
            .iter()
            .map(|r| r.identifier().to_string())
            .collect();
        assert_eq!(ids, vec!["0", "1", "2", "10"]);
    }

    #[test]
    fn test_sorted_by_frame_rejects_paths() {
        let list: ClassificationList = vec![record("/img/p1.jpg", Label::Positive)].into();
        assert!(matches!(list.sorted_by_frame(), Err(Error::Export(_))));
    }
}
