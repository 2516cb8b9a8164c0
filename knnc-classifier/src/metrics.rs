//! Metrics engine
//!
//! Aggregates per-feature confusion counts from finished records and derives
//! the usual binary-classifier statistics. Zero denominators are not errors:
//! the affected statistics come out as NaN and are reported as such.

use crate::classification::ClassificationRecord;
use crate::types::Label;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Width of the feature-name column in the metrics table
const FEATURE_COLUMN_WIDTH: usize = 20;

/// Minimum width of a value column in the metrics table
const VALUE_COLUMN_WIDTH: usize = 10;

/// Confusion counts for one feature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounters {
    pub true_positives: u64,
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
}

impl ConfusionCounters {
    /// Count one prediction against its ground truth
    ///
    /// Returns false (and counts nothing) when either side is `Unknown`.
    pub fn record(&mut self, predicted: Label, truth: Label) -> bool {
        match (predicted, truth) {
            (Label::Positive, Label::Positive) => self.true_positives += 1,
            (Label::Positive, Label::Negative) => self.false_positives += 1,
            (Label::Negative, Label::Negative) => self.true_negatives += 1,
            (Label::Negative, Label::Positive) => self.false_negatives += 1,
            _ => return false,
        }
        true
    }

    pub fn total(&self) -> u64 {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    pub fn stats(&self) -> ClassificationStats {
        ClassificationStats::from_counts(
            self.true_positives as f64,
            self.true_negatives as f64,
            self.false_positives as f64,
            self.false_negatives as f64,
        )
    }
}

/// Statistics derived from one set of confusion counts
///
/// Any field may be NaN when its denominator is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationStats {
    pub precision: f64,
    pub recall: f64,
    pub true_negative_rate: f64,
    pub false_positive_rate: f64,
    pub accuracy: f64,
    pub f_measure: f64,
    pub negative_precision: f64,
    pub negative_recall: f64,
    pub negative_f_measure: f64,
    pub weighted_f_measure: f64,
    pub mcc: f64,
}

impl ClassificationStats {
    pub fn from_counts(tp: f64, tn: f64, fp: f64, fn_: f64) -> Self {
        let all = tp + tn + fp + fn_;

        let precision = tp / (tp + fp);
        let recall = tp / (tp + fn_);
        let true_negative_rate = tn / (tn + fp);
        let false_positive_rate = fp / (fp + tn);
        let accuracy = (tp + tn) / all;
        let f_measure = 2.0 * precision * recall / (precision + recall);

        let negative_precision = tn / (tn + fn_);
        let negative_recall = tn / (tn + fp);
        let negative_f_measure = 2.0 * negative_precision * negative_recall
            / (negative_precision + negative_recall);

        let weighted_f_measure = (f_measure * (tp + fn_) + negative_f_measure * (fp + tn)) / all;
        let mcc = (tp * tn - fp * fn_) / ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();

        Self {
            precision,
            recall,
            true_negative_rate,
            false_positive_rate,
            accuracy,
            f_measure,
            negative_precision,
            negative_recall,
            negative_f_measure,
            weighted_f_measure,
            mcc,
        }
    }
}

/// Confusion counters keyed by feature name
///
/// Counters are created lazily the first time a feature is referenced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationMetrics {
    counters: BTreeMap<String, ConfusionCounters>,
}

impl ClassificationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a finished set of records
    ///
    /// Pure aggregation: evaluating the same records twice yields equal metrics.
    pub fn evaluate<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ClassificationRecord>,
    {
        let mut metrics = Self::new();
        for record in records {
            metrics.add_record(record);
        }
        metrics
    }

    /// Count every prediction of one record; records without ground truth are skipped
    pub fn add_record(&mut self, record: &ClassificationRecord) {
        let truth = record.ground_truth();
        if !truth.is_known() {
            return;
        }
        for (feature, predicted) in record.predictions() {
            self.counters_mut(feature).record(predicted, truth);
        }
    }

    /// Counters for `feature`, created on first reference
    pub fn counters_mut(&mut self, feature: &str) -> &mut ConfusionCounters {
        self.counters.entry(feature.to_string()).or_default()
    }

    pub fn get(&self, feature: &str) -> Option<&ConfusionCounters> {
        self.counters.get(feature)
    }

    /// Features in name order with their counters
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfusionCounters)> {
        self.counters.iter().map(|(name, counters)| (name.as_str(), counters))
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Fixed-width table, one row per feature
    pub fn table(&self) -> MetricsTable<'_> {
        MetricsTable { metrics: self }
    }
}

/// Printable metrics table
pub struct MetricsTable<'a> {
    metrics: &'a ClassificationMetrics,
}

const HEADERS: [&str; 12] = [
    "TP",
    "TN",
    "FP",
    "FN",
    "Precision",
    "Recall",
    "TNRate",
    "FPRate",
    "Accuracy",
    "FMeasure",
    "WeightedFMeasure",
    "MccMeasure",
];

/// Value column width: wide enough for its header plus one space
fn column_width(header: &str) -> usize {
    VALUE_COLUMN_WIDTH.max(header.len() + 1)
}

impl fmt::Display for MetricsTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "- - - - - - - - - - - - - - - - - - - - - - - -")?;
        write!(f, "{:<width$}", "Feature", width = FEATURE_COLUMN_WIDTH)?;
        for header in HEADERS {
            write!(f, "{:<width$}", header, width = column_width(header))?;
        }
        writeln!(f)?;

        for (feature, counters) in self.metrics.iter() {
            let stats = counters.stats();
            let counts = [
                counters.true_positives,
                counters.true_negatives,
                counters.false_positives,
                counters.false_negatives,
            ]
            .map(|count| count.to_string());
            let ratios = [
                stats.precision,
                stats.recall,
                stats.true_negative_rate,
                stats.false_positive_rate,
                stats.accuracy,
                stats.f_measure,
                stats.weighted_f_measure,
                stats.mcc,
            ]
            .map(|value| format!("{:.6}", value));

            write!(f, "{:<width$}", feature, width = FEATURE_COLUMN_WIDTH)?;
            for (cell, header) in counts.iter().chain(ratios.iter()).zip(HEADERS) {
                write!(f, "{:<width$}", cell, width = column_width(header))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
