//! Core value types shared by the engine components

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification outcome
///
/// `Unknown` means "no ground truth / not yet resolved". It is never counted
/// as a vote and never counted as a ground-truth outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Positive,
    Negative,
    #[default]
    Unknown,
}

impl Label {
    /// True for `Positive` and `Negative`
    pub fn is_known(self) -> bool {
        self != Label::Unknown
    }

    /// Label from the file-name convention
    ///
    /// The character right after the last path separator decides:
    /// `p` is positive, `n` is negative, anything else is unknown.
    pub fn from_path(path: &str) -> Label {
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        match file_name.chars().next() {
            Some('p') => Label::Positive,
            Some('n') => Label::Negative,
            _ => Label::Unknown,
        }
    }

    /// First known label of `preferred`, `stored`, then the file-name convention
    pub fn resolve(preferred: Label, stored: Option<Label>, path: &str) -> Label {
        if preferred.is_known() {
            return preferred;
        }
        match stored {
            Some(label) if label.is_known() => label,
            _ => Label::from_path(path),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Label::Positive => "POSITIVE",
            Label::Negative => "NEGATIVE",
            Label::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Voting/confidence formula, fixed for an engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasureType {
    /// One vote per match
    #[default]
    Count,
    /// Rank-weighted votes (closer matches weigh more)
    WeightedCount,
    /// Rank-weighted distance sum, lowest wins
    WeightedDistance,
    /// Rank-weighted distance sum averaged per label, lowest wins
    WeightedAverageDistance,
}

impl MeasureType {
    /// Command-line / configuration name
    pub fn name(self) -> &'static str {
        match self {
            MeasureType::Count => "classCount",
            MeasureType::WeightedCount => "weightedByRank",
            MeasureType::WeightedDistance => "weightedByDistance",
            MeasureType::WeightedAverageDistance => "weightedByAverageDistance",
        }
    }

    /// Distance measures pick the label with the lowest accumulated score
    pub fn lowest_wins(self) -> bool {
        matches!(
            self,
            MeasureType::WeightedDistance | MeasureType::WeightedAverageDistance
        )
    }
}

impl FromStr for MeasureType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "classCount" => Ok(MeasureType::Count),
            "weightedByRank" => Ok(MeasureType::WeightedCount),
            "weightedByDistance" => Ok(MeasureType::WeightedDistance),
            "weightedByAverageDistance" => Ok(MeasureType::WeightedAverageDistance),
            other => Err(Error::UnknownMeasure(other.to_string())),
        }
    }
}

impl fmt::Display for MeasureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One reference match: distance to the query plus the matched document's label
///
/// Distance is a dissimilarity: 0 is identical, larger is less similar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCandidate {
    pub score: f64,
    pub label: Label,
}

impl MatchCandidate {
    pub fn new(score: f64, label: Label) -> Self {
        Self { score, label }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_path() {
        assert_eq!(Label::from_path("/data/set/p_0001.jpg"), Label::Positive);
        assert_eq!(Label::from_path("/data/set/n_0001.jpg"), Label::Negative);
        assert_eq!(Label::from_path("/data/pos/x_0001.jpg"), Label::Unknown);
        assert_eq!(Label::from_path("n.png"), Label::Negative);
        assert_eq!(Label::from_path("C:\\frames\\p12.png"), Label::Positive);
        assert_eq!(Label::from_path("/data/set/"), Label::Unknown);
        assert_eq!(Label::from_path(""), Label::Unknown);
    }

    #[test]
    fn test_label_resolution_order() {
        assert_eq!(
            Label::resolve(Label::Negative, Some(Label::Positive), "p1.jpg"),
            Label::Negative
        );
        assert_eq!(
            Label::resolve(Label::Unknown, Some(Label::Positive), "n1.jpg"),
            Label::Positive
        );
        assert_eq!(
            Label::resolve(Label::Unknown, Some(Label::Unknown), "n1.jpg"),
            Label::Negative
        );
        assert_eq!(Label::resolve(Label::Unknown, None, "x1.jpg"), Label::Unknown);
    }

    #[test]
    fn test_measure_names_round_trip() {
        for measure in [
            MeasureType::Count,
            MeasureType::WeightedCount,
            MeasureType::WeightedDistance,
            MeasureType::WeightedAverageDistance,
        ] {
            assert_eq!(measure.name().parse::<MeasureType>().unwrap(), measure);
        }
    }

    #[test]
    fn test_unknown_measure_is_config_error() {
        match "weightedByColour".parse::<MeasureType>() {
            Err(Error::UnknownMeasure(name)) => assert_eq!(name, "weightedByColour"),
            other => panic!("expected UnknownMeasure, got {:?}", other),
        }
    }

    #[test]
    fn test_lowest_wins_only_for_distance_measures() {
        assert!(!MeasureType::Count.lowest_wins());
        assert!(!MeasureType::WeightedCount.lowest_wins());
        assert!(MeasureType::WeightedDistance.lowest_wins());
        assert!(MeasureType::WeightedAverageDistance.lowest_wins());
    }
}
