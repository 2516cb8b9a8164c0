//! Voting / scoring engine
//!
//! Turns the drained matches for one (item, feature) pair into a predicted
//! label and a confidence. Matches must arrive worst → best: the rank weight
//! of a match is `1 / (remaining + 1)`, where `remaining` counts the matches
//! still to come, so the worst match weighs `1/N` and the best weighs `1`.
//!
//! Count measures pick the label with the highest accumulated score; distance
//! measures pick the label with the lowest one. Only labels that received at
//! least one vote are eligible, and an exact tie resolves to `Negative`.

use crate::top_k::TopK;
use crate::types::{Label, MatchCandidate, MeasureType};
use tracing::trace;

/// Prediction for one feature of one item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vote {
    pub label: Label,

    /// Share of all counted matches that voted for `label` (0.0-1.0)
    pub confidence: f64,
}

impl Vote {
    /// Result when no reference match was available
    pub const UNDECIDED: Vote = Vote {
        label: Label::Unknown,
        confidence: 0.0,
    };
}

/// Per-label accumulator
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    sum: f64,
    count: usize,
}

impl Tally {
    fn add(&mut self, amount: f64) {
        self.sum += amount;
        self.count += 1;
    }

    /// Score compared during winner selection; `None` if the label got no votes
    fn score(&self, measure: MeasureType) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        match measure {
            MeasureType::WeightedAverageDistance => Some(self.sum / self.count as f64),
            _ => Some(self.sum),
        }
    }
}

/// Vote over matches given in worst → best order
pub fn vote<I>(candidates: I, measure: MeasureType) -> Vote
where
    I: IntoIterator<Item = MatchCandidate>,
    I::IntoIter: ExactSizeIterator,
{
    let mut iter = candidates.into_iter();
    let mut positive = Tally::default();
    let mut negative = Tally::default();
    let mut counted = 0usize;

    while let Some(candidate) = iter.next() {
        let remaining = iter.len();
        let weight = 1.0 / (remaining as f64 + 1.0);

        let tally = match candidate.label {
            Label::Positive => &mut positive,
            Label::Negative => &mut negative,
            Label::Unknown => continue,
        };

        let amount = match measure {
            MeasureType::Count => 1.0,
            MeasureType::WeightedCount => weight,
            MeasureType::WeightedDistance | MeasureType::WeightedAverageDistance => {
                candidate.score * weight
            }
        };
        tally.add(amount);
        counted += 1;
    }

    if counted == 0 {
        return Vote::UNDECIDED;
    }

    let winner = select_winner(
        positive.score(measure),
        negative.score(measure),
        measure.lowest_wins(),
    );
    let winner_count = match winner {
        Label::Positive => positive.count,
        Label::Negative => negative.count,
        Label::Unknown => 0,
    };

    trace!(
        "vote {}: positive={:?} negative={:?} -> {}",
        measure,
        positive,
        negative,
        winner
    );

    Vote {
        label: winner,
        confidence: winner_count as f64 / counted as f64,
    }
}

/// Drain a best-match set and vote over it
pub fn vote_top_k(top_k: &mut TopK<Label>, measure: MeasureType) -> Vote {
    vote(
        top_k
            .drain_worst_to_best()
            .map(|(score, label)| MatchCandidate::new(score, label)),
        measure,
    )
}

fn select_winner(positive: Option<f64>, negative: Option<f64>, lowest_wins: bool) -> Label {
    match (positive, negative) {
        (Some(p), Some(n)) => {
            let positive_better = if lowest_wins { p < n } else { p > n };
            if positive_better {
                Label::Positive
            } else {
                Label::Negative
            }
        }
        (Some(_), None) => Label::Positive,
        (None, Some(_)) => Label::Negative,
        (None, None) => Label::Unknown,
    }
}
