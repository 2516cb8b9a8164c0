//! Late fusion of per-feature votes
//!
//! Sums vote confidence per label across all features of one item. The
//! composite label is `Positive` only when the positive sum is strictly
//! greater than the negative sum; everything else (ties, all-undecided
//! input, no input) resolves to `Negative`.

use crate::types::Label;
use crate::voting::Vote;

/// Feature name under which the composite label is recorded and evaluated
pub const LATE_FUSION: &str = "LateFusion";

/// Confidence sums per label
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FusionTotals {
    pub positive: f64,
    pub negative: f64,
}

impl FusionTotals {
    /// Accumulate one feature's vote; undecided votes contribute nothing
    pub fn add(&mut self, vote: &Vote) {
        match vote.label {
            Label::Positive => self.positive += vote.confidence,
            Label::Negative => self.negative += vote.confidence,
            Label::Unknown => {}
        }
    }

    /// Composite label under the strict-greater policy
    pub fn composite(&self) -> Label {
        if self.positive > self.negative {
            Label::Positive
        } else {
            Label::Negative
        }
    }
}

/// Fuse a set of per-feature votes into one composite label
pub fn fuse<'a, I>(votes: I) -> Label
where
    I: IntoIterator<Item = &'a Vote>,
{
    let mut totals = FusionTotals::default();
    for vote in votes {
        totals.add(vote);
    }
    totals.composite()
}
