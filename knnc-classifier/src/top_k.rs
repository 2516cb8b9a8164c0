//! Bounded best-match set
//!
//! Keeps the `capacity` lowest-distance matches seen so far. Backed by a
//! `BinaryHeap` ordered so that the worst kept match sits on top, which makes
//! both the eviction check and the eviction itself O(log K).
//!
//! Draining always yields the current worst remaining match, so a drain runs
//! worst → best. The voting engine derives its rank weights from that order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry ordered by (score, insertion sequence)
///
/// Higher score is worse. On equal scores the later insertion is worse, so
/// the first-seen match survives and is drained last.
#[derive(Debug)]
struct Ranked<T> {
    score: f64,
    seq: u64,
    item: T,
}

impl<T> Ord for Ranked<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl<T> PartialOrd for Ranked<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Ranked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Ranked<T> {}

/// Fixed-capacity collector of the K best (lowest-score) matches
#[derive(Debug)]
pub struct TopK<T> {
    capacity: usize,
    heap: BinaryHeap<Ranked<T>>,
    next_seq: u64,
}

impl<T> TopK<T> {
    /// Create an empty selector holding at most `capacity` matches
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity),
            next_seq: 0,
        }
    }

    /// Offer a match
    ///
    /// Below capacity the match is always kept. At capacity it replaces the
    /// current worst match only if its score is strictly lower; otherwise it
    /// is discarded. Returns whether the match was kept.
    pub fn insert(&mut self, score: f64, item: T) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.heap.len() < self.capacity {
            self.heap.push(Ranked { score, seq, item });
            return true;
        }

        match self.heap.peek() {
            Some(worst) if score < worst.score => {
                self.heap.pop();
                self.heap.push(Ranked { score, seq, item });
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Score of the worst kept match
    pub fn worst_score(&self) -> Option<f64> {
        self.heap.peek().map(|entry| entry.score)
    }

    /// Remove and return the worst kept match
    pub fn pop_worst(&mut self) -> Option<(f64, T)> {
        self.heap.pop().map(|entry| (entry.score, entry.item))
    }

    /// Drain all kept matches, worst first
    ///
    /// The iterator reports its exact remaining length after every step.
    pub fn drain_worst_to_best(&mut self) -> DrainWorstToBest<'_, T> {
        DrainWorstToBest { top_k: self }
    }

    /// Consume the selector into a vector ordered best first
    pub fn into_best_first(mut self) -> Vec<(f64, T)> {
        let mut out: Vec<(f64, T)> = self.drain_worst_to_best().collect();
        out.reverse();
        out
    }
}

/// Draining iterator returned by [`TopK::drain_worst_to_best`]
pub struct DrainWorstToBest<'a, T> {
    top_k: &'a mut TopK<T>,
}

impl<T> Iterator for DrainWorstToBest<'_, T> {
    type Item = (f64, T);

    fn next(&mut self) -> Option<Self::Item> {
        self.top_k.pop_worst()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.top_k.len();
        (len, Some(len))
    }
}

impl<T> ExactSizeIterator for DrainWorstToBest<'_, T> {}
