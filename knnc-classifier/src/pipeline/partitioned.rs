//! Partitioned topology (static datasets)
//!
//! The input collections are laid end to end into one flattened index space.
//! Workers claim the next position with a single atomic increment and map it
//! back to (collection, document) with a binary search over the collection
//! start offsets, so claiming never takes a lock. Collections are drained in
//! input order, each fully before the next.

use super::{finish_run, ClassificationEngine, RunControl, WorkerPool};
use crate::classification::{ClassificationList, ClassificationRecord};
use crate::document::LabeledCollection;
use crate::error::{Result, RunResult};
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::types::Label;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Flattened, atomically claimed work index over the input collections
struct WorkIndex {
    inputs: Vec<LabeledCollection>,

    /// Flattened position of each collection's first document
    starts: Vec<usize>,

    total: usize,
    cursor: AtomicUsize,
}

impl WorkIndex {
    fn new(inputs: Vec<LabeledCollection>) -> Self {
        let mut starts = Vec::with_capacity(inputs.len());
        let mut total = 0;
        for input in &inputs {
            starts.push(total);
            total += input.collection.count();
        }
        Self {
            inputs,
            starts,
            total,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next unclaimed document
    fn claim(&self) -> Option<(&LabeledCollection, usize)> {
        let position = self.cursor.fetch_add(1, Ordering::Relaxed);
        if position >= self.total {
            return None;
        }
        // Last collection starting at or before `position`; empty ones are skipped
        let slot = self.starts.partition_point(|&start| start <= position) - 1;
        Some((&self.inputs[slot], position - self.starts[slot]))
    }
}

/// Classify every document of `inputs` on `engine.config().workers` threads
pub fn run(
    engine: Arc<ClassificationEngine>,
    inputs: Vec<LabeledCollection>,
    progress: Arc<dyn ProgressReporter>,
    control: RunControl,
) -> RunResult {
    let work = Arc::new(WorkIndex::new(inputs));
    info!(
        "Classifying {} documents from {} input collections",
        work.total,
        work.inputs.len()
    );

    let list = Arc::new(ClassificationList::new());
    let tracker = Arc::new(ProgressTracker::new(Some(work.total), progress));
    let mut pool = WorkerPool::new(control.clone());

    for worker_id in 0..engine.config().workers {
        let engine = Arc::clone(&engine);
        let work = Arc::clone(&work);
        let list = Arc::clone(&list);
        let tracker = Arc::clone(&tracker);
        let worker_control = control.clone();

        let spawned = pool.spawn("knnc-worker", worker_id, move || {
            worker_loop(worker_id, &engine, &work, &list, &tracker, &worker_control);
        });
        if let Err(e) = spawned {
            control.fail(e);
            break;
        }
    }

    let pool_result = pool.wait(engine.config());
    finish_run(list, &control, pool_result)
}

fn worker_loop(
    worker_id: usize,
    engine: &ClassificationEngine,
    work: &WorkIndex,
    list: &ClassificationList,
    tracker: &ProgressTracker,
    control: &RunControl,
) {
    debug!("Worker {} started", worker_id);
    let mut classified = 0usize;

    while !control.is_stopped() {
        let Some((input, index)) = work.claim() else {
            break;
        };
        match classify_document(engine, input, index) {
            Ok(record) => {
                list.insert(record);
                tracker.item_done();
                classified += 1;
            }
            Err(e) => {
                control.fail(e);
                break;
            }
        }
    }

    debug!("Worker {} exiting after {} documents", worker_id, classified);
}

fn classify_document(
    engine: &ClassificationEngine,
    input: &LabeledCollection,
    index: usize,
) -> Result<ClassificationRecord> {
    let document = input.collection.document_at(index)?;
    let ground_truth = Label::resolve(input.label, document.label, &document.identifier);
    engine.classify(&document, ground_truth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, MemoryCollection};
    use std::collections::HashSet;

    fn collection(prefix: &str, count: usize) -> LabeledCollection {
        let documents = (0..count)
            .map(|i| Document::new(format!("{}{}", prefix, i)))
            .collect();
        LabeledCollection::new(
            Arc::new(MemoryCollection::new(prefix, documents)),
            Label::Unknown,
        )
    }

    fn claimed_ids(work: &WorkIndex) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some((input, index)) = work.claim() {
            ids.push(input.collection.document_at(index).unwrap().identifier.clone());
        }
        ids
    }

    #[test]
    fn test_claims_drain_collections_in_order() {
        let work = WorkIndex::new(vec![
            collection("a", 2),
            collection("empty", 0),
            collection("b", 3),
        ]);
        assert_eq!(work.total, 5);
        assert_eq!(claimed_ids(&work), vec!["a0", "a1", "b0", "b1", "b2"]);
        assert!(work.claim().is_none());
    }

    #[test]
    fn test_no_inputs_claims_nothing() {
        let work = WorkIndex::new(Vec::new());
        assert!(work.claim().is_none());
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        let work = Arc::new(WorkIndex::new(vec![collection("a", 500), collection("b", 500)]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let work = Arc::clone(&work);
                std::thread::spawn(move || claimed_ids(&work))
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "document claimed twice");
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
