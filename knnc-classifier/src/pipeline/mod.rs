//! Pipeline coordinator
//!
//! Drives a fixed pool of worker threads over one of two input topologies:
//! - [`partitioned`]: a finite dataset of random-access collections, claimed
//!   one document at a time through an atomic cursor
//! - [`streaming`]: a sequential frame source, decoded by a dedicated
//!   producer thread into a shared queue
//!
//! Both share the per-item work unit ([`ClassificationEngine::classify`]) and
//! the run lifecycle: workers signal completion over a channel, the first
//! error (or a cancel request) stops every thread, and whatever was committed
//! before the stop is returned with the error.

pub mod partitioned;
pub mod streaming;

use crate::classification::{ClassificationList, ClassificationRecord};
use crate::document::{Document, LabeledCollection};
use crate::error::{Error, Result, RunFailure, RunResult};
use crate::frames::FrameSource;
use crate::fusion::FusionTotals;
use crate::progress::ProgressReporter;
use crate::reference::ReferenceIndexSet;
use crate::search::SearchProvider;
use crate::types::{Label, MeasureType};
use crate::voting::vote_top_k;
use knnc_common::config::{
    DEFAULT_COMPLETION_TIMEOUT_SECS, DEFAULT_MAX_HITS, DEFAULT_SHUTDOWN_GRACE_SECS,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Worker count used when none is configured: half the available parallelism
pub fn default_worker_count() -> usize {
    let parallelism = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (parallelism / 2).max(1)
}

/// Fixed parameters of one engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub measure: MeasureType,

    /// Capacity of the per-feature best-match set
    pub max_hits: usize,

    pub workers: usize,

    /// Time allowed for a run before it is stopped
    pub completion_timeout: Duration,

    /// Time allowed after a stop before the pool is abandoned
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            measure: MeasureType::default(),
            max_hits: DEFAULT_MAX_HITS,
            workers: default_worker_count(),
            completion_timeout: Duration::from_secs(DEFAULT_COMPLETION_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_hits == 0 {
            return Err(Error::Config("max_hits must be at least 1".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Run control
// ============================================================================

#[derive(Default)]
struct ControlState {
    stop_flag: AtomicBool,
    cancelled: AtomicBool,
    first_error: Mutex<Option<Error>>,
}

/// Shared stop flag and first-error slot of one run
///
/// Cloning yields another handle to the same run.
#[derive(Clone, Default)]
pub struct RunControl {
    state: Arc<ControlState>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the run; it finishes with [`Error::Cancelled`] unless it already failed
    pub fn cancel(&self) {
        info!("Cancelling classification run");
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.request_stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stop_flag.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn request_stop(&self) {
        self.state.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Record a failure and stop the run; only the first error is kept
    pub(crate) fn fail(&self, error: Error) {
        {
            let mut slot = self
                .state
                .first_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                error!("Stopping classification run: {}", error);
                *slot = Some(error);
            } else {
                debug!("Further error after stop: {}", error);
            }
        }
        self.request_stop();
    }

    pub(crate) fn take_error(&self) -> Option<Error> {
        self.state
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Reference set, feature providers and parameters for classification runs
pub struct ClassificationEngine {
    references: ReferenceIndexSet,
    providers: Vec<Arc<dyn SearchProvider>>,
    config: EngineConfig,
}

impl ClassificationEngine {
    pub fn new(
        references: ReferenceIndexSet,
        providers: Vec<Arc<dyn SearchProvider>>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        if providers.is_empty() {
            return Err(Error::Config("no features selected".to_string()));
        }

        info!(
            "Using {} threads for classifying ({} features, measure {}, max hits {})",
            config.workers,
            providers.len(),
            config.measure,
            config.max_hits
        );

        Ok(Self {
            references,
            providers,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classify one item: vote per feature, then fuse
    pub fn classify(&self, item: &Document, ground_truth: Label) -> Result<ClassificationRecord> {
        let mut record = ClassificationRecord::new(item.identifier.clone(), ground_truth);
        let mut totals = FusionTotals::default();

        for provider in &self.providers {
            let mut best =
                self.references
                    .best_matches(provider.as_ref(), item, self.config.max_hits)?;
            let vote = vote_top_k(&mut best, self.config.measure);
            totals.add(&vote);
            record.insert(provider.feature(), vote.label);
        }

        record.set_composite(totals.composite());
        Ok(record)
    }

    /// Classify every document of the input collections
    pub fn classify_dataset(
        self: &Arc<Self>,
        inputs: Vec<LabeledCollection>,
        progress: Arc<dyn ProgressReporter>,
        control: &RunControl,
    ) -> RunResult {
        partitioned::run(Arc::clone(self), inputs, progress, control.clone())
    }

    /// Classify every frame of a stream; record identifiers are frame positions
    pub fn classify_stream(
        self: &Arc<Self>,
        source: Box<dyn FrameSource>,
        progress: Arc<dyn ProgressReporter>,
        control: &RunControl,
    ) -> RunResult {
        streaming::run(Arc::clone(self), source, progress, control.clone())
    }
}

// ============================================================================
// Worker pool
// ============================================================================

/// Signals completion when a pool thread ends, including by panic
struct CompletionGuard {
    id: usize,
    done: Sender<usize>,
    control: RunControl,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.control.request_stop();
        }
        let _ = self.done.send(self.id);
    }
}

/// Threads of one run and their completion channel
struct WorkerPool {
    handles: Vec<(usize, JoinHandle<()>)>,
    done_tx: Sender<usize>,
    done_rx: Receiver<usize>,
    control: RunControl,
}

impl WorkerPool {
    fn new(control: RunControl) -> Self {
        let (done_tx, done_rx) = mpsc::channel();
        Self {
            handles: Vec::new(),
            done_tx,
            done_rx,
            control,
        }
    }

    fn spawn<F>(&mut self, name: &str, id: usize, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = CompletionGuard {
            id,
            done: self.done_tx.clone(),
            control: self.control.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("{}-{}", name, id))
            .spawn(move || {
                let _guard = guard;
                work();
            })?;
        self.handles.push((id, handle));
        Ok(())
    }

    /// Wait for every thread, stopping the run if it overruns its timeout
    fn wait(self, config: &EngineConfig) -> Result<()> {
        let WorkerPool {
            handles,
            done_tx,
            done_rx,
            control,
        } = self;
        drop(done_tx);

        let expected = handles.len();
        let mut finished = 0;

        if !await_completions(&done_rx, &mut finished, expected, config.completion_timeout) {
            warn!(
                "{} of {} threads still running after {:?}; stopping run",
                expected - finished,
                expected,
                config.completion_timeout
            );
            control.request_stop();

            if !await_completions(&done_rx, &mut finished, expected, config.shutdown_grace) {
                return Err(Error::PoolTimeout(format!(
                    "{} of {} threads did not terminate within {:?} after stop",
                    expected - finished,
                    expected,
                    config.shutdown_grace
                )));
            }
            return Err(Error::PoolTimeout(format!(
                "run did not complete within {:?}",
                config.completion_timeout
            )));
        }

        let mut result = Ok(());
        for (id, handle) in handles {
            match handle.join() {
                Ok(()) => debug!("Thread {} joined", id),
                Err(_) => {
                    error!("Thread {} panicked", id);
                    if result.is_ok() {
                        result = Err(Error::WorkerPanicked(id));
                    }
                }
            }
        }
        result
    }
}

/// Count completions until all `expected` arrived; false on timeout
fn await_completions(
    done: &Receiver<usize>,
    finished: &mut usize,
    expected: usize,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now().checked_add(timeout);
    while *finished < expected {
        let remaining = deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::MAX);
        match done.recv_timeout(remaining) {
            Ok(id) => {
                *finished += 1;
                debug!("Thread {} finished ({}/{})", id, *finished, expected);
            }
            Err(RecvTimeoutError::Timeout) => return false,
            // Every guard has been dropped
            Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
    true
}

/// Turn the pool outcome into the run result, keeping committed records
fn finish_run(
    list: Arc<ClassificationList>,
    control: &RunControl,
    pool_result: Result<()>,
) -> RunResult {
    let partial = Arc::try_unwrap(list).unwrap_or_else(|shared| shared.snapshot().into());

    let error = control
        .take_error()
        .or_else(|| pool_result.err())
        .or_else(|| control.is_cancelled().then_some(Error::Cancelled));

    match error {
        Some(error) => {
            warn!(
                "Classification run stopped after {} records: {}",
                partial.len(),
                error
            );
            Err(RunFailure { error, partial })
        }
        None => {
            info!("Classification run finished: {} records", partial.len());
            Ok(partial)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryCollection;
    use crate::search::{DescriptorSearch, DistanceMetric};

    fn doc(id: &str, value: f32) -> Document {
        Document::new(id)
            .with_descriptor("CEDD", vec![value])
            .with_descriptor("JCD", vec![value])
    }

    fn engine(measure: MeasureType, max_hits: usize) -> ClassificationEngine {
        let positives = MemoryCollection::new("pos", vec![doc("p1", 1.0), doc("p2", 2.0)]);
        let negatives = MemoryCollection::new("neg", vec![doc("n1", 10.0), doc("n2", 11.0)]);
        let references = ReferenceIndexSet::new(vec![
            LabeledCollection::new(Arc::new(positives), Label::Positive),
            LabeledCollection::new(Arc::new(negatives), Label::Negative),
        ])
        .unwrap();
        let providers: Vec<Arc<dyn SearchProvider>> = vec![
            Arc::new(DescriptorSearch::new("CEDD", DistanceMetric::L1)),
            Arc::new(DescriptorSearch::new("JCD", DistanceMetric::L2)),
        ];
        let config = EngineConfig {
            measure,
            max_hits,
            workers: 1,
            ..EngineConfig::default()
        };
        ClassificationEngine::new(references, providers, config).unwrap()
    }

    #[test]
    fn test_default_worker_count_is_positive() {
        assert!(default_worker_count() >= 1);
    }

    #[test]
    fn test_config_validation() {
        let config = EngineConfig {
            max_hits: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = EngineConfig {
            workers: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_classify_votes_every_feature_then_fuses() {
        let engine = engine(MeasureType::Count, 3);
        let record = engine.classify(&doc("q", 1.5), Label::Positive).unwrap();

        // Closest three: p1, p2 and n1
        assert_eq!(record.feature_label("CEDD"), Some(Label::Positive));
        assert_eq!(record.feature_label("JCD"), Some(Label::Positive));
        assert_eq!(record.composite(), Label::Positive);
        assert_eq!(record.ground_truth(), Label::Positive);
    }

    #[test]
    fn test_classify_near_negatives() {
        let engine = engine(MeasureType::WeightedDistance, 2);
        let record = engine.classify(&doc("q", 10.5), Label::Unknown).unwrap();
        assert_eq!(record.composite(), Label::Negative);
    }

    #[test]
    fn test_classify_missing_descriptor_fails() {
        let engine = engine(MeasureType::Count, 3);
        let result = engine.classify(&Document::new("bare"), Label::Unknown);
        assert!(matches!(result, Err(Error::MissingDescriptor { .. })));
    }

    #[test]
    fn test_engine_requires_features() {
        let references = ReferenceIndexSet::new(vec![LabeledCollection::new(
            Arc::new(MemoryCollection::new("pos", vec![doc("p1", 1.0)])),
            Label::Positive,
        )])
        .unwrap();
        let result = ClassificationEngine::new(references, Vec::new(), EngineConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_run_control_keeps_first_error() {
        let control = RunControl::new();
        assert!(!control.is_stopped());

        control.fail(Error::Stream("first".to_string()));
        control.fail(Error::Stream("second".to_string()));
        assert!(control.is_stopped());
        assert!(!control.is_cancelled());

        match control.take_error() {
            Some(Error::Stream(message)) => assert_eq!(message, "first"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_pool_reports_panicked_worker() {
        let control = RunControl::new();
        let mut pool = WorkerPool::new(control.clone());
        pool.spawn("test", 0, || {}).unwrap();
        pool.spawn("test", 1, || panic!("boom")).unwrap();

        let result = pool.wait(&EngineConfig::default());
        assert!(matches!(result, Err(Error::WorkerPanicked(1))));
        assert!(control.is_stopped());
    }

    #[test]
    fn test_pool_times_out_stuck_worker() {
        let control = RunControl::new();
        let mut pool = WorkerPool::new(control.clone());
        let observed = control.clone();
        pool.spawn("test", 0, move || {
            while !observed.is_stopped() {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        let config = EngineConfig {
            completion_timeout: Duration::from_millis(20),
            shutdown_grace: Duration::from_secs(5),
            ..EngineConfig::default()
        };
        // The worker honours the stop within the grace period, but the run is still incomplete
        assert!(matches!(pool.wait(&config), Err(Error::PoolTimeout(_))));
        assert!(control.is_stopped());
    }
}
