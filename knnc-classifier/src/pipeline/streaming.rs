//! Streaming topology (video frames)
//!
//! One producer thread pulls frames from the source, stamps each with its
//! 0-based stream position and pushes it onto an unbounded queue. Workers
//! block on the queue until a frame arrives or the producer has signalled
//! end of stream; they exit once the queue is empty and the stream has ended,
//! or as soon as the run is stopped.

use super::{finish_run, ClassificationEngine, RunControl, WorkerPool};
use crate::classification::ClassificationList;
use crate::document::Document;
use crate::error::RunResult;
use crate::frames::FrameSource;
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::types::Label;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// How often blocked workers re-check the stop flag
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct QueueState {
    frames: VecDeque<Document>,
    end_of_stream: bool,
}

/// Unbounded frame queue shared by the producer and the workers
#[derive(Default)]
struct FrameQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl FrameQueue {
    fn push(&self, frame: Document) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frames
            .push_back(frame);
        self.available.notify_one();
    }

    /// Mark end of stream and wake every waiting worker
    fn finish(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .end_of_stream = true;
        self.available.notify_all();
    }

    /// Next frame; `None` once the stream is drained or the run is stopped
    fn pop(&self, control: &RunControl) -> Option<Document> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if control.is_stopped() {
                return None;
            }
            if let Some(frame) = state.frames.pop_front() {
                return Some(frame);
            }
            if state.end_of_stream {
                return None;
            }
            state = self
                .available
                .wait_timeout(state, STOP_POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn wake_all(&self) {
        self.available.notify_all();
    }
}

/// Signals end of stream when the producer exits, including by panic
struct EndOfStream(Arc<FrameQueue>);

impl Drop for EndOfStream {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Classify every frame of `source` with one producer and `workers` consumers
pub fn run(
    engine: Arc<ClassificationEngine>,
    source: Box<dyn FrameSource>,
    progress: Arc<dyn ProgressReporter>,
    control: RunControl,
) -> RunResult {
    let frame_count = source.frame_count_hint();
    match frame_count {
        Some(count) => info!("Classifying stream of {} frames", count),
        None => info!("Classifying stream of unknown length"),
    }

    let queue = Arc::new(FrameQueue::default());
    let list = Arc::new(ClassificationList::new());
    let tracker = Arc::new(ProgressTracker::new(frame_count, progress));
    let mut pool = WorkerPool::new(control.clone());
    let workers = engine.config().workers;

    for worker_id in 0..workers {
        let engine = Arc::clone(&engine);
        let worker_queue = Arc::clone(&queue);
        let list = Arc::clone(&list);
        let tracker = Arc::clone(&tracker);
        let worker_control = control.clone();

        let spawned = pool.spawn("knnc-worker", worker_id, move || {
            worker_loop(worker_id, &engine, &worker_queue, &list, &tracker, &worker_control);
        });
        if let Err(e) = spawned {
            control.fail(e);
            queue.wake_all();
            break;
        }
    }

    let producer_queue = Arc::clone(&queue);
    let producer_control = control.clone();
    let spawned = pool.spawn("knnc-producer", workers, move || {
        produce(source, producer_queue, &producer_control);
    });
    if let Err(e) = spawned {
        control.fail(e);
        queue.finish();
    }

    let pool_result = pool.wait(engine.config());
    finish_run(list, &control, pool_result)
}

fn produce(mut source: Box<dyn FrameSource>, queue: Arc<FrameQueue>, control: &RunControl) {
    let _end = EndOfStream(Arc::clone(&queue));
    let mut position: u64 = 0;

    while !control.is_stopped() {
        match source.next_frame() {
            Ok(Some(mut frame)) => {
                frame.identifier = position.to_string();
                queue.push(frame);
                position += 1;
            }
            Ok(None) => break,
            Err(e) => {
                control.fail(e);
                queue.wake_all();
                break;
            }
        }
    }

    debug!("Producer finished after {} frames", position);
}

fn worker_loop(
    worker_id: usize,
    engine: &ClassificationEngine,
    queue: &FrameQueue,
    list: &ClassificationList,
    tracker: &ProgressTracker,
    control: &RunControl,
) {
    debug!("Worker {} started", worker_id);
    let mut classified = 0usize;

    while let Some(frame) = queue.pop(control) {
        let ground_truth = Label::resolve(Label::Unknown, frame.label, &frame.identifier);
        match engine.classify(&frame, ground_truth) {
            Ok(record) => {
                list.insert(record);
                tracker.item_done();
                classified += 1;
            }
            Err(e) => {
                control.fail(e);
                queue.wake_all();
                break;
            }
        }
    }

    debug!("Worker {} exiting after {} frames", worker_id, classified);
}
