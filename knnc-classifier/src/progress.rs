//! Progress reporting
//!
//! Workers finish items in any order; the tracker turns completions into
//! integer percentages and delivers each new percentage exactly once, in
//! increasing order.

use std::sync::{Arc, Mutex, PoisonError};

/// Receives completion percentages (0-100)
pub trait ProgressReporter: Send + Sync {
    fn report(&self, percent: u32);
}

impl<F> ProgressReporter for F
where
    F: Fn(u32) + Send + Sync,
{
    fn report(&self, percent: u32) {
        self(percent)
    }
}

/// Reporter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn report(&self, _percent: u32) {}
}

#[derive(Debug, Default)]
struct TrackerState {
    completed: usize,
    /// Runs start at 0%, which is never reported
    last_reported: u32,
}

/// Monotonic progress over a known (or unknown) number of items
pub struct ProgressTracker {
    total: Option<usize>,
    state: Mutex<TrackerState>,
    reporter: Arc<dyn ProgressReporter>,
}

impl ProgressTracker {
    /// Without a total, completions are counted but nothing is reported
    pub fn new(total: Option<usize>, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            total,
            state: Mutex::new(TrackerState::default()),
            reporter,
        }
    }

    /// Count one finished item
    pub fn item_done(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.completed += 1;

        let Some(total) = self.total.filter(|&t| t > 0) else {
            return;
        };
        let percent = (state.completed.min(total) * 100 / total) as u32;
        if percent > state.last_reported {
            state.last_reported = percent;
            // Reported under the lock so deliveries cannot overtake each other
            self.reporter.report(percent);
        }
    }

    pub fn completed(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .completed
    }
}
