//! Observer trait for job-polling events.
//!
//! Inject an [`Arc<dyn PollObserver>`] when starting a poller to receive
//! events as the job progresses: `on_update` after every completed
//! in-progress tick, `on_terminal` exactly once when the job reaches a
//! terminal state.
//!
//! # Example
//!
//! ```rust
//! use docoverlay::{AggregateResult, PollObserver, PollOutcome};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingObserver {
//!     updates: AtomicUsize,
//! }
//!
//! impl PollObserver for CountingObserver {
//!     fn on_update(&self, _job_id: &str, result: &AggregateResult) {
//!         self.updates.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} elements so far", result.element_count());
//!     }
//!
//!     fn on_terminal(&self, job_id: &str, outcome: &PollOutcome) {
//!         eprintln!("{job_id}: {:?}", outcome.state());
//!     }
//! }
//! ```

use crate::error::FetchError;
use crate::pipeline::aggregate::AggregateResult;
use crate::pipeline::poll::PollOutcome;
use std::sync::Arc;

/// Called by the poller as it drives a job to completion.
///
/// All methods have default no-op implementations. Events for one job are
/// delivered sequentially from that job's polling task; distinct jobs may
/// call the same observer concurrently.
pub trait PollObserver: Send + Sync {
    /// Called once when tracking of the job starts.
    fn on_poll_start(&self, job_id: &str) {
        let _ = job_id;
    }

    /// Called when a tick begins, before its first fetch.
    ///
    /// # Arguments
    /// * `tick` — 1-based tick counter
    fn on_tick(&self, job_id: &str, tick: u32) {
        let _ = (job_id, tick);
    }

    /// Called after a tick that ended with the job still in progress.
    /// `result` is never final.
    fn on_update(&self, job_id: &str, result: &AggregateResult) {
        let _ = (job_id, result);
    }

    /// Called when a tick failed to fetch and will be retried.
    ///
    /// # Arguments
    /// * `consecutive` — number of consecutive failed ticks so far
    fn on_fetch_error(&self, job_id: &str, consecutive: u32, error: &FetchError) {
        let _ = (job_id, consecutive, error);
    }

    /// Called exactly once when the job succeeded or failed. Not called
    /// when polling is cancelled by the caller.
    fn on_terminal(&self, job_id: &str, outcome: &PollOutcome) {
        let _ = (job_id, outcome);
    }
}

/// A no-op observer for callers that don't need events.
pub struct NoopObserver;

impl PollObserver for NoopObserver {}

/// Observer built from an update closure and a terminal closure.
///
/// ```rust
/// use docoverlay::{CallbackObserver, SharedObserver};
/// use std::sync::Arc;
///
/// let observer: SharedObserver = Arc::new(CallbackObserver::new(
///     |result| eprintln!("{} elements", result.element_count()),
///     |outcome| eprintln!("done: {:?}", outcome.state()),
/// ));
/// ```
pub struct CallbackObserver<U, T> {
    on_update: U,
    on_terminal: T,
}

impl<U, T> CallbackObserver<U, T>
where
    U: Fn(&AggregateResult) + Send + Sync,
    T: Fn(&PollOutcome) + Send + Sync,
{
    pub fn new(on_update: U, on_terminal: T) -> Self {
        Self {
            on_update,
            on_terminal,
        }
    }
}

impl<U, T> PollObserver for CallbackObserver<U, T>
where
    U: Fn(&AggregateResult) + Send + Sync,
    T: Fn(&PollOutcome) + Send + Sync,
{
    fn on_update(&self, _job_id: &str, result: &AggregateResult) {
        (self.on_update)(result);
    }

    fn on_terminal(&self, _job_id: &str, outcome: &PollOutcome) {
        (self.on_terminal)(outcome);
    }
}

/// Convenience alias for the observer type accepted by the poller.
pub type SharedObserver = Arc<dyn PollObserver>;
