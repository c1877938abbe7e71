//! Track polling for many jobs by id.
//!
//! Distinct jobs poll independently and share nothing but the
//! [`JobPoller`]. At most one poller runs per job id; a finished poller is
//! kept until its outcome is collected or a new poller replaces it.

use crate::error::AlreadyPolling;
use crate::pipeline::poll::{JobPoller, PollHandle, PollOutcome, PollSnapshot};
use crate::progress::SharedObserver;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub struct JobTracker {
    poller: JobPoller,
    handles: Mutex<HashMap<String, PollHandle>>,
}

impl JobTracker {
    pub fn new(poller: JobPoller) -> Self {
        Self {
            poller,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, PollHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start polling `job_id`, reporting to `observer`.
    ///
    /// Fails if a poller for the same id is still running.
    pub fn start_polling(
        &self,
        job_id: impl Into<String>,
        observer: SharedObserver,
    ) -> Result<(), AlreadyPolling> {
        let job_id = job_id.into();
        let mut handles = self.handles();
        if handles.get(&job_id).is_some_and(|h| !h.is_finished()) {
            return Err(AlreadyPolling { job_id });
        }
        let handle = self.poller.start(job_id.clone(), observer);
        if handles.insert(job_id.clone(), handle).is_some() {
            debug!("Replaced finished poller for job {}", job_id);
        }
        Ok(())
    }

    /// Stop polling `job_id`. Once this returns, the job's aggregate is no
    /// longer mutated.
    ///
    /// Returns `None` if the job is not tracked. A job that had already
    /// finished returns its terminal outcome instead of `Cancelled`.
    pub async fn cancel_polling(&self, job_id: &str) -> Option<PollOutcome> {
        let handle = self.handles().remove(job_id)?;
        Some(handle.cancel().await)
    }

    /// Wait for `job_id` to reach a terminal state and stop tracking it.
    pub async fn wait(&self, job_id: &str) -> Option<PollOutcome> {
        let handle = self.handles().remove(job_id)?;
        Some(handle.wait().await)
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        self.handles().get(job_id).is_some_and(|h| !h.is_finished())
    }

    pub fn snapshot(&self, job_id: &str) -> Option<PollSnapshot> {
        self.handles().get(job_id).map(PollHandle::snapshot)
    }

    /// Ids of all tracked jobs, running or finished.
    pub fn tracked(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handles().keys().cloned().collect();
        ids.sort();
        ids
    }
}
