//! Drive one analysis job to a terminal state.
//!
//! ## State machine
//!
//! ```text
//!            ┌── IN_PROGRESS ──┐
//!            ▼                 │
//! start ─▶ POLLING ─ tick ─────┤
//!            │                 ├── SUCCEEDED, last page ─▶ SUCCEEDED
//!            │                 ├── FAILED ───────────────▶ FAILED
//!            │                 └── fetch error (bounded) ─▶ FAILED
//!            ├── ceiling reached ─────────────────────────▶ FAILED (timeout)
//!            └── cancel ──────────────────────────────────▶ CANCELLED
//! ```
//!
//! Each tick runs a full pagination loop (`fetch_analysis` with the
//! previous continuation token until there is none). The next tick is only
//! scheduled once that loop has resolved, so there is never more than one
//! outstanding fetch sequence per job.
//!
//! Fragments fetched during a tick are merged into the aggregate only after
//! the tick resolves without failure. A `FAILED` status or a fetch error
//! mid-pagination therefore discards everything that tick fetched.
//!
//! ## Cancellation
//!
//! Cancellation is cooperative. The token is observed at the wait-for-tick
//! suspension point and while a tick is in flight; an in-flight tick is
//! dropped before its fragments are merged. [`PollHandle::cancel`] waits for
//! the task to end, so once it returns the job's aggregate is never touched
//! again.

use crate::backend::SharedService;
use crate::config::AnalysisConfig;
use crate::error::{FetchError, PollError};
use crate::model::{JobStatus, ResultFragment};
use crate::pipeline::aggregate::{AggregateResult, ResultAggregator};
use crate::progress::SharedObserver;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Lifecycle state of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollState {
    Polling,
    Succeeded,
    Failed,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

/// How polling of a job ended.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The only outcome that carries a final [`AggregateResult`].
    Succeeded(AggregateResult),
    Failed(PollError),
    Cancelled,
}

impl PollOutcome {
    pub fn state(&self) -> PollState {
        match self {
            PollOutcome::Succeeded(_) => PollState::Succeeded,
            PollOutcome::Failed(_) => PollState::Failed,
            PollOutcome::Cancelled => PollState::Cancelled,
        }
    }

    pub fn result(&self) -> Option<&AggregateResult> {
        match self {
            PollOutcome::Succeeded(r) => Some(r),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&PollError> {
        match self {
            PollOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Counters for one polling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    pub ticks: u32,
    pub fetch_calls: u32,
    pub elapsed_ms: u64,
}

/// Latest published state of a polling run.
///
/// `result` holds the partial aggregate while polling, the final aggregate
/// after success, and nothing after failure or cancellation.
#[derive(Debug, Clone, Serialize)]
pub struct PollSnapshot {
    pub job_id: String,
    pub state: PollState,
    pub stats: PollStats,
    pub result: Option<AggregateResult>,
}

/// Starts polling tasks for jobs of one analysis service.
#[derive(Clone)]
pub struct JobPoller {
    service: SharedService,
    config: Arc<AnalysisConfig>,
}

impl JobPoller {
    pub fn new(service: SharedService, config: AnalysisConfig) -> Self {
        Self {
            service,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Spawn a polling task for `job_id` on the current Tokio runtime.
    pub fn start(&self, job_id: impl Into<String>, observer: SharedObserver) -> PollHandle {
        let job_id = job_id.into();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(PollSnapshot {
            job_id: job_id.clone(),
            state: PollState::Polling,
            stats: PollStats::default(),
            result: None,
        });

        let task = PollTask {
            job_id: job_id.clone(),
            service: self.service.clone(),
            config: self.config.clone(),
            observer,
            snapshots: snapshot_tx,
            aggregator: ResultAggregator::new(job_id.clone()),
            ticks: 0,
            fetch_calls: 0,
            started: Instant::now(),
        };

        PollHandle {
            job_id,
            cancel: cancel_tx,
            snapshots: snapshot_rx,
            task: tokio::spawn(task.run(cancel_rx)),
        }
    }
}

/// Handle to a running polling task.
///
/// Dropping the handle detaches the task: it keeps polling to a terminal
/// state but can no longer be cancelled.
pub struct PollHandle {
    job_id: String,
    cancel: watch::Sender<bool>,
    snapshots: watch::Receiver<PollSnapshot>,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> PollSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that is notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(self) -> PollOutcome {
        join(self.job_id, self.task).await
    }

    /// Stop polling and wait for the task to wind down.
    ///
    /// Returns the terminal outcome instead if the job finished first.
    pub async fn cancel(self) -> PollOutcome {
        // Err only means the task already ended and dropped its receiver.
        let _ = self.cancel.send(true);
        join(self.job_id, self.task).await
    }
}

async fn join(job_id: String, task: JoinHandle<PollOutcome>) -> PollOutcome {
    match task.await {
        Ok(outcome) => outcome,
        Err(e) => PollOutcome::Failed(PollError::TaskAborted {
            job_id,
            reason: e.to_string(),
        }),
    }
}

/// Resolves once cancellation has been requested.
async fn cancellation(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // The handle was dropped; nobody can cancel any more.
            std::future::pending::<()>().await;
        }
    }
}

/// Result of one tick's pagination loop.
enum TickOutcome {
    InProgress(Vec<ResultFragment>),
    Complete {
        status: JobStatus,
        fragments: Vec<ResultFragment>,
    },
    Failed(Option<String>),
    FetchFailed(FetchError),
}

struct PollTask {
    job_id: String,
    service: SharedService,
    config: Arc<AnalysisConfig>,
    observer: SharedObserver,
    snapshots: watch::Sender<PollSnapshot>,
    aggregator: ResultAggregator,
    ticks: u32,
    fetch_calls: u32,
    started: Instant,
}

impl PollTask {
    async fn run(mut self, mut cancel: watch::Receiver<bool>) -> PollOutcome {
        let deadline = self.started + self.config.max_poll_duration;
        let mut consecutive_failures = 0u32;

        info!(
            "Polling job {} every {:?} (ceiling {:?})",
            self.job_id, self.config.poll_interval, self.config.max_poll_duration
        );
        self.observer.on_poll_start(&self.job_id);

        loop {
            let wake = (Instant::now() + self.config.poll_interval).min(deadline);
            let cancelled = tokio::select! {
                biased;
                _ = cancellation(&mut cancel) => true,
                _ = sleep_until(wake) => false,
            };
            if cancelled || *cancel.borrow() {
                return self.cancelled();
            }
            if Instant::now() >= deadline {
                return self.timed_out();
            }

            self.ticks += 1;
            debug!("Job {}: tick {}", self.job_id, self.ticks);
            self.observer.on_tick(&self.job_id, self.ticks);

            let tick = tokio::select! {
                biased;
                _ = cancellation(&mut cancel) => None,
                r = timeout_at(deadline, self.fetch_tick()) => Some(r),
            };
            let Some(tick) = tick else {
                return self.cancelled();
            };
            let Ok(tick) = tick else {
                return self.timed_out();
            };

            match tick {
                TickOutcome::InProgress(fragments) => {
                    consecutive_failures = 0;
                    for fragment in &fragments {
                        self.aggregator.merge(fragment);
                    }
                    self.observer.on_update(&self.job_id, self.aggregator.result());
                    self.publish(PollState::Polling, Some(self.aggregator.result().clone()));
                }
                TickOutcome::Complete { status, fragments } => {
                    for fragment in &fragments {
                        self.aggregator.merge(fragment);
                    }
                    return self.succeeded(status);
                }
                TickOutcome::Failed(message) => {
                    let error = PollError::AnalysisFailed {
                        job_id: self.job_id.clone(),
                        message,
                    };
                    return self.failed(error);
                }
                TickOutcome::FetchFailed(error) => {
                    consecutive_failures += 1;
                    warn!(
                        "Job {}: tick {} failed ({}/{} retries): {}",
                        self.job_id,
                        self.ticks,
                        consecutive_failures,
                        self.config.max_fetch_retries,
                        error
                    );
                    self.observer
                        .on_fetch_error(&self.job_id, consecutive_failures, &error);
                    if consecutive_failures > self.config.max_fetch_retries {
                        let error = PollError::FetchRetriesExhausted {
                            job_id: self.job_id.clone(),
                            attempts: consecutive_failures,
                            last_error: error,
                        };
                        return self.failed(error);
                    }
                    self.publish(PollState::Polling, Some(self.aggregator.result().clone()));
                }
            }
        }
    }

    /// One full pagination loop.
    async fn fetch_tick(&mut self) -> TickOutcome {
        let mut fragments: Vec<ResultFragment> = Vec::new();
        let mut token: Option<String> = None;
        let mut seen_tokens: HashSet<String> = HashSet::new();

        loop {
            if fragments.len() >= self.config.max_pages_per_tick {
                return TickOutcome::FetchFailed(FetchError::MalformedResponse {
                    job_id: self.job_id.clone(),
                    detail: format!(
                        "pagination did not end after {} pages",
                        self.config.max_pages_per_tick
                    ),
                });
            }

            self.fetch_calls += 1;
            let fetched = timeout(
                self.config.fetch_timeout,
                self.service.fetch_analysis(&self.job_id, token.as_deref()),
            )
            .await;
            let fragment = match fetched {
                Ok(Ok(fragment)) => fragment,
                Ok(Err(e)) => return TickOutcome::FetchFailed(e),
                Err(_) => {
                    return TickOutcome::FetchFailed(FetchError::Timeout {
                        job_id: self.job_id.clone(),
                        secs: self.config.fetch_timeout.as_secs(),
                    })
                }
            };

            debug!(
                "Job {}: page {} → {} ({} elements, more: {})",
                self.job_id,
                fragments.len() + 1,
                fragment.status,
                fragment.elements.len(),
                fragment.next_token.is_some()
            );

            match fragment.status {
                JobStatus::Failed => return TickOutcome::Failed(fragment.status_message),
                JobStatus::NotStarted | JobStatus::InProgress => {
                    fragments.push(fragment);
                    return TickOutcome::InProgress(fragments);
                }
                JobStatus::Succeeded | JobStatus::PartialSuccess => {
                    let status = fragment.status;
                    let next = fragment.next_token.clone();
                    fragments.push(fragment);
                    match next {
                        None => return TickOutcome::Complete { status, fragments },
                        Some(next) if !seen_tokens.insert(next.clone()) => {
                            return TickOutcome::FetchFailed(FetchError::MalformedResponse {
                                job_id: self.job_id.clone(),
                                detail: format!("continuation token {next:?} repeated"),
                            });
                        }
                        Some(next) => token = Some(next),
                    }
                }
            }
        }
    }

    fn stats(&self) -> PollStats {
        PollStats {
            ticks: self.ticks,
            fetch_calls: self.fetch_calls,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    fn publish(&self, state: PollState, result: Option<AggregateResult>) {
        self.snapshots.send_replace(PollSnapshot {
            job_id: self.job_id.clone(),
            state,
            stats: self.stats(),
            result,
        });
    }

    fn succeeded(self, status: JobStatus) -> PollOutcome {
        let stats = self.stats();
        let result = self.aggregator.finish(status);
        info!(
            "Job {} {}: {} elements on {} pages after {} ticks / {} fetches",
            self.job_id,
            status,
            result.element_count(),
            result.pages.len(),
            stats.ticks,
            stats.fetch_calls
        );

        let outcome = PollOutcome::Succeeded(result);
        self.snapshots.send_replace(PollSnapshot {
            job_id: self.job_id.clone(),
            state: PollState::Succeeded,
            stats,
            result: outcome.result().cloned(),
        });
        self.observer.on_terminal(&self.job_id, &outcome);
        outcome
    }

    fn failed(self, error: PollError) -> PollOutcome {
        warn!("Job {}: polling stopped: {}", self.job_id, error);
        self.publish(PollState::Failed, None);
        let outcome = PollOutcome::Failed(error);
        self.observer.on_terminal(&self.job_id, &outcome);
        outcome
    }

    fn timed_out(self) -> PollOutcome {
        let error = PollError::Timeout {
            job_id: self.job_id.clone(),
            elapsed_secs: self.started.elapsed().as_secs(),
        };
        self.failed(error)
    }

    fn cancelled(self) -> PollOutcome {
        info!("Job {}: polling cancelled after {} ticks", self.job_id, self.ticks);
        self.publish(PollState::Cancelled, None);
        PollOutcome::Cancelled
    }
}
