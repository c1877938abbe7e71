//! Eager (submit-and-wait) analysis entry points.
//!
//! [`analyze`] stores the artifact, starts one remote job, polls it to a
//! terminal state and returns the final aggregate. Use
//! [`crate::pipeline::poll::JobPoller`] with a [`crate::tracker::JobTracker`]
//! or [`crate::stream::watch_job`] instead when the caller needs partial
//! results or cancellation.

use crate::backend::{SharedService, SharedStore};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::model::{AnalysisJob, Artifact, ElementKind};
use crate::pipeline::aggregate::AggregateResult;
use crate::pipeline::input;
use crate::pipeline::poll::{JobPoller, PollOutcome};
use crate::pipeline::submit::AnalysisJobSubmitter;
use crate::progress::{NoopObserver, SharedObserver};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Result of a completed analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    pub job: AnalysisJob,
    pub result: AggregateResult,
    pub stats: AnalysisStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisStats {
    pub ticks: u32,
    pub fetch_calls: u32,
    /// LINE and WORD elements.
    pub elements: usize,
    pub lines: usize,
    pub words: usize,
    /// Pages with at least one LINE/WORD element.
    pub pages: usize,
    pub submit_duration_ms: u64,
    pub poll_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Submit `artifact` and wait for its analysis.
///
/// # Arguments
/// * `store` — where the artifact is uploaded
/// * `service` — the remote analysis service
/// * `observer` — optional progress events; `None` means no events
///
/// # Errors
/// - [`AnalysisError::Submission`] if the upload or job start failed
/// - [`AnalysisError::Poll`] if the job failed, timed out or could not be
///   fetched
pub async fn analyze(
    artifact: &Artifact,
    store: SharedStore,
    service: SharedService,
    config: &AnalysisConfig,
    observer: Option<SharedObserver>,
) -> Result<AnalysisOutput, AnalysisError> {
    let total_start = Instant::now();
    info!("Starting analysis: {:?}", artifact);

    // ── Step 1: Store and start ──────────────────────────────────────────
    let submitter = AnalysisJobSubmitter::new(store, service.clone(), config.clone());
    let job = submitter.submit(artifact).await?;
    let submit_duration_ms = total_start.elapsed().as_millis() as u64;

    // ── Step 2: Poll to a terminal state ─────────────────────────────────
    let observer = observer.unwrap_or_else(|| Arc::new(NoopObserver));
    let handle = JobPoller::new(service, config.clone()).start(job.job_id.clone(), observer);
    let snapshots = handle.subscribe();

    let result = match handle.wait().await {
        PollOutcome::Succeeded(result) => result,
        PollOutcome::Failed(e) => return Err(e.into()),
        PollOutcome::Cancelled => {
            return Err(AnalysisError::Cancelled {
                job_id: job.job_id,
            })
        }
    };
    let poll = snapshots.borrow().stats;

    // ── Step 3: Stats ────────────────────────────────────────────────────
    let count = |kind: ElementKind| result.elements.iter().filter(|e| e.kind == kind).count();
    let stats = AnalysisStats {
        ticks: poll.ticks,
        fetch_calls: poll.fetch_calls,
        elements: result.element_count(),
        lines: count(ElementKind::Line),
        words: count(ElementKind::Word),
        pages: result.pages.len(),
        submit_duration_ms,
        poll_duration_ms: poll.elapsed_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Job {} complete: {} lines / {} words on {} pages in {}ms",
        job.job_id, stats.lines, stats.words, stats.pages, stats.total_duration_ms
    );

    Ok(AnalysisOutput { job, result, stats })
}

/// Load a local path or URL, then [`analyze`] it.
pub async fn analyze_input(
    input_str: impl AsRef<str>,
    store: SharedStore,
    service: SharedService,
    config: &AnalysisConfig,
    observer: Option<SharedObserver>,
) -> Result<AnalysisOutput, AnalysisError> {
    let artifact = input::load_artifact(input_str.as_ref(), config.download_timeout_secs).await?;
    analyze(&artifact, store, service, config, observer).await
}
