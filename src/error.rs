//! Error types for the docoverlay library.
//!
//! The taxonomy follows the lifecycle of an analysis job:
//!
//! * [`SubmissionError`] — the artifact could not be registered for analysis
//!   (unreadable input, object store write failed, remote service rejected
//!   the start request). Never retried automatically.
//!
//! * [`FetchError`] — **Non-fatal**: one status/result fetch failed during a
//!   poll tick. The poller retries on the next tick and only escalates after
//!   a bounded number of consecutive failures.
//!
//! * [`PollError`] — **Fatal** for the job: the remote service reported
//!   `FAILED`, polling ran past its ceiling, or fetch retries ran out.
//!
//! A page whose pixel size is not yet known is *not* an error; see
//! [`crate::pipeline::geometry::GeometryUnavailable`].

use std::path::PathBuf;
use thiserror::Error;

/// The object store could not accept a write.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Failed to store object '{key}': {reason}")]
    PutFailed { key: String, reason: String },
}

/// An artifact could not be submitted for analysis.
///
/// No job state exists when this is returned.
#[derive(Debug, Error)]
pub enum SubmissionError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Reading the file failed for another reason.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The artifact has no content.
    #[error("Artifact '{name}' is empty")]
    EmptyArtifact { name: String },

    // ── Remote errors ─────────────────────────────────────────────────────
    /// Upload to the object store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The analysis service refused to start a job (bad location, quota,
    /// unsupported format, …).
    #[error("Analysis service rejected '{location}': {reason}")]
    Rejected { location: String, reason: String },

    /// The service accepted the request but returned no job identifier.
    #[error("Analysis service returned no job id for '{location}'")]
    MissingJobId { location: String },
}

/// A single fetch within a poll tick failed.
///
/// Transient by assumption: the tick is abandoned and retried on the next
/// scheduled tick.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FetchError {
    /// Network or service error.
    #[error("Fetching job {job_id} failed: {reason}")]
    Service { job_id: String, reason: String },

    /// The fetch call did not complete within `fetch_timeout`.
    #[error("Fetching job {job_id} timed out after {secs}s")]
    Timeout { job_id: String, secs: u64 },

    /// The response could not be interpreted (unknown status, broken
    /// pagination, missing geometry on a text element).
    #[error("Malformed response for job {job_id}: {detail}")]
    MalformedResponse { job_id: String, detail: String },
}

/// Terminal polling failure.
#[derive(Debug, Clone, Error)]
pub enum PollError {
    /// The remote service reported `FAILED`.
    #[error("Analysis job {job_id} failed{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    AnalysisFailed {
        job_id: String,
        message: Option<String>,
    },

    /// The job stayed in progress past `max_poll_duration`.
    #[error("Analysis job {job_id} did not finish within {elapsed_secs}s")]
    Timeout { job_id: String, elapsed_secs: u64 },

    /// Too many consecutive ticks failed to fetch.
    #[error("Giving up on job {job_id} after {attempts} failed fetch attempts.\nLast error: {last_error}")]
    FetchRetriesExhausted {
        job_id: String,
        attempts: u32,
        last_error: FetchError,
    },

    /// The polling task panicked or was aborted.
    #[error("Polling task for job {job_id} ended abnormally: {reason}")]
    TaskAborted { job_id: String, reason: String },
}

/// Builder validation failed.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A poller is already running for this job id.
#[derive(Debug, Clone, Error)]
#[error("Job {job_id} is already being polled")]
pub struct AlreadyPolling {
    pub job_id: String,
}

/// Failure of the eager [`crate::analyze::analyze`] entry point.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Poll(#[from] PollError),

    /// Polling was cancelled before the job reached a terminal state.
    #[error("Polling of job {job_id} was cancelled")]
    Cancelled { job_id: String },
}
