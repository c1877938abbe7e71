//! Store an artifact and start one remote analysis job for it.
//!
//! Each successful [`AnalysisJobSubmitter::submit`] starts exactly one remote
//! job. Submitting the same bytes again (matched by SHA-256 fingerprint)
//! returns the job that is already running instead of starting another.
//! Failures record nothing, so a failed submission can simply be retried.
//! Once a job has failed remotely, [`AnalysisJobSubmitter::forget`] releases
//! its artifact for a fresh submission.

use crate::backend::{SharedService, SharedStore};
use crate::config::AnalysisConfig;
use crate::error::SubmissionError;
use crate::model::{AnalysisJob, Artifact, JobStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Build the object key for an upload: `{prefix}{unix_millis}_{basename}`.
pub fn object_key(prefix: &str, file_name: &str, unix_millis: i64) -> String {
    format!("{prefix}{unix_millis}_{file_name}")
}

/// Set once the job for one fingerprint has started.
type JobSlot = Arc<OnceCell<AnalysisJob>>;

pub struct AnalysisJobSubmitter {
    store: SharedStore,
    service: SharedService,
    config: Arc<AnalysisConfig>,
    /// Jobs started so far, keyed by artifact fingerprint.
    submitted: Mutex<HashMap<String, JobSlot>>,
}

impl AnalysisJobSubmitter {
    pub fn new(store: SharedStore, service: SharedService, config: AnalysisConfig) -> Self {
        Self {
            store,
            service,
            config: Arc::new(config),
            submitted: Mutex::new(HashMap::new()),
        }
    }

    /// Upload `artifact` and start analysing it.
    ///
    /// The returned job is `IN_PROGRESS`; the remote service has accepted
    /// it but has not reported on it yet. Submissions of different artifacts
    /// run concurrently; a concurrent submission of the same artifact waits
    /// for the first one and shares its job.
    pub async fn submit(&self, artifact: &Artifact) -> Result<AnalysisJob, SubmissionError> {
        if artifact.bytes.is_empty() {
            return Err(SubmissionError::EmptyArtifact {
                name: artifact.name.clone(),
            });
        }

        let slot = self
            .lock()
            .entry(artifact.fingerprint())
            .or_default()
            .clone();

        let mut started = false;
        let job = slot
            .get_or_try_init(|| {
                started = true;
                self.start(artifact)
            })
            .await?;
        if !started {
            info!(
                "{} already submitted as job {}; not starting another",
                artifact.file_name(),
                job.job_id
            );
        }
        Ok(job.clone())
    }

    async fn start(&self, artifact: &Artifact) -> Result<AnalysisJob, SubmissionError> {
        let key = object_key(
            &self.config.key_prefix,
            artifact.file_name(),
            Utc::now().timestamp_millis(),
        );
        debug!(
            "Uploading {} ({} bytes, {}) as {}",
            artifact.file_name(),
            artifact.bytes.len(),
            artifact.content_type,
            key
        );
        let location = self
            .store
            .put(&key, artifact.bytes.clone(), &artifact.content_type)
            .await?;

        let job_id = self
            .service
            .start_analysis(&location, &self.config.feature_types)
            .await?;

        let job = AnalysisJob {
            job_id,
            status: JobStatus::InProgress,
            created_at: Utc::now(),
            location,
        };
        info!("Started job {} for {}", job.job_id, job.location);
        Ok(job)
    }

    /// Drop the record of `job_id` so its artifact starts a new job the
    /// next time it is submitted. Returns `false` if no such job is recorded.
    pub fn forget(&self, job_id: &str) -> bool {
        let mut submitted = self.lock();
        let before = submitted.len();
        submitted.retain(|_, slot| slot.get().is_none_or(|job| job.job_id != job_id));
        let forgotten = submitted.len() < before;
        if forgotten {
            debug!("Forgot job {}", job_id);
        }
        forgotten
    }

    /// Number of distinct artifacts submitted successfully.
    pub fn submitted_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JobSlot>> {
        self.submitted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
