//! Remote collaborators: object storage and the document-analysis service.
//!
//! The pipeline depends only on the two traits below. Concrete adapters for
//! S3 and Textract live behind the `aws` feature; tests and embedders can
//! supply their own implementations.

use crate::config::FeatureType;
use crate::error::{FetchError, StoreError, SubmissionError};
use crate::model::{ArtifactLocation, ResultFragment};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(feature = "aws")]
pub mod s3;
#[cfg(feature = "aws")]
pub mod textract;

#[cfg(feature = "aws")]
pub use s3::S3Store;
#[cfg(feature = "aws")]
pub use textract::TextractService;

/// Write-once object storage.
///
/// `put` is treated as atomic: either the object exists afterwards or an
/// error is returned.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ArtifactLocation, StoreError>;
}

/// Asynchronous, paginated document-analysis service.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Start analysing a stored artifact and return the service's job id.
    async fn start_analysis(
        &self,
        location: &ArtifactLocation,
        features: &[FeatureType],
    ) -> Result<String, SubmissionError>;

    /// Fetch one page of status + results. `next_token` is `None` for the
    /// first page.
    async fn fetch_analysis(
        &self,
        job_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultFragment, FetchError>;
}

/// Shared handle types stored by the pipeline stages.
pub type SharedStore = Arc<dyn ObjectStore>;
pub type SharedService = Arc<dyn AnalysisService>;
