//! # docoverlay
//!
//! Submit documents to an asynchronous document-analysis service and place
//! the extracted text back over the rendered pages.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Input      read a local file or download from URL
//!  ├─ 2. Submit     upload to object storage, start one analysis job
//!  ├─ 3. Poll       tick until SUCCEEDED / FAILED, following pagination
//!  ├─ 4. Aggregate  group LINE / WORD elements by page, in arrival order
//!  ├─ 5. Geometry   normalised boxes → pixels once a page is rendered
//!  └─ 6. Overlay    per-page rectangles + listing sharing one selection
//! ```
//!
//! The object store and analysis service are traits
//! ([`ObjectStore`], [`AnalysisService`]); S3 and Textract adapters are
//! provided behind the `aws` feature.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docoverlay::{analyze_input, AnalysisConfig, S3Store, TextractService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
//!     let store = Arc::new(S3Store::from_sdk_config(&aws, "my-bucket"));
//!     let service = Arc::new(TextractService::from_sdk_config(&aws));
//!
//!     let config = AnalysisConfig::default();
//!     let output = analyze_input("invoice.pdf", store, service, &config, None).await?;
//!     for line in output.result.lines() {
//!         println!("p{} {}", line.page.unwrap_or(1), line.text.as_deref().unwrap_or(""));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `aws`   | on      | S3 and Textract adapters (aws-config + aws-sdk-*) |
//! | `cli`   | on      | Enables the `docoverlay` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable both when supplying your own backends:
//! ```toml
//! docoverlay = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod backend;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod tracker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze, analyze_input, AnalysisOutput, AnalysisStats};
pub use backend::{AnalysisService, ObjectStore, SharedService, SharedStore};
#[cfg(feature = "aws")]
pub use backend::{S3Store, TextractService};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, FeatureType};
pub use error::{
    AlreadyPolling, AnalysisError, ConfigError, FetchError, PollError, StoreError,
    SubmissionError,
};
pub use model::{
    AnalysisJob, Artifact, ArtifactLocation, BoundingBox, ElementKind, ExtractedElement,
    JobStatus, ResultFragment,
};
pub use pipeline::aggregate::{AggregateResult, ResultAggregator};
pub use pipeline::geometry::{
    map_bounding_box, GeometryUnavailable, PageDimensions, PageRenderState, PixelRect,
};
pub use pipeline::input::load_artifact;
pub use pipeline::overlay::{
    ListingEntry, Overlay, OverlayRenderer, OverlayStyle, PageOverlays, Selection,
};
pub use pipeline::poll::{JobPoller, PollHandle, PollOutcome, PollSnapshot, PollState, PollStats};
pub use pipeline::submit::AnalysisJobSubmitter;
pub use progress::{CallbackObserver, NoopObserver, PollObserver, SharedObserver};
pub use stream::{watch_job, SnapshotStream};
pub use tracker::JobTracker;
