//! Data types shared by every pipeline stage.
//!
//! These mirror the response shape of the remote analysis service closely
//! enough that adapters can map into them field by field, while staying
//! independent of any particular SDK.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

// ── Jobs ─────────────────────────────────────────────────────────────────

/// Status of a remote analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    NotStarted,
    InProgress,
    Succeeded,
    /// The service finished but could not analyse every page.
    PartialSuccess,
    Failed,
}

impl JobStatus {
    /// `SUCCEEDED`, `PARTIAL_SUCCESS` and `FAILED` end the job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::PartialSuccess | JobStatus::Failed
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::PartialSuccess)
    }

    /// Wire name used by the remote service.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotStarted => "NOT_STARTED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::PartialSuccess => "PARTIAL_SUCCESS",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Parse a wire status. Unknown values yield `None` and must be treated
    /// as a malformed response, never as an implicit success.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOT_STARTED" => Some(JobStatus::NotStarted),
            "IN_PROGRESS" => Some(JobStatus::InProgress),
            "SUCCEEDED" => Some(JobStatus::Succeeded),
            "PARTIAL_SUCCESS" => Some(JobStatus::PartialSuccess),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A started remote analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    /// Opaque identifier issued by the remote service.
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Where the analysed artifact was stored.
    pub location: ArtifactLocation,
}

// ── Artifacts ────────────────────────────────────────────────────────────

/// A document to be analysed, held in memory.
#[derive(Clone)]
pub struct Artifact {
    /// Original file name; only the base name is used for object keys.
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Build an artifact, guessing the content type from the file extension.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        Self {
            name,
            content_type,
            bytes,
        }
    }

    /// Base name of the artifact, without any directory components.
    pub fn file_name(&self) -> &str {
        Path::new(&self.name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.name)
    }

    /// Hex-encoded SHA-256 of the content.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Location of a stored artifact in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
}

impl ArtifactLocation {
    /// Virtual-hosted style HTTPS URL of the object.
    pub fn public_url(&self, region: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, region, self.key
        )
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

// ── Results ──────────────────────────────────────────────────────────────

/// Kind of an extracted element.
///
/// Only `LINE` and `WORD` take part in page grouping; every other kind the
/// service emits is carried through untouched as [`ElementKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ElementKind {
    Line,
    Word,
    Other(String),
}

impl ElementKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "LINE" => ElementKind::Line,
            "WORD" => ElementKind::Word,
            other => ElementKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ElementKind::Line => "LINE",
            ElementKind::Word => "WORD",
            ElementKind::Other(s) => s,
        }
    }

    /// `true` for the kinds that are grouped by page.
    pub fn is_text(&self) -> bool {
        matches!(self, ElementKind::Line | ElementKind::Word)
    }
}

impl From<String> for ElementKind {
    fn from(s: String) -> Self {
        ElementKind::parse(&s)
    }
}

impl From<ElementKind> for String {
    fn from(kind: ElementKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounding box as fractions of the page width/height.
///
/// Values normally lie in `[0, 1]`, but nothing here clamps them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// One unit of analysis output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedElement {
    pub id: String,
    pub kind: ElementKind,
    /// 1-based page number as reported by the service. `None` when the
    /// service omitted it; the aggregator normalises that to page 1.
    pub page: Option<u32>,
    pub bounding_box: BoundingBox,
    /// Present for LINE and WORD elements.
    pub text: Option<String>,
    pub confidence: Option<f32>,
}

impl ExtractedElement {
    /// Convenience constructor for a text element.
    pub fn text(
        id: impl Into<String>,
        kind: ElementKind,
        page: Option<u32>,
        bounding_box: BoundingBox,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            page,
            bounding_box,
            text: Some(text.into()),
            confidence: None,
        }
    }
}

/// One page of results from a single fetch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFragment {
    /// Job status at the time of the fetch.
    pub status: JobStatus,
    pub elements: Vec<ExtractedElement>,
    /// Continuation token; `None` on the last page.
    pub next_token: Option<String>,
    /// Service-provided explanation, usually only set for `FAILED`.
    pub status_message: Option<String>,
}

impl ResultFragment {
    /// A fragment that only carries a status.
    pub fn status_only(status: JobStatus) -> Self {
        Self {
            status,
            elements: Vec::new(),
            next_token: None,
            status_message: None,
        }
    }
}
