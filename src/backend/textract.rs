//! Textract-backed [`AnalysisService`].
//!
//! Textract reports results as a flat list of `Block`s, paginated through
//! `NextToken`. Each block maps onto one [`ExtractedElement`]; the block's
//! `Page`, `Geometry.BoundingBox`, `BlockType` and `Text` carry over
//! unchanged. Statuses are matched on their wire names so that a value the
//! SDK does not know yet surfaces as a malformed response.

use super::AnalysisService;
use crate::config::FeatureType;
use crate::error::{FetchError, SubmissionError};
use crate::model::{
    ArtifactLocation, BoundingBox, ElementKind, ExtractedElement, JobStatus, ResultFragment,
};
use async_trait::async_trait;
use aws_sdk_textract::error::DisplayErrorContext;
use aws_sdk_textract::types::{self as tx, Block, DocumentLocation, S3Object};
use aws_sdk_textract::Client;
use tracing::{debug, info};

/// Document analysis through Amazon Textract's asynchronous API.
#[derive(Clone)]
pub struct TextractService {
    client: Client,
}

impl TextractService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

#[async_trait]
impl AnalysisService for TextractService {
    async fn start_analysis(
        &self,
        location: &ArtifactLocation,
        features: &[FeatureType],
    ) -> Result<String, SubmissionError> {
        let document = DocumentLocation::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&location.bucket)
                    .name(&location.key)
                    .build(),
            )
            .build();

        let mut request = self
            .client
            .start_document_analysis()
            .document_location(document);
        for feature in features {
            request = request.feature_types(tx::FeatureType::from(feature.as_str()));
        }

        let output = request
            .send()
            .await
            .map_err(|e| SubmissionError::Rejected {
                location: location.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        let job_id = output
            .job_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SubmissionError::MissingJobId {
                location: location.to_string(),
            })?;

        info!("Textract job {} started for {}", job_id, location);
        Ok(job_id.to_string())
    }

    async fn fetch_analysis(
        &self,
        job_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultFragment, FetchError> {
        let output = self
            .client
            .get_document_analysis()
            .job_id(job_id)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| FetchError::Service {
                job_id: job_id.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        let raw_status = output
            .job_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        let status = JobStatus::parse(&raw_status).ok_or_else(|| FetchError::MalformedResponse {
            job_id: job_id.to_string(),
            detail: format!("unrecognised job status {raw_status:?}"),
        })?;

        let elements = output
            .blocks()
            .iter()
            .map(|block| map_block(job_id, block))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Textract job {}: status {}, {} blocks, next token: {}",
            job_id,
            status,
            elements.len(),
            output.next_token().is_some()
        );

        Ok(ResultFragment {
            status,
            elements,
            next_token: output.next_token().map(str::to_string),
            status_message: output.status_message().map(str::to_string),
        })
    }
}

/// Convert one Textract block into an [`ExtractedElement`].
fn map_block(job_id: &str, block: &Block) -> Result<ExtractedElement, FetchError> {
    let malformed = |detail: String| FetchError::MalformedResponse {
        job_id: job_id.to_string(),
        detail,
    };

    let id = block
        .id()
        .ok_or_else(|| malformed("block without Id".into()))?
        .to_string();
    let kind = block
        .block_type()
        .map(|t| ElementKind::parse(t.as_str()))
        .ok_or_else(|| malformed(format!("block {id} without BlockType")))?;

    let bounding_box = match block.geometry().and_then(|g| g.bounding_box()) {
        Some(b) => BoundingBox::new(
            f64::from(b.left()),
            f64::from(b.top()),
            f64::from(b.width()),
            f64::from(b.height()),
        ),
        // Text elements must be placeable; other kinds are only passed through.
        None if kind.is_text() => {
            return Err(malformed(format!("{kind} block {id} without geometry")));
        }
        None => BoundingBox::default(),
    };

    Ok(ExtractedElement {
        id,
        kind,
        page: block.page().and_then(|p| u32::try_from(p).ok()),
        bounding_box,
        text: block.text().map(str::to_string),
        confidence: block.confidence(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_textract::types::{BlockType, Geometry};

    fn geometry(left: f32, top: f32, width: f32, height: f32) -> Geometry {
        Geometry::builder()
            .bounding_box(
                tx::BoundingBox::builder()
                    .left(left)
                    .top(top)
                    .width(width)
                    .height(height)
                    .build(),
            )
            .build()
    }

    #[test]
    fn line_block_carries_over() {
        let block = Block::builder()
            .id("line-1")
            .block_type(BlockType::Line)
            .page(2)
            .text("Total due")
            .confidence(99.5)
            .geometry(geometry(0.25, 0.5, 0.5, 0.125))
            .build();

        let element = map_block("job", &block).unwrap();

        assert_eq!(element.id, "line-1");
        assert_eq!(element.kind, ElementKind::Line);
        assert_eq!(element.page, Some(2));
        assert_eq!(element.text.as_deref(), Some("Total due"));
        assert_eq!(element.confidence, Some(99.5));
        assert_eq!(element.bounding_box, BoundingBox::new(0.25, 0.5, 0.5, 0.125));
    }

    #[test]
    fn text_block_without_geometry_is_malformed() {
        let block = Block::builder()
            .id("word-7")
            .block_type(BlockType::Word)
            .text("orphan")
            .build();

        match map_block("job-9", &block) {
            Err(FetchError::MalformedResponse { job_id, detail }) => {
                assert_eq!(job_id, "job-9");
                assert!(detail.contains("word-7"), "{detail}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn other_block_without_geometry_passes_through() {
        let block = Block::builder()
            .id("table-1")
            .block_type(BlockType::Table)
            .build();

        let element = map_block("job", &block).unwrap();

        assert_eq!(element.kind, ElementKind::Other("TABLE".into()));
        assert_eq!(element.bounding_box, BoundingBox::default());
        assert_eq!(element.page, None);
    }

    #[test]
    fn block_without_id_or_type_is_malformed() {
        let no_id = Block::builder().block_type(BlockType::Line).build();
        let no_type = Block::builder().id("x").build();

        assert!(matches!(
            map_block("job", &no_id),
            Err(FetchError::MalformedResponse { .. })
        ));
        assert!(matches!(
            map_block("job", &no_type),
            Err(FetchError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn negative_page_is_dropped() {
        let block = Block::builder()
            .id("line-2")
            .block_type(BlockType::Line)
            .page(-1)
            .geometry(geometry(0.0, 0.0, 1.0, 1.0))
            .build();

        assert_eq!(map_block("job", &block).unwrap().page, None);
    }
}
