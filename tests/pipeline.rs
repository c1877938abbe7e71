//! Integration tests for the submit → poll → aggregate → overlay pipeline.
//!
//! The remote collaborators are replaced by an in-memory object store and a
//! scripted analysis service, so these tests run offline and quickly.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use docoverlay::{
    analyze, analyze_input, watch_job, AnalysisConfig, AnalysisError, AnalysisJobSubmitter,
    AnalysisService, Artifact, ArtifactLocation, BoundingBox, CallbackObserver, ElementKind,
    ExtractedElement, FeatureType, FetchError, JobPoller, JobStatus, JobTracker, NoopObserver,
    ObjectStore, OverlayRenderer, PageDimensions, PageOverlays, PollError, PollObserver,
    PollOutcome, PollState, ResultFragment, SharedObserver, StoreError, SubmissionError,
};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test doubles ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ArtifactLocation, StoreError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(ArtifactLocation {
            bucket: "test-bucket".into(),
            key: key.into(),
            content_type: content_type.into(),
        })
    }
}

/// Hands out `job-1`, `job-2`, … and replays a per-job response script.
/// Once a script runs dry the job reports `IN_PROGRESS`.
#[derive(Default)]
struct ScriptedService {
    started: AtomicUsize,
    scripts: Mutex<HashMap<String, VecDeque<Result<ResultFragment, FetchError>>>>,
    fetches: Mutex<Vec<(String, Option<String>)>>,
    reject: bool,
}

impl ScriptedService {
    fn script(&self, job_id: &str, responses: Vec<Result<ResultFragment, FetchError>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(job_id.to_string(), responses.into());
    }

    fn fetch_count(&self, job_id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .count()
    }
}

#[async_trait]
impl AnalysisService for ScriptedService {
    async fn start_analysis(
        &self,
        location: &ArtifactLocation,
        _features: &[FeatureType],
    ) -> Result<String, SubmissionError> {
        if self.reject {
            return Err(SubmissionError::Rejected {
                location: location.to_string(),
                reason: "ProvisionedThroughputExceededException".into(),
            });
        }
        let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("job-{n}"))
    }

    async fn fetch_analysis(
        &self,
        job_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultFragment, FetchError> {
        self.fetches
            .lock()
            .unwrap()
            .push((job_id.to_string(), next_token.map(str::to_string)));
        self.scripts
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(ResultFragment::status_only(JobStatus::InProgress)))
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

fn fast_config() -> AnalysisConfig {
    AnalysisConfig::builder()
        .poll_interval(Duration::from_millis(10))
        .max_poll_duration(Duration::from_secs(5))
        .build()
        .expect("valid config")
}

fn element(id: &str, kind: ElementKind, page: Option<u32>, bbox: BoundingBox) -> ExtractedElement {
    ExtractedElement::text(id, kind, page, bbox, format!("text of {id}"))
}

fn fragment(
    status: JobStatus,
    elements: Vec<ExtractedElement>,
    next: Option<&str>,
) -> Result<ResultFragment, FetchError> {
    Ok(ResultFragment {
        status,
        elements,
        next_token: next.map(str::to_string),
        status_message: None,
    })
}

fn png(bytes: &[u8]) -> Artifact {
    Artifact::from_bytes("receipt.png", bytes.to_vec())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_ticks_to_success_groups_lines_on_page_one() {
    let service = Arc::new(ScriptedService::default());
    service.script(
        "job-1",
        vec![
            fragment(JobStatus::InProgress, Vec::new(), None),
            fragment(
                JobStatus::Succeeded,
                vec![
                    element("a", ElementKind::Line, Some(1), BoundingBox::new(0.1, 0.2, 0.3, 0.1)),
                    element("b", ElementKind::Line, Some(1), BoundingBox::new(0.1, 0.4, 0.3, 0.1)),
                ],
                None,
            ),
        ],
    );

    let updates = Arc::new(AtomicUsize::new(0));
    let terminals = Arc::new(AtomicUsize::new(0));
    let (u, t) = (updates.clone(), terminals.clone());
    let observer: SharedObserver = Arc::new(CallbackObserver::new(
        move |result| {
            assert!(!result.is_final());
            u.fetch_add(1, Ordering::SeqCst);
        },
        move |outcome| {
            assert_eq!(outcome.state(), PollState::Succeeded);
            t.fetch_add(1, Ordering::SeqCst);
        },
    ));

    let output = analyze(
        &png(b"scan"),
        Arc::new(MemoryStore::default()),
        service.clone(),
        &fast_config(),
        Some(observer),
    )
    .await
    .expect("analysis should succeed");

    assert_eq!(output.job.job_id, "job-1");
    assert_eq!(output.result.status, JobStatus::Succeeded);
    let page_one: Vec<&str> = output.result.page(1).iter().map(|e| e.id.as_str()).collect();
    assert_eq!(page_one, vec!["a", "b"]);
    assert_eq!(output.result.pages.len(), 1);

    assert_eq!(output.stats.ticks, 2);
    assert_eq!(output.stats.fetch_calls, 2);
    assert_eq!(output.stats.lines, 2);
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(terminals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn paginated_result_across_pages_keeps_arrival_order() {
    let service = Arc::new(ScriptedService::default());
    let bbox = BoundingBox::new(0.0, 0.0, 0.1, 0.1);
    service.script(
        "job-1",
        vec![
            fragment(
                JobStatus::Succeeded,
                vec![
                    element("l1", ElementKind::Line, Some(1), bbox),
                    element("w1", ElementKind::Word, Some(1), bbox),
                ],
                Some("page-2"),
            ),
            fragment(
                JobStatus::Succeeded,
                vec![
                    element("l2", ElementKind::Line, Some(2), bbox),
                    element("l3", ElementKind::Line, None, bbox),
                ],
                None,
            ),
        ],
    );

    let output = analyze(
        &png(b"two pages"),
        Arc::new(MemoryStore::default()),
        service.clone(),
        &fast_config(),
        None,
    )
    .await
    .unwrap();

    let ids = |page| -> Vec<String> {
        output.result.page(page).iter().map(|e| e.id.clone()).collect()
    };
    assert_eq!(ids(1), vec!["l1", "w1", "l3"]);
    assert_eq!(ids(2), vec!["l2"]);
    assert_eq!(output.stats.words, 1);
    assert_eq!(output.stats.pages, 2);

    let tokens: Vec<Option<String>> = service
        .fetches
        .lock()
        .unwrap()
        .iter()
        .map(|(_, t)| t.clone())
        .collect();
    assert_eq!(tokens, vec![None, Some("page-2".to_string())]);
}

#[tokio::test]
async fn failed_job_surfaces_message_and_no_result() {
    let service = Arc::new(ScriptedService::default());
    service.script(
        "job-1",
        vec![
            fragment(JobStatus::InProgress, Vec::new(), None),
            Ok(ResultFragment {
                status_message: Some("UNSUPPORTED_DOCUMENT".into()),
                ..ResultFragment::status_only(JobStatus::Failed)
            }),
        ],
    );

    let err = analyze(
        &png(b"bad"),
        Arc::new(MemoryStore::default()),
        service,
        &fast_config(),
        None,
    )
    .await
    .unwrap_err();

    match err {
        AnalysisError::Poll(PollError::AnalysisFailed { job_id, message }) => {
            assert_eq!(job_id, "job-1");
            assert_eq!(message.as_deref(), Some("UNSUPPORTED_DOCUMENT"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn rejected_submission_starts_no_polling() {
    let service = Arc::new(ScriptedService {
        reject: true,
        ..Default::default()
    });

    let err = analyze(
        &png(b"quota"),
        Arc::new(MemoryStore::default()),
        service.clone(),
        &fast_config(),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::Submission(SubmissionError::Rejected { .. })
    ));
    assert!(service.fetches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn resubmitting_the_same_artifact_starts_one_job() {
    let store = Arc::new(MemoryStore::default());
    let service = Arc::new(ScriptedService::default());
    let submitter = AnalysisJobSubmitter::new(store.clone(), service.clone(), fast_config());

    let first = submitter.submit(&png(b"identical")).await.unwrap();
    let again = submitter.submit(&png(b"identical")).await.unwrap();

    assert_eq!(first.job_id, again.job_id);
    assert_eq!(service.started.load(Ordering::SeqCst), 1);
    assert_eq!(store.objects.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_job_can_be_resubmitted_after_forget() {
    let service = Arc::new(ScriptedService::default());
    service.script("job-1", vec![fragment(JobStatus::Failed, vec![], None)]);
    let submitter =
        AnalysisJobSubmitter::new(Arc::new(MemoryStore::default()), service.clone(), fast_config());
    let poller = JobPoller::new(service.clone(), fast_config());

    let job = submitter.submit(&png(b"unlucky")).await.unwrap();
    let outcome = poller.start(job.job_id.clone(), Arc::new(NoopObserver)).wait().await;
    assert!(matches!(outcome, PollOutcome::Failed(PollError::AnalysisFailed { .. })));

    assert!(submitter.forget(&job.job_id));
    let retry = submitter.submit(&png(b"unlucky")).await.unwrap();

    assert_eq!(retry.job_id, "job-2");
    assert_eq!(service.started.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancelled_job_is_never_mutated_again() {
    let service = Arc::new(ScriptedService::default());
    let submitter =
        AnalysisJobSubmitter::new(Arc::new(MemoryStore::default()), service.clone(), fast_config());
    let job = submitter.submit(&png(b"slow")).await.unwrap();

    let updates = Arc::new(AtomicUsize::new(0));
    let terminals = Arc::new(AtomicUsize::new(0));
    let (u, t) = (updates.clone(), terminals.clone());
    let observer: SharedObserver = Arc::new(CallbackObserver::new(
        move |_| {
            u.fetch_add(1, Ordering::SeqCst);
        },
        move |_| {
            t.fetch_add(1, Ordering::SeqCst);
        },
    ));

    let tracker = JobTracker::new(JobPoller::new(service.clone(), fast_config()));
    tracker.start_polling(&job.job_id, observer).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = tracker.cancel_polling(&job.job_id).await.unwrap();
    assert!(matches!(outcome, PollOutcome::Cancelled));

    let updates_at_cancel = updates.load(Ordering::SeqCst);
    let fetches_at_cancel = service.fetch_count(&job.job_id);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(updates.load(Ordering::SeqCst), updates_at_cancel);
    assert_eq!(service.fetch_count(&job.job_id), fetches_at_cancel);
    assert_eq!(terminals.load(Ordering::SeqCst), 0);
    assert!(!tracker.is_polling(&job.job_id));
}

#[tokio::test]
async fn snapshot_stream_follows_job_to_success() {
    let service = Arc::new(ScriptedService::default());
    service.script(
        "job-7",
        vec![
            fragment(JobStatus::InProgress, Vec::new(), None),
            fragment(JobStatus::InProgress, Vec::new(), None),
            fragment(
                JobStatus::PartialSuccess,
                vec![element("x", ElementKind::Line, Some(3), BoundingBox::new(0.5, 0.5, 0.1, 0.1))],
                None,
            ),
        ],
    );

    let handle = JobPoller::new(service, fast_config()).start("job-7", Arc::new(NoopObserver));
    let states: Vec<PollState> = watch_job(&handle).map(|s| s.state).collect().await;

    assert_eq!(states.last(), Some(&PollState::Succeeded));
    let outcome = handle.wait().await;
    let result = outcome.result().unwrap();
    assert_eq!(result.status, JobStatus::PartialSuccess);
    assert!(result.is_final());
    assert_eq!(result.page(3).len(), 1);
}

#[tokio::test]
async fn overlays_follow_render_and_selection() {
    let service = Arc::new(ScriptedService::default());
    service.script(
        "job-1",
        vec![fragment(
            JobStatus::Succeeded,
            vec![
                element("a", ElementKind::Line, Some(1), BoundingBox::new(0.1, 0.2, 0.3, 0.1)),
                element("b", ElementKind::Word, Some(1), BoundingBox::new(0.5, 0.5, 0.1, 0.05)),
                element("c", ElementKind::Line, Some(2), BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
            ],
            None,
        )],
    );

    let output = analyze(
        &png(b"overlay"),
        Arc::new(MemoryStore::default()),
        service,
        &fast_config(),
        None,
    )
    .await
    .unwrap();

    let mut renderer = OverlayRenderer::new(output.result);
    assert!(matches!(renderer.overlays_for_page(1), PageOverlays::Pending(_)));

    renderer.on_page_rendered(1, PageDimensions::new(800.0, 1000.0));
    renderer.select("a");

    let overlays = renderer.overlays_for_page(1);
    let page_one = overlays.ready().unwrap();
    assert_eq!(page_one.len(), 2);
    let a = &page_one[0];
    assert_eq!(a.element_id, "a");
    assert!((a.rect.left - 80.0).abs() < 1e-9);
    assert!((a.rect.top - 200.0).abs() < 1e-9);
    assert!((a.rect.width - 240.0).abs() < 1e-9);
    assert!((a.rect.height - 100.0).abs() < 1e-9);
    assert!(a.emphasized);
    assert!(!page_one[1].emphasized);

    // Clicking the word selects it and moves the emphasis.
    assert_eq!(renderer.select_at(1, 420.0, 520.0).as_deref(), Some("b"));
    let listing = renderer.listing();
    assert!(listing.iter().all(|e| !e.emphasized));
    assert_eq!(listing.len(), 2);
    assert!(renderer.overlays_for_page(2).is_pending());
}

#[tokio::test]
async fn local_file_is_read_and_submitted() {
    let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    file.write_all(b"\x89PNG fake image").unwrap();

    let store = Arc::new(MemoryStore::default());
    let service = Arc::new(ScriptedService::default());
    service.script(
        "job-1",
        vec![fragment(JobStatus::Succeeded, Vec::new(), None)],
    );

    let output = analyze_input(
        file.path().to_str().unwrap(),
        store.clone(),
        service,
        &fast_config(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(output.job.location.content_type, "image/png");
    assert!(output.job.location.key.starts_with("uploads/"));
    assert!(output.result.pages.is_empty());
    let objects = store.objects.lock().unwrap();
    let (bytes, _) = objects.get(&output.job.location.key).unwrap();
    assert_eq!(bytes.as_slice(), b"\x89PNG fake image");
}

#[tokio::test]
async fn observer_sees_retried_fetch_errors() {
    struct Errors(AtomicUsize);
    impl PollObserver for Errors {
        fn on_fetch_error(&self, _job_id: &str, _consecutive: u32, _error: &FetchError) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let service = Arc::new(ScriptedService::default());
    let transient = || {
        Err(FetchError::Service {
            job_id: "job-1".into(),
            reason: "ThrottlingException".into(),
        })
    };
    service.script(
        "job-1",
        vec![
            transient(),
            transient(),
            fragment(JobStatus::Succeeded, Vec::new(), None),
        ],
    );

    let errors = Arc::new(Errors(AtomicUsize::new(0)));
    let output = analyze(
        &png(b"throttled"),
        Arc::new(MemoryStore::default()),
        service,
        &fast_config(),
        Some(errors.clone()),
    )
    .await
    .unwrap();

    assert_eq!(errors.0.load(Ordering::SeqCst), 2);
    assert_eq!(output.stats.ticks, 3);
}
