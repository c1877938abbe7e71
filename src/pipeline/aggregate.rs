//! Accumulate paginated result fragments into one page-grouped result.
//!
//! ## Normalisation
//!
//! Every element is normalised before it is stored: an element without a
//! page number (or with the invalid page `0`) is assigned to page
//! [`DEFAULT_PAGE`]. Grouping then uses only that normalised page field.
//!
//! ## Idempotence
//!
//! Fragments can legitimately be seen more than once: a tick that stops at
//! `IN_PROGRESS` restarts pagination from the first page on the next tick.
//! The aggregator therefore de-duplicates on element id; an id that has
//! been merged once is ignored afterwards, so re-delivering a fragment
//! leaves the result unchanged.
//!
//! ## Empty pages
//!
//! A page with no LINE/WORD elements is absent from [`AggregateResult::pages`].

use crate::model::{ElementKind, ExtractedElement, JobStatus, ResultFragment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Page assigned to elements that do not report one.
pub const DEFAULT_PAGE: u32 = 1;

/// The accumulated, page-grouped result set of one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub job_id: String,
    /// `IN_PROGRESS` while polling; the terminal success status once final.
    pub status: JobStatus,
    /// LINE/WORD elements grouped by page, each group in arrival order.
    pub pages: BTreeMap<u32, Vec<ExtractedElement>>,
    /// All LINE/WORD elements in arrival order.
    pub elements: Vec<ExtractedElement>,
    /// Every other element kind, in arrival order, outside page grouping.
    pub other: Vec<ExtractedElement>,
}

impl AggregateResult {
    /// `true` only for a result delivered by a successfully finished job.
    pub fn is_final(&self) -> bool {
        self.status.is_success()
    }

    /// Elements of `page`, empty if the page has none.
    pub fn page(&self, page: u32) -> &[ExtractedElement] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn page_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    /// LINE elements in arrival order.
    pub fn lines(&self) -> impl Iterator<Item = &ExtractedElement> {
        self.elements
            .iter()
            .filter(|e| e.kind == ElementKind::Line)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn find(&self, id: &str) -> Option<&ExtractedElement> {
        self.elements.iter().find(|e| e.id == id)
    }
}

/// Builds an [`AggregateResult`] one fragment at a time.
///
/// Finishing consumes the aggregator, so a final result can never be
/// mutated again.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    result: AggregateResult,
    seen: HashSet<String>,
}

impl ResultAggregator {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            result: AggregateResult {
                job_id: job_id.into(),
                status: JobStatus::InProgress,
                ..Default::default()
            },
            seen: HashSet::new(),
        }
    }

    /// Merge one fragment. Returns the number of newly added elements
    /// (all kinds).
    pub fn merge(&mut self, fragment: &ResultFragment) -> usize {
        let mut added = 0;
        for element in &fragment.elements {
            if !self.seen.insert(element.id.clone()) {
                continue;
            }
            let element = normalize_page(element.clone());
            if element.kind.is_text() {
                let page = element.page.unwrap_or(DEFAULT_PAGE);
                self.result
                    .pages
                    .entry(page)
                    .or_default()
                    .push(element.clone());
                self.result.elements.push(element);
            } else {
                self.result.other.push(element);
            }
            added += 1;
        }
        debug!(
            "Job {}: merged {} new of {} elements ({} text elements total)",
            self.result.job_id,
            added,
            fragment.elements.len(),
            self.result.elements.len()
        );
        added
    }

    /// The current, non-final state.
    pub fn result(&self) -> &AggregateResult {
        &self.result
    }

    /// Seal the result with the job's terminal success status.
    pub fn finish(mut self, status: JobStatus) -> AggregateResult {
        self.result.status = status;
        self.result
    }
}

/// Assign [`DEFAULT_PAGE`] to elements without a valid page number.
pub fn normalize_page(mut element: ExtractedElement) -> ExtractedElement {
    match element.page {
        Some(p) if p >= 1 => {}
        _ => element.page = Some(DEFAULT_PAGE),
    }
    element
}
