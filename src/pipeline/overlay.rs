//! Overlays: extracted elements positioned over rendered pages.
//!
//! [`OverlayRenderer`] owns the three inputs an overlay depends on: the
//! current aggregate, the known page sizes and the selection. Overlays are
//! derived on demand from those inputs, so they always reflect the latest
//! state. Every change to an input bumps [`OverlayRenderer::revision`],
//! which a view can compare against the revision it last drew.

use crate::model::ElementKind;
use crate::pipeline::aggregate::{AggregateResult, DEFAULT_PAGE};
use crate::pipeline::geometry::{
    map_bounding_box, GeometryUnavailable, PageDimensions, PageRenderState, PixelRect,
};
use serde::Serialize;
use tracing::debug;

/// At most one selected element id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection(Option<String>);

impl Selection {
    /// Select `id`, replacing any previous selection. Returns `true` if the
    /// selection changed.
    pub fn select(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.0.as_deref() == Some(id.as_str()) {
            return false;
        }
        self.0 = Some(id);
        true
    }

    /// Returns `true` if something was selected.
    pub fn clear(&mut self) -> bool {
        self.0.take().is_some()
    }

    pub fn get(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.0.as_deref() == Some(id)
    }
}

/// Visual treatment of one overlay rectangle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayStyle {
    pub border_width_px: u32,
    pub border_color: &'static str,
    pub fill: &'static str,
}

impl OverlayStyle {
    pub fn emphasized() -> Self {
        Self {
            border_width_px: 2,
            border_color: "yellow",
            fill: "rgba(255, 235, 59, 0.4)",
        }
    }

    pub fn normal() -> Self {
        Self {
            border_width_px: 1,
            border_color: "red",
            fill: "transparent",
        }
    }

    pub fn for_emphasis(emphasized: bool) -> Self {
        if emphasized {
            Self::emphasized()
        } else {
            Self::normal()
        }
    }
}

/// One element's rectangle on a rendered page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub element_id: String,
    pub kind: ElementKind,
    pub page: u32,
    pub rect: PixelRect,
    pub emphasized: bool,
    pub style: OverlayStyle,
}

/// Overlays of one page, or the reason they cannot be computed yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "overlays", rename_all = "snake_case")]
pub enum PageOverlays {
    /// The page has not been rendered; nothing may be drawn yet.
    Pending(GeometryUnavailable),
    Ready(Vec<Overlay>),
}

impl PageOverlays {
    pub fn is_pending(&self) -> bool {
        matches!(self, PageOverlays::Pending(_))
    }

    /// The overlays, if the page is ready.
    pub fn ready(&self) -> Option<&[Overlay]> {
        match self {
            PageOverlays::Ready(v) => Some(v),
            PageOverlays::Pending(_) => None,
        }
    }
}

/// One row of the textual listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingEntry {
    pub element_id: String,
    pub page: u32,
    pub text: String,
    pub emphasized: bool,
}

/// Derives overlays and the listing from the aggregate, page sizes and
/// selection.
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    result: AggregateResult,
    pages: PageRenderState,
    selection: Selection,
    revision: u64,
}

impl OverlayRenderer {
    pub fn new(result: AggregateResult) -> Self {
        Self {
            result,
            ..Default::default()
        }
    }

    /// Replace the aggregate, e.g. after a poll update.
    pub fn set_result(&mut self, result: AggregateResult) {
        if result != self.result {
            self.result = result;
            self.revision += 1;
        }
    }

    pub fn result(&self) -> &AggregateResult {
        &self.result
    }

    /// Called by the page renderer once `page` has been drawn.
    pub fn on_page_rendered(&mut self, page: u32, dims: PageDimensions) {
        if self.pages.record(page, dims) {
            debug!("Page {} rendered at {}x{}", page, dims.width, dims.height);
            self.revision += 1;
        }
    }

    pub fn render_state(&self) -> &PageRenderState {
        &self.pages
    }

    /// The only mutator of the selection. Returns `true` if it changed.
    pub fn select(&mut self, id: impl Into<String>) -> bool {
        let changed = self.selection.select(id);
        if changed {
            self.revision += 1;
        }
        changed
    }

    pub fn clear_selection(&mut self) -> bool {
        let changed = self.selection.clear();
        if changed {
            self.revision += 1;
        }
        changed
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.get()
    }

    /// Incremented on every change to the aggregate, a page size or the
    /// selection.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn overlays_for_page(&self, page: u32) -> PageOverlays {
        let Some(dims) = self.pages.dimensions(page) else {
            return PageOverlays::Pending(GeometryUnavailable { page });
        };

        let overlays = self
            .result
            .page(page)
            .iter()
            .map(|element| {
                let emphasized = self.selection.is_selected(&element.id);
                Overlay {
                    element_id: element.id.clone(),
                    kind: element.kind.clone(),
                    page,
                    rect: map_bounding_box(&element.bounding_box, dims.width, dims.height),
                    emphasized,
                    style: OverlayStyle::for_emphasis(emphasized),
                }
            })
            .collect();
        PageOverlays::Ready(overlays)
    }

    /// LINE elements in arrival order, flagged by the same selection as the
    /// overlays.
    pub fn listing(&self) -> Vec<ListingEntry> {
        self.result
            .lines()
            .map(|e| ListingEntry {
                element_id: e.id.clone(),
                page: e.page.unwrap_or(DEFAULT_PAGE),
                text: e.text.clone().unwrap_or_default(),
                emphasized: self.selection.is_selected(&e.id),
            })
            .collect()
    }

    /// The smallest element on `page` whose rectangle contains the pixel
    /// point, if the page is rendered.
    pub fn element_at(&self, page: u32, x: f64, y: f64) -> Option<&str> {
        let dims = self.pages.dimensions(page)?;
        self.result
            .page(page)
            .iter()
            .map(|e| (e, map_bounding_box(&e.bounding_box, dims.width, dims.height)))
            .filter(|(_, rect)| rect.contains(x, y))
            .min_by(|(_, a), (_, b)| a.area().total_cmp(&b.area()))
            .map(|(e, _)| e.id.as_str())
    }

    /// Select the element under a pixel point. Returns the selected id.
    pub fn select_at(&mut self, page: u32, x: f64, y: f64) -> Option<String> {
        let id = self.element_at(page, x, y)?.to_string();
        self.select(id.clone());
        Some(id)
    }
}
