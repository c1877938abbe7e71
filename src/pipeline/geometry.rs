//! Normalised page geometry → pixel rectangles.
//!
//! The analysis service reports every box as fractions of the page size.
//! The rendering surface decides the pixel size of each page, and reports it
//! only once the page has actually been drawn; until then there is nothing
//! to map onto and callers get [`GeometryUnavailable`] instead of a guess.

use crate::model::BoundingBox;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Pixel size of a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageDimensions {
    pub width: f64,
    pub height: f64,
}

impl PageDimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Absolute rectangle in page pixels, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    /// `true` if the point lies inside the rectangle (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Page dimensions are not known yet; rendering of overlays for this page
/// has to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryUnavailable {
    pub page: u32,
}

impl fmt::Display for GeometryUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} has not been rendered yet", self.page)
    }
}

/// Scale a normalised box to pixels.
///
/// No clamping: out-of-range input produces out-of-range output.
pub fn map_bounding_box(bbox: &BoundingBox, page_width_px: f64, page_height_px: f64) -> PixelRect {
    PixelRect {
        left: bbox.left * page_width_px,
        top: bbox.top * page_height_px,
        width: bbox.width * page_width_px,
        height: bbox.height * page_height_px,
    }
}

/// Pixel sizes of the pages rendered so far.
///
/// Entries are only ever added or refreshed (a page re-rendered at another
/// size replaces its entry); they are never removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRenderState {
    pages: BTreeMap<u32, PageDimensions>,
}

impl PageRenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the size of a page that finished rendering. Returns `true` if
    /// this changed the known state.
    pub fn record(&mut self, page: u32, dims: PageDimensions) -> bool {
        self.pages.insert(page, dims) != Some(dims)
    }

    pub fn dimensions(&self, page: u32) -> Option<PageDimensions> {
        self.pages.get(&page).copied()
    }

    pub fn is_rendered(&self, page: u32) -> bool {
        self.pages.contains_key(&page)
    }

    /// Pages with known dimensions, ascending.
    pub fn rendered_pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    /// Map a box on `page`, or report that the page size is not known yet.
    pub fn map(&self, page: u32, bbox: &BoundingBox) -> Result<PixelRect, GeometryUnavailable> {
        self.dimensions(page)
            .map(|d| map_bounding_box(bbox, d.width, d.height))
            .ok_or(GeometryUnavailable { page })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn maps_reference_box() {
        let bbox = BoundingBox::new(0.1, 0.2, 0.3, 0.1);
        let r = map_bounding_box(&bbox, 800.0, 1000.0);
        assert!(close(r.left, 80.0));
        assert!(close(r.top, 200.0));
        assert!(close(r.width, 240.0));
        assert!(close(r.height, 100.0));
    }

    #[test]
    fn scales_linearly_in_each_axis() {
        let boxes = [
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            BoundingBox::new(0.25, 0.5, 0.125, 0.0625),
            BoundingBox::new(0.9, 0.05, 0.3, 0.7),
            BoundingBox::new(-0.1, 1.2, 0.5, 0.2),
        ];
        let sizes = [(1.0, 1.0), (600.0, 776.0), (612.0, 792.0), (1654.0, 2339.0)];

        for bbox in &boxes {
            for &(w, h) in &sizes {
                let base = map_bounding_box(bbox, w, h);
                let wide = map_bounding_box(bbox, w * 2.0, h);
                let tall = map_bounding_box(bbox, w, h * 2.0);

                assert!(close(wide.left, base.left * 2.0));
                assert!(close(wide.width, base.width * 2.0));
                assert!(close(wide.top, base.top));
                assert!(close(wide.height, base.height));

                assert!(close(tall.top, base.top * 2.0));
                assert!(close(tall.height, base.height * 2.0));
                assert!(close(tall.left, base.left));
                assert!(close(tall.width, base.width));
            }
        }
    }

    #[test]
    fn out_of_range_values_are_not_clamped() {
        let bbox = BoundingBox::new(-0.5, 1.5, 2.0, 0.1);
        let r = map_bounding_box(&bbox, 100.0, 100.0);
        assert!(close(r.left, -50.0));
        assert!(close(r.top, 150.0));
        assert!(close(r.width, 200.0));
    }

    #[test]
    fn unknown_page_is_unavailable() {
        let mut state = PageRenderState::new();
        let bbox = BoundingBox::new(0.1, 0.1, 0.1, 0.1);
        assert_eq!(state.map(2, &bbox), Err(GeometryUnavailable { page: 2 }));

        assert!(state.record(2, PageDimensions::new(600.0, 800.0)));
        let r = state.map(2, &bbox).unwrap();
        assert!(close(r.left, 60.0));
        assert!(close(r.top, 80.0));
        // Other pages are still pending.
        assert!(state.map(1, &bbox).is_err());
    }

    #[test]
    fn recording_same_dimensions_is_not_a_change() {
        let mut state = PageRenderState::new();
        let dims = PageDimensions::new(600.0, 800.0);
        assert!(state.record(1, dims));
        assert!(!state.record(1, dims));
        assert!(state.record(1, PageDimensions::new(1200.0, 1600.0)));
        assert_eq!(state.rendered_pages().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn rect_contains_edges() {
        let r = PixelRect {
            left: 10.0,
            top: 10.0,
            width: 5.0,
            height: 5.0,
        };
        assert!(r.contains(10.0, 15.0));
        assert!(!r.contains(9.9, 12.0));
        assert!(close(r.area(), 25.0));
    }
}
