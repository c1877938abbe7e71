//! Pipeline stages from uploaded document to on-page overlays.
//!
//! Each submodule implements exactly one step and can be tested on its own
//! against in-memory backends.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ submit ──▶ poll ──▶ aggregate ──▶ geometry ──▶ overlay
//! (path/URL) (store +   (ticks +   (page        (normalised   (selection,
//!             start job) pages)     groups)      → pixels)     listing)
//! ```
//!
//! 1. [`input`]     — load a local file or download a URL into an `Artifact`
//! 2. [`submit`]    — store the artifact and start exactly one remote job
//! 3. [`poll`]      — drive the job to a terminal state; the only stage with
//!    a timer and cancellation
//! 4. [`aggregate`] — merge result fragments into page groups, de-duplicated
//!    by element id
//! 5. [`geometry`]  — map normalised boxes onto rendered page pixels
//! 6. [`overlay`]   — per-page overlays and the listing, sharing one selection

pub mod aggregate;
pub mod geometry;
pub mod input;
pub mod overlay;
pub mod poll;
pub mod submit;
