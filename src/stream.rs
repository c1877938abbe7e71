//! Streaming progress API: observe a job as a `Stream` of snapshots.
//!
//! The counterpart to the callback [`crate::progress::PollObserver`]. The
//! stream yields the current snapshot immediately, then every newly
//! published one. Snapshots are coalesced: a slow consumer sees the latest
//! state, not every intermediate one. The stream ends after the terminal
//! snapshot.

use crate::pipeline::poll::{PollHandle, PollSnapshot};
use futures::stream::StreamExt;
use std::pin::Pin;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream;

/// A boxed stream of poll snapshots.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = PollSnapshot> + Send>>;

/// Follow the snapshots of a running job.
pub fn watch_job(handle: &PollHandle) -> SnapshotStream {
    let mut finished = false;
    let stream = WatchStream::new(handle.subscribe()).take_while(move |snapshot| {
        // Yield the first terminal snapshot, then stop.
        let keep = !finished;
        finished = finished || snapshot.state.is_terminal();
        futures::future::ready(keep)
    });
    Box::pin(stream)
}
