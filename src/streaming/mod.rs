//! Serves the files a completed or in-progress item has already written to
//! disk (spec.md §6 "loopback HTTP file server rooted at the items
//! directory").
//!
//! The worker only ever exposes a segment once its atomic rename from
//! `*.part` has landed, so there is nothing dynamic to generate here: every
//! request this router answers is a direct read of a file the manager or
//! worker already produced.

use axum::Router;
use tower_http::services::ServeDir;

/// Build the nested file-serving router rooted at `items_root`.
///
/// `ServeDir` already implements conditional GET and byte-range requests,
/// which is what a player stepping through `master.m3u8`/segment URLs needs.
pub fn playback_router<S>(items_root: &std::path::Path) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().fallback_service(ServeDir::new(items_root))
}
