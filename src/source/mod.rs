//! Content providers
//!
//! [`ContentSource`] wraps one provider session. Sessions are borrowed from a
//! bounded [`ClientPool`]; [`HttpContentSource`] is the JSON-over-HTTP implementation.

use crate::error::Result;
use crate::types::{ContentDetail, ContentId};
use std::path::Path;

mod http;
mod pool;

pub use http::HttpContentSource;
pub use pool::{ClientPool, PooledClient, SourceFactory};

/// One provider session
///
/// Implementations hold no per-request state, so a pooled instance can serve any id.
/// Errors must be [`Error::NotFound`](crate::Error::NotFound) for ids the provider
/// rejects and [`Error::Fetch`](crate::Error::Fetch) for transient failures.
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Metadata for `id`: display name and chapter list
    async fn get_detail(&self, id: ContentId) -> Result<ContentDetail>;

    /// Write the files of `id` into `dir` (which exists and is empty)
    ///
    /// `detail` is what [`get_detail`](Self::get_detail) returned for `id`; its
    /// `pages` locate the files. Files must be named so their sequence number sorts
    /// them in reading order. Returns the number of files written.
    async fn fetch_files(&self, id: ContentId, detail: &ContentDetail, dir: &Path) -> Result<usize>;
}
