//! Deduplicated, bounded content fetching
//!
//! [`FetchCoordinator`] turns a content id into its ordered local files. A cache
//! hit is answered directly. A miss takes the id's [`FetchSlot`], so concurrent
//! callers for the same id wait for the first one and then find its result in the
//! cache. The slot holder takes a global fetch permit and a pooled provider
//! session, retries transient failures, and commits a record only once every file
//! is on disk.

use crate::cache::CacheStore;
use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::retry::fetch_with_retry;
use crate::source::{ClientPool, ContentSource};
use crate::types::{ContentDetail, ContentId, Event, FetchedContent, NewContent};
use crate::utils::{list_content_files, total_file_size};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast};
use tracing::{debug, info, warn};

mod slots;

pub use slots::{FetchSlot, FetchSlots};

/// What [`FetchCoordinator::resolve`] found for an id
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved {
    /// The content's files, from the cache or freshly fetched
    Content(FetchedContent),
    /// The id names a multi-part album; nothing was downloaded
    Parts(ContentDetail),
}

/// Fetches content through the cache
pub struct FetchCoordinator {
    cache: Arc<CacheStore>,
    pool: Arc<ClientPool>,
    slots: Arc<FetchSlots>,
    /// Global cap on simultaneous provider fetches
    permits: Semaphore,
    config: FetchConfig,
    event_tx: broadcast::Sender<Event>,
}

impl FetchCoordinator {
    /// Create a coordinator over shared cache, pool and slots
    pub fn new(
        cache: Arc<CacheStore>,
        pool: Arc<ClientPool>,
        slots: Arc<FetchSlots>,
        config: FetchConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            permits: Semaphore::new(config.max_concurrent_fetches),
            cache,
            pool,
            slots,
            config,
            event_tx,
        }
    }

    /// Ordered local files of `id`, fetching them if not cached
    pub async fn fetch(&self, id: ContentId) -> Result<Vec<PathBuf>> {
        Ok(self.fetch_content(id).await?.files)
    }

    /// Like [`fetch`](Self::fetch), also returning the record and whether it was a hit
    pub async fn fetch_content(&self, id: ContentId) -> Result<FetchedContent> {
        if let Some(hit) = self.cache_hit(id).await? {
            return Ok(hit);
        }

        let _slot = self.slots.acquire(id).await;

        // Another caller may have fetched it while we waited for the slot
        if let Some(hit) = self.cache_hit(id).await? {
            debug!(content_id = %id, "Served by concurrent fetch");
            return Ok(hit);
        }

        self.fetch_from_provider(id, None).await
    }

    /// Cached content of `id`, its chapter list when it has several, or the fetched content
    ///
    /// The detail is read once, under the id's slot, and reused for the download, so
    /// a miss costs the provider one detail call however many callers ask at once.
    pub async fn resolve(&self, id: ContentId) -> Result<Resolved> {
        if let Some(hit) = self.cache_hit(id).await? {
            return Ok(Resolved::Content(hit));
        }

        let _slot = self.slots.acquire(id).await;

        if let Some(hit) = self.cache_hit(id).await? {
            debug!(content_id = %id, "Served by concurrent fetch");
            return Ok(Resolved::Content(hit));
        }

        let detail = self.detail(id).await?;
        if detail.is_multi_part() {
            return Ok(Resolved::Parts(detail));
        }
        self.fetch_from_provider(id, Some(detail))
            .await
            .map(Resolved::Content)
    }

    /// Provider metadata for `id`, under the same permit, timeout and retry policy
    pub async fn detail(&self, id: ContentId) -> Result<ContentDetail> {
        let _permit = self.permits.acquire().await.map_err(|_| Error::ShuttingDown)?;
        let client = self.pool.get().await?;
        self.get_detail(&*client, id).await
    }

    /// Stop granting fetch permits; waiting and future fetches fail with `ShuttingDown`
    pub fn close(&self) {
        self.permits.close();
        self.pool.close();
    }

    async fn cache_hit(&self, id: ContentId) -> Result<Option<FetchedContent>> {
        let Some((record, files)) = self.cache.cached_files(id).await? else {
            return Ok(None);
        };
        self.emit(Event::CacheHit { id });
        Ok(Some(FetchedContent {
            record,
            files,
            cache_hit: true,
        }))
    }

    /// Miss path; the caller holds the id's slot
    async fn fetch_from_provider(
        &self,
        id: ContentId,
        detail: Option<ContentDetail>,
    ) -> Result<FetchedContent> {
        self.emit(Event::FetchStarted { id });
        match self.download(id, detail).await {
            Ok(content) => {
                info!(
                    content_id = %id,
                    files = content.record.file_count,
                    size_bytes = content.record.size_bytes,
                    "Fetch completed"
                );
                self.emit(Event::FetchCompleted {
                    id,
                    file_count: content.record.file_count,
                    size_bytes: content.record.size_bytes,
                });
                Ok(content)
            }
            Err(e) => {
                warn!(content_id = %id, error = %e, "Fetch failed");
                self.cache.discard_dir(id).await;
                self.emit(Event::FetchFailed {
                    id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn download(&self, id: ContentId, detail: Option<ContentDetail>) -> Result<FetchedContent> {
        let _permit = self.permits.acquire().await.map_err(|_| Error::ShuttingDown)?;
        let pooled = self.pool.get().await?;
        let client: &dyn ContentSource = &*pooled;

        let detail = match detail {
            Some(detail) => detail,
            None => self.get_detail(client, id).await?,
        };
        let detail = &detail;

        let (dir, written) = fetch_with_retry(&self.config.retry, move || async move {
            // Each attempt starts from an empty directory
            let dir = self.cache.prepare_dir(id).await?;
            let written = self
                .with_timeout(id, client.fetch_files(id, detail, &dir))
                .await?;
            Ok::<_, Error>((dir, written))
        })
        .await?;

        let files = list_content_files(&dir).await?;
        if files.is_empty() || files.len() != written {
            warn!(
                content_id = %id,
                reported = written,
                found = files.len(),
                "Provider left an incomplete directory"
            );
            return Err(Error::IncompleteContent { id });
        }

        let size_bytes = total_file_size(&files).await?;
        let meta = NewContent {
            display_name: detail.display_name.clone(),
            file_count: u32::try_from(files.len()).unwrap_or(u32::MAX),
            size_bytes,
        };
        let record = self.cache.record(id, &meta).await?;

        Ok(FetchedContent {
            record,
            files,
            cache_hit: false,
        })
    }

    async fn get_detail(&self, client: &dyn ContentSource, id: ContentId) -> Result<ContentDetail> {
        fetch_with_retry(&self.config.retry, move || {
            self.with_timeout(id, client.get_detail(id))
        })
        .await
    }

    /// Run one provider call under the fetch timeout; expiry is a transient failure
    async fn with_timeout<T>(&self, id: ContentId, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.fetch_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Fetch {
                id,
                reason: format!(
                    "provider call timed out after {}s",
                    self.config.fetch_timeout.as_secs_f64()
                ),
            }),
        }
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Directory that holds (or would hold) the files of `id`
    pub fn content_dir(&self, id: ContentId) -> PathBuf {
        self.cache.content_dir(id)
    }

    /// Shared cache store
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Shared slot set
    pub fn slots(&self) -> &Arc<FetchSlots> {
        &self.slots
    }
}
