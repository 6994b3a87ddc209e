//! Shared mocks for unit tests.

use crate::cache::CacheStore;
use crate::config::{FetchConfig, RetryConfig};
use crate::db::Database;
use crate::delivery::Consumer;
use crate::error::{DeliveryError, Error, Result};
use crate::fetch::{FetchCoordinator, FetchSlots};
use crate::source::{ClientPool, ContentSource};
use crate::types::{ChatId, ContentDetail, ContentId, Event, Part};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone)]
struct MockAlbum {
    name: String,
    pages: usize,
    parts: Vec<Part>,
}

/// In-memory provider with call counters, latency and injectable failures
#[derive(Default)]
pub(crate) struct MockSource {
    albums: Mutex<HashMap<ContentId, MockAlbum>>,
    latency: Mutex<Duration>,
    page_bytes: usize,
    transient_failures: AtomicUsize,
    detail_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MockSource {
    pub(crate) fn new() -> Self {
        Self {
            page_bytes: 1024,
            ..Self::default()
        }
    }

    /// Register a single-part album with `pages` files
    pub(crate) fn with_album(self, id: u64, name: &str, pages: usize) -> Self {
        self.albums.lock().unwrap().insert(
            ContentId(id),
            MockAlbum {
                name: name.to_string(),
                pages,
                parts: Vec::new(),
            },
        );
        self
    }

    /// Register a multi-part album whose chapters are single-part albums of `pages` files
    pub(crate) fn with_series(self, id: u64, name: &str, part_ids: &[u64], pages: usize) -> Self {
        let parts: Vec<Part> = part_ids
            .iter()
            .enumerate()
            .map(|(i, part)| Part {
                id: ContentId(*part),
                label: format!("{}", i + 1),
            })
            .collect();
        {
            let mut albums = self.albums.lock().unwrap();
            for part in &parts {
                albums.insert(
                    part.id,
                    MockAlbum {
                        name: format!("{} {}", name, part.label),
                        pages,
                        parts: Vec::new(),
                    },
                );
            }
            albums.insert(
                ContentId(id),
                MockAlbum {
                    name: name.to_string(),
                    pages,
                    parts,
                },
            );
        }
        self
    }

    pub(crate) fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = latency;
        self
    }

    /// Fail the next `n` `fetch_files` calls with a transient error
    pub(crate) fn fail_next(&self, n: usize) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    fn album(&self, id: ContentId) -> Result<MockAlbum> {
        self.albums
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound { id })
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait::async_trait]
impl ContentSource for MockSource {
    async fn get_detail(&self, id: ContentId) -> Result<ContentDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let album = self.album(id)?;
        Ok(ContentDetail {
            display_name: album.name,
            parts: album.parts,
            pages: (1..=album.pages).map(|page| format!("{}/{}", id, page)).collect(),
        })
    }

    async fn fetch_files(&self, id: ContentId, _detail: &ContentDetail, dir: &Path) -> Result<usize> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let album = self.album(id)?;

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            // Leave a partial file behind like an interrupted download would
            std::fs::write(dir.join("00001.jpg"), b"partial").unwrap();
            return Err(Error::Fetch {
                id,
                reason: "connection reset".to_string(),
            });
        }

        for page in 1..=album.pages {
            std::fs::write(dir.join(format!("{:05}.jpg", page)), vec![0u8; self.page_bytes]).unwrap();
        }
        Ok(album.pages)
    }
}

/// Retry policy without real waiting
pub(crate) fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

pub(crate) fn test_fetch_config() -> FetchConfig {
    FetchConfig {
        max_concurrent_fetches: 3,
        max_pooled_clients: 4,
        fetch_timeout: Duration::from_secs(10),
        retry: fast_retry(),
    }
}

/// Pool whose every session is `source`
pub(crate) fn shared_pool(source: Arc<MockSource>, capacity: usize) -> ClientPool {
    ClientPool::new(
        capacity,
        Box::new(move || Ok(source.clone() as Arc<dyn ContentSource>)),
    )
}

pub(crate) async fn create_test_cache() -> (Arc<CacheStore>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
    let cache = CacheStore::open(Arc::new(db), temp_dir.path().join("download"))
        .await
        .unwrap();
    (Arc::new(cache), temp_dir)
}

/// Coordinator over a fresh cache; returns the event receiver subscribed before any fetch
pub(crate) async fn create_test_coordinator(
    source: Arc<MockSource>,
    config: FetchConfig,
) -> (
    Arc<FetchCoordinator>,
    tokio::sync::broadcast::Receiver<Event>,
    TempDir,
) {
    let (cache, temp_dir) = create_test_cache().await;
    let (event_tx, event_rx) = tokio::sync::broadcast::channel(1000);
    let pool = Arc::new(shared_pool(source, config.max_pooled_clients));
    let coordinator = FetchCoordinator::new(
        cache,
        pool,
        Arc::new(FetchSlots::new()),
        config,
        event_tx,
    );
    (Arc::new(coordinator), event_rx, temp_dir)
}

/// What a [`RecordingConsumer`] received
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Preview { file: PathBuf, caption: String },
    Batch(Vec<PathBuf>),
    Document { file: PathBuf, size: u64 },
}

/// Consumer that records every upload and can reject chosen batches
#[derive(Default)]
pub(crate) struct RecordingConsumer {
    sent: Mutex<Vec<(ChatId, Sent)>>,
    /// Batches whose first file is in this set are rejected
    reject_starting_with: Mutex<HashSet<PathBuf>>,
    max_document_bytes: Option<u64>,
    batch_latency: Duration,
}

impl RecordingConsumer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_document_limit(mut self, limit: u64) -> Self {
        self.max_document_bytes = Some(limit);
        self
    }

    pub(crate) fn with_batch_latency(mut self, latency: Duration) -> Self {
        self.batch_latency = latency;
        self
    }

    pub(crate) fn reject_batch_starting_with(&self, file: &Path) {
        self.reject_starting_with
            .lock()
            .unwrap()
            .insert(file.to_path_buf());
    }

    pub(crate) fn sent(&self) -> Vec<(ChatId, Sent)> {
        self.sent.lock().unwrap().clone()
    }

    /// Files of every accepted batch, in the order they arrived
    pub(crate) fn batches(&self) -> Vec<Vec<PathBuf>> {
        self.sent()
            .into_iter()
            .filter_map(|(_, sent)| match sent {
                Sent::Batch(files) => Some(files),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Consumer for RecordingConsumer {
    async fn send_preview(&self, chat: ChatId, file: &Path, caption: &str) -> std::result::Result<(), DeliveryError> {
        self.sent.lock().unwrap().push((
            chat,
            Sent::Preview {
                file: file.to_path_buf(),
                caption: caption.to_string(),
            },
        ));
        Ok(())
    }

    async fn send_batch(&self, chat: ChatId, files: &[PathBuf]) -> std::result::Result<(), DeliveryError> {
        if !self.batch_latency.is_zero() {
            tokio::time::sleep(self.batch_latency).await;
        }
        let rejected = files
            .first()
            .is_some_and(|f| self.reject_starting_with.lock().unwrap().contains(f));
        if rejected {
            return Err(DeliveryError::Rejected("media group refused".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat, Sent::Batch(files.to_vec())));
        Ok(())
    }

    async fn send_document(&self, chat: ChatId, file: &Path, _caption: &str) -> std::result::Result<(), DeliveryError> {
        let size = std::fs::metadata(file).unwrap().len();
        self.sent.lock().unwrap().push((
            chat,
            Sent::Document {
                file: file.to_path_buf(),
                size,
            },
        ));
        Ok(())
    }

    fn max_document_bytes(&self) -> u64 {
        self.max_document_bytes.unwrap_or(u64::MAX)
    }
}

/// Write `count` numbered files of `bytes` bytes each into `dir`
pub(crate) fn numbered_files(dir: &Path, count: usize, bytes: usize) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).unwrap();
    (1..=count)
        .map(|i| {
            let path = dir.join(format!("{:05}.jpg", i));
            std::fs::write(&path, vec![0u8; bytes]).unwrap();
            path
        })
        .collect()
}

/// Put `id` into the cache with two small files, accounted as `size_bytes`
pub(crate) async fn cache_content(cache: &CacheStore, id: u64, size_bytes: u64) {
    let id = ContentId(id);
    let dir = cache.prepare_dir(id).await.unwrap();
    numbered_files(&dir, 2, 4);
    let meta = crate::types::NewContent {
        display_name: format!("album {}", id),
        file_count: 2,
        size_bytes,
    };
    cache.record(id, &meta).await.unwrap();
}
