//! Core downloader implementation split into focused submodules.
//!
//! The `ComicDownloader` struct and its methods are organized by domain:
//! - [`requests`] - Content requests, part selection and purge
//! - [`background_tasks`] - Periodic eviction and session sweep
//! - [`lifecycle`] - Shutdown coordination

mod background_tasks;
mod lifecycle;
mod requests;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use requests::RequestOutcome;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::db::Database;
use crate::delivery::DeliveryPipeline;
use crate::error::{Error, Result};
use crate::eviction::EvictionScheduler;
use crate::fetch::{FetchCoordinator, FetchSlots};
use crate::session::SessionRegistry;
use crate::source::{ClientPool, ContentSource, HttpContentSource, SourceFactory};
use crate::types::Event;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Buffer size of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Background maintenance task state
#[derive(Clone)]
pub(crate) struct MaintenanceState {
    /// Cancels the maintenance loop
    pub(crate) cancel_token: tokio_util::sync::CancellationToken,
    /// Handle of the running loop, taken on shutdown
    pub(crate) handle: Arc<std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// Owns every shared component: the cache, the fetch coordinator with its client
/// pool and slots, eviction, delivery and the selection sessions. Front-ends keep
/// one instance and pass it to every request handler.
#[derive(Clone)]
pub struct ComicDownloader {
    /// Database instance for persistence
    /// Public for integration tests to inspect cache records
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// On-disk cache
    pub(crate) cache: Arc<CacheStore>,
    /// Deduplicated fetching
    pub(crate) fetcher: Arc<FetchCoordinator>,
    /// Eviction policy
    pub(crate) eviction: Arc<EvictionScheduler>,
    /// Batched delivery
    pub(crate) delivery: Arc<DeliveryPipeline>,
    /// Per-user selection sessions
    pub(crate) sessions: Arc<SessionRegistry>,
    /// Background maintenance loop
    pub(crate) maintenance: MaintenanceState,
    /// Whether new requests are accepted (false once shutdown begins)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl ComicDownloader {
    /// Create a new ComicDownloader instance
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Creates the download and temp directories
    /// - Opens/creates the SQLite database and runs migrations
    /// - Reconciles the on-disk cache with its records
    /// - Sets up the event broadcast channel
    ///
    /// `factory` creates provider sessions for the client pool.
    pub async fn new(config: Config, factory: SourceFactory) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.cache.temp_dir)
            .await
            .map_err(|e| Error::storage(&config.cache.temp_dir, e))?;

        let db = Arc::new(Database::new(&config.cache.database_path).await?);
        let cache = Arc::new(CacheStore::open(db.clone(), &config.cache.download_dir).await?);

        // Finish interrupted removals and drop anything a crash left half-written
        cache.reconcile().await?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let slots = Arc::new(FetchSlots::new());
        let pool = Arc::new(ClientPool::new(config.fetch.max_pooled_clients, factory));
        let fetcher = Arc::new(FetchCoordinator::new(
            cache.clone(),
            pool,
            slots.clone(),
            config.fetch.clone(),
            event_tx.clone(),
        ));
        let eviction = Arc::new(EvictionScheduler::new(
            cache.clone(),
            slots,
            &config.cache,
            event_tx.clone(),
        ));
        let delivery = Arc::new(DeliveryPipeline::new(
            config.delivery.clone(),
            config.cache.temp_dir.clone(),
            event_tx.clone(),
        ));
        let sessions = Arc::new(SessionRegistry::new(config.session.clone()));

        tracing::info!(
            download_dir = %config.cache.download_dir.display(),
            max_concurrent_fetches = config.fetch.max_concurrent_fetches,
            max_pooled_clients = config.fetch.max_pooled_clients,
            "Comic downloader initialized"
        );

        Ok(Self {
            db,
            event_tx,
            config: Arc::new(config),
            cache,
            fetcher,
            eviction,
            delivery,
            sessions,
            maintenance: MaintenanceState {
                cancel_token: tokio_util::sync::CancellationToken::new(),
                handle: Arc::new(std::sync::Mutex::new(None)),
            },
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Create a downloader that talks to the HTTP provider in `config.source`
    pub async fn with_http_source(config: Config) -> Result<Self> {
        let source_config = config.source.clone();
        let factory: SourceFactory = Box::new(move || {
            Ok(Arc::new(HttpContentSource::new(&source_config)?) as Arc<dyn ContentSource>)
        });
        Self::new(config, factory).await
    }

    /// Subscribe to downloader events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls more than 1000 events behind receives `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use comic_dl::{ComicDownloader, Config};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = ComicDownloader::with_http_source(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "comic-dl event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The fetch coordinator, for callers that only need files
    pub fn fetcher(&self) -> &FetchCoordinator {
        &self.fetcher
    }

    /// The on-disk cache
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// The selection session registry
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
