//! Configuration types for comic-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Provider fetch behavior (concurrency, client pool, timeouts, retries)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum simultaneous provider fetches across all ids (default: 3)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Maximum number of provider clients kept in the pool (default: 4)
    #[serde(default = "default_max_pooled_clients")]
    pub max_pooled_clients: usize,

    /// Timeout for a single provider call (default: 120 seconds)
    ///
    /// A call exceeding this is treated as a transient failure and retried.
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Retry behavior for transient provider failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_pooled_clients: default_max_pooled_clients(),
            fetch_timeout: default_fetch_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0, use 1.0 for a fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// On-disk cache location and eviction limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one sub-directory per cached id (default: "./download")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Scratch directory for archives built during delivery (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// SQLite database holding cache records (default: "./comic-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// How often the eviction and session sweep runs (default: 1 hour)
    #[serde(default = "default_eviction_interval", with = "duration_serde")]
    pub eviction_interval: Duration,

    /// Upper bound on the total size of cached content (default: 5 GiB)
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,

    /// Content not accessed for this many days is evicted (default: 7)
    #[serde(default = "default_keep_days")]
    pub keep_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            database_path: default_database_path(),
            eviction_interval: default_eviction_interval(),
            max_total_bytes: default_max_total_bytes(),
            keep_days: default_keep_days(),
        }
    }
}

/// Delivery batching and archive behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Files per batch (default: 10, the usual media-group limit)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batches uploaded at the same time (default: 2)
    #[serde(default = "default_delivery_concurrency")]
    pub concurrency: usize,

    /// Build a supplementary archive when more files than this are delivered (default: 50)
    ///
    /// Set to `None` to never build archives.
    #[serde(default = "default_archive_threshold")]
    pub archive_threshold: Option<usize>,

    /// Largest archive that will be sent (default: 50 MiB)
    #[serde(default = "default_archive_max_bytes")]
    pub archive_max_bytes: u64,

    /// Send the first file with the album name as a cover message (default: true)
    #[serde(default = "default_true")]
    pub send_preview: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_delivery_concurrency(),
            archive_threshold: default_archive_threshold(),
            archive_max_bytes: default_archive_max_bytes(),
            send_preview: true,
        }
    }
}

/// Multi-part selection sessions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Parts listed per page (default: 20)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Sessions idle for longer than this are reclaimed (default: 1 hour)
    #[serde(default = "default_inactivity_timeout", with = "duration_serde")]
    pub inactivity_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            inactivity_timeout: default_inactivity_timeout(),
        }
    }
}

/// HTTP provider settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the provider API (default: "http://127.0.0.1:8080/")
    #[serde(default = "default_base_url")]
    pub base_url: url::Url,

    /// User-Agent header sent to the provider
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Images downloaded in parallel within one album (default: 4)
    #[serde(default = "default_image_concurrency")]
    pub image_concurrency: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            image_concurrency: default_image_concurrency(),
        }
    }
}

/// Main configuration for ComicDownloader
///
/// Fields are organized into sub-configs:
/// - [`fetch`](FetchConfig) - provider concurrency, client pool, retries
/// - [`cache`](CacheConfig) - directories, database, eviction limits
/// - [`delivery`](DeliveryConfig) - batching and archives
/// - [`session`](SessionConfig) - multi-part selection paging
/// - [`source`](SourceConfig) - HTTP provider endpoint
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider fetch behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Cache storage and eviction
    #[serde(default)]
    pub cache: CacheConfig,

    /// Delivery batching
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Selection sessions
    #[serde(default)]
    pub session: SessionConfig,

    /// HTTP provider
    #[serde(default)]
    pub source: SourceConfig,
}

impl Config {
    /// Check settings that would otherwise deadlock or divide by zero
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, usize); 6] = [
            ("fetch.max_concurrent_fetches", self.fetch.max_concurrent_fetches),
            ("fetch.max_pooled_clients", self.fetch.max_pooled_clients),
            ("delivery.batch_size", self.delivery.batch_size),
            ("delivery.concurrency", self.delivery.concurrency),
            ("session.page_size", self.session.page_size),
            ("source.image_concurrency", self.source.image_concurrency),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(Error::Config {
                    message: format!("{key} must be at least 1"),
                    key: Some(key.to_string()),
                });
            }
        }
        if self.fetch.fetch_timeout.is_zero() {
            return Err(Error::Config {
                message: "fetch.fetch_timeout must be non-zero".to_string(),
                key: Some("fetch.fetch_timeout".to_string()),
            });
        }
        if self.cache.eviction_interval.is_zero() {
            return Err(Error::Config {
                message: "cache.eviction_interval must be non-zero".to_string(),
                key: Some("cache.eviction_interval".to_string()),
            });
        }
        Ok(())
    }
}

fn default_max_concurrent_fetches() -> usize {
    3
}

fn default_max_pooled_clients() -> usize {
    4
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("download")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("comic-dl.db")
}

fn default_eviction_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_max_total_bytes() -> u64 {
    5 * 1024 * 1024 * 1024
}

fn default_keep_days() -> u32 {
    7
}

fn default_batch_size() -> usize {
    10
}

fn default_delivery_concurrency() -> usize {
    2
}

fn default_archive_threshold() -> Option<usize> {
    Some(50)
}

fn default_archive_max_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_page_size() -> usize {
    20
}

fn default_inactivity_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_base_url() -> url::Url {
    url::Url::parse("http://127.0.0.1:8080/").unwrap_or_else(|_| unreachable!())
}

fn default_user_agent() -> String {
    concat!("comic-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_image_concurrency() -> usize {
    4
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
