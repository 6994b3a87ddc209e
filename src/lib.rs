//! # comic-dl
//!
//! Backend library for chat bots that hand out comic albums.
//!
//! ## Design Philosophy
//!
//! comic-dl is designed to be:
//! - **Fetch once** - Concurrent requests for the same album share one download
//! - **Bounded** - Provider calls, pooled clients and cache size all have limits
//! - **Library-first** - No bot framework built in; front-ends implement [`Consumer`]
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use comic_dl::{ChatId, ComicDownloader, Config, ContentId, RequestOutcome, UserId};
//! # use comic_dl::{Consumer, DeliveryError};
//! # use std::path::{Path, PathBuf};
//! # struct Bot;
//! # #[async_trait::async_trait]
//! # impl Consumer for Bot {
//! #     async fn send_preview(&self, _: ChatId, _: &Path, _: &str) -> Result<(), DeliveryError> { Ok(()) }
//! #     async fn send_batch(&self, _: ChatId, _: &[PathBuf]) -> Result<(), DeliveryError> { Ok(()) }
//! #     async fn send_document(&self, _: ChatId, _: &Path, _: &str) -> Result<(), DeliveryError> { Ok(()) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.source.base_url = "https://provider.example.com/api/".parse()?;
//!
//!     let downloader = ComicDownloader::with_http_source(config).await?;
//!     downloader.start_maintenance();
//!
//!     let bot = Bot;
//!     let id: ContentId = "JM350234".parse()?;
//!     match downloader.request(ChatId(42), UserId(7), id, &bot).await? {
//!         RequestOutcome::Delivered { report, .. } => {
//!             println!("{} batches delivered", report.delivered_batches());
//!         }
//!         RequestOutcome::Selection(page) => {
//!             println!("pick one of {} parts", page.parts.len());
//!         }
//!     }
//!
//!     downloader.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// On-disk content cache
pub mod cache;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Batched delivery to chat consumers
pub mod delivery;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Cache eviction
pub mod eviction;
/// Deduplicated fetching
pub mod fetch;
/// Retry logic with exponential backoff
pub mod retry;
/// Multi-part selection sessions
pub mod session;
/// Content providers and the client pool
pub mod source;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use cache::{CacheStore, ReconcileReport};
pub use config::Config;
pub use db::Database;
pub use delivery::{BatchOutcome, Consumer, DeliveryPipeline, DeliveryReport};
pub use downloader::{ComicDownloader, RequestOutcome};
pub use error::{DatabaseError, DeliveryError, Error, Result, UserFacing};
pub use eviction::{EvictionReport, EvictionScheduler};
pub use fetch::{FetchCoordinator, FetchSlots, Resolved};
pub use session::{Nav, PageView, Phase, SelectionSession, SessionRegistry};
pub use source::{ClientPool, ContentSource, HttpContentSource, SourceFactory};
pub use types::{
    ChatId, ContentDetail, ContentId, ContentRecord, Event, FetchedContent, Part, UserId,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use comic_dl::{ComicDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = ComicDownloader::with_http_source(Config::default()).await?;
///     downloader.start_maintenance();
///
///     // Serve requests from other tasks, then stop on SIGTERM/SIGINT
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: ComicDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
