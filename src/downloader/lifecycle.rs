//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::time::Duration;

use super::ComicDownloader;

/// How long shutdown waits for the maintenance loop and in-flight fetches
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl ComicDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new requests (they fail with `ShuttingDown`)
    /// 2. Cancels the maintenance loop and waits for it
    /// 3. Waits for in-flight fetches to finish (30 second timeout)
    /// 4. Emits [`Event::Shutdown`]
    /// 5. Closes the database pool
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new requests
        self.accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);

        // 2. Stop maintenance; a running pass completes first
        self.maintenance.cancel_token.cancel();
        let handle = self
            .maintenance
            .handle
            .lock()
            .ok()
            .and_then(|mut handle| handle.take());
        if let Some(handle) = handle {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => tracing::info!("Maintenance task stopped"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Maintenance task ended abnormally"),
                Err(_) => tracing::warn!("Timeout waiting for maintenance task"),
            }
        }

        // 3. Let in-flight fetches commit, then refuse new provider work
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_in_flight())
            .await
            .is_err()
        {
            tracing::warn!("Timeout waiting for in-flight fetches, proceeding with shutdown");
        }
        self.fetcher.close();

        // 4. Emit shutdown event
        self.emit_event(Event::Shutdown);

        // 5. Close database connections
        self.db.close().await;

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Wait until no fetch slot is held
    async fn wait_for_in_flight(&self) {
        loop {
            let in_flight = self.fetcher.slots().in_flight();
            if in_flight == 0 {
                return;
            }
            tracing::debug!(in_flight, "Waiting for in-flight fetches to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
