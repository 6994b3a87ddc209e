//! Periodic eviction and session sweep.

use crate::eviction::EvictionScheduler;
use crate::session::SessionRegistry;
use crate::types::Event;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::ComicDownloader;

impl ComicDownloader {
    /// Start the maintenance loop
    ///
    /// Every `cache.eviction_interval` the loop runs an eviction pass and removes
    /// idle selection sessions. Returns false if the loop is already running.
    /// The loop stops on [`shutdown`](Self::shutdown).
    pub fn start_maintenance(&self) -> bool {
        let Ok(mut handle) = self.maintenance.handle.lock() else {
            return false;
        };
        if handle.is_some() {
            return false;
        }

        let period = self.config.cache.eviction_interval;
        let eviction = self.eviction.clone();
        let sessions = self.sessions.clone();
        let event_tx = self.event_tx.clone();
        let cancel_token = self.maintenance.cancel_token.clone();

        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; startup already reconciled the cache
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                // Not raced against cancellation: a pass always finishes its removals
                run_maintenance_pass(&eviction, &sessions, &event_tx).await;
            }
            tracing::debug!("Maintenance loop stopped");
        }));

        tracing::info!(interval_secs = period.as_secs(), "Maintenance task started");
        true
    }

    /// Run one maintenance pass now (eviction, then session sweep)
    pub async fn run_maintenance(&self) {
        run_maintenance_pass(&self.eviction, &self.sessions, &self.event_tx).await;
    }
}

async fn run_maintenance_pass(
    eviction: &Arc<EvictionScheduler>,
    sessions: &Arc<SessionRegistry>,
    event_tx: &broadcast::Sender<Event>,
) {
    if let Err(e) = eviction.run_pass().await {
        tracing::error!(error = %e, "Eviction pass failed");
    }

    let expired = sessions.purge_expired();
    if expired > 0 {
        tracing::info!(count = expired, "Expired selection sessions removed");
        event_tx.send(Event::SessionsExpired { count: expired }).ok();
    }
}
