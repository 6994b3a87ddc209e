//! Age and size bounded cache eviction
//!
//! A pass walks records from least to most recently accessed. It removes every
//! record older than `keep_days`, and keeps removing the oldest records while the
//! cache is above `max_total_bytes`. Ids with a fetch in flight are skipped: the
//! pass try-acquires each id's fetch slot and holds it while deleting.

use crate::cache::CacheStore;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::fetch::FetchSlots;
use crate::types::{ContentId, ContentRecord, Event};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Outcome of one eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Ids removed, in removal order
    pub removed: Vec<ContentId>,
    /// Bytes accounted to removed ids
    pub freed_bytes: u64,
    /// Candidates skipped because a fetch held their slot
    pub skipped_busy: Vec<ContentId>,
    /// Candidates whose removal failed, with the error
    pub failed: Vec<(ContentId, String)>,
    /// Cache size after the pass
    pub remaining_bytes: u64,
    /// True if the cache is still above its size limit
    pub over_limit: bool,
}

/// Applies the eviction policy to a [`CacheStore`]
pub struct EvictionScheduler {
    cache: Arc<CacheStore>,
    slots: Arc<FetchSlots>,
    max_total_bytes: u64,
    keep_days: u32,
    event_tx: broadcast::Sender<Event>,
}

impl EvictionScheduler {
    /// Create a scheduler with the limits from `config`
    pub fn new(
        cache: Arc<CacheStore>,
        slots: Arc<FetchSlots>,
        config: &CacheConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            cache,
            slots,
            max_total_bytes: config.max_total_bytes,
            keep_days: config.keep_days,
            event_tx,
        }
    }

    /// Run one pass against the current time
    pub async fn run_pass(&self) -> Result<EvictionReport> {
        self.run_pass_at(Utc::now()).await
    }

    /// Run one pass as if the current time were `now`
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> Result<EvictionReport> {
        let candidates = self.cache.records_by_access().await?;
        let total = self.cache.total_size().await?;
        Ok(self.evict(candidates, total, now).await)
    }

    /// Walk `candidates` (oldest access first) starting from a cache of `total` bytes
    ///
    /// Failures on one id are recorded in the report and the pass moves on.
    async fn evict(
        &self,
        candidates: Vec<ContentRecord>,
        mut total: u64,
        now: DateTime<Utc>,
    ) -> EvictionReport {
        let cutoff = now - chrono::Duration::days(i64::from(self.keep_days));
        let mut report = EvictionReport::default();
        let mut queue = VecDeque::from(candidates);
        let mut revisited = HashSet::new();

        while let Some(record) = queue.pop_front() {
            let expired = record.access_time < cutoff;
            // Ordered by access time: nothing after this is expired either
            if !expired && total <= self.max_total_bytes {
                break;
            }

            let Some(_slot) = self.slots.try_acquire(record.id) else {
                debug!(content_id = %record.id, "Skipping eviction of busy id");
                report.skipped_busy.push(record.id);
                continue;
            };

            let current = match self.cache.get(record.id).await {
                Ok(Some(current)) => current,
                Ok(None) => continue,
                Err(e) => {
                    error!(content_id = %record.id, error = %e, "Failed to read record for eviction");
                    report.failed.push((record.id, e.to_string()));
                    continue;
                }
            };

            // A hit since listing makes it the most recently used; only size pressure
            // can still claim it, after every older candidate
            if current.access_time != record.access_time {
                if total > self.max_total_bytes && revisited.insert(record.id) {
                    debug!(content_id = %record.id, "Accessed during eviction, revisiting last");
                    queue.push_back(current);
                }
                continue;
            }

            match self.cache.remove(record.id).await {
                Ok(true) => {
                    debug!(
                        content_id = %record.id,
                        size_bytes = current.size_bytes,
                        expired,
                        "Evicted"
                    );
                    report.removed.push(record.id);
                    report.freed_bytes += current.size_bytes;
                    total = total.saturating_sub(current.size_bytes);
                    self.emit(Event::Evicted {
                        id: record.id,
                        size_bytes: current.size_bytes,
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    error!(content_id = %record.id, error = %e, "Failed to evict");
                    report.failed.push((record.id, e.to_string()));
                }
            }

            total = match self.cache.total_size().await {
                Ok(size) => size,
                Err(e) => {
                    warn!(error = %e, estimate = total, "Failed to re-read cache size, using estimate");
                    total
                }
            };
        }

        report.remaining_bytes = total;
        report.over_limit = total > self.max_total_bytes;
        if report.over_limit {
            warn!(
                remaining_bytes = total,
                max_total_bytes = self.max_total_bytes,
                skipped_busy = report.skipped_busy.len(),
                failed = report.failed.len(),
                "Cache still over its size limit after eviction"
            );
        }

        info!(
            removed = report.removed.len(),
            freed_bytes = report.freed_bytes,
            remaining_bytes = report.remaining_bytes,
            "Eviction pass complete"
        );
        self.emit(Event::EvictionPass {
            removed: report.removed.len(),
            freed_bytes: report.freed_bytes,
            remaining_bytes: report.remaining_bytes,
            over_limit: report.over_limit,
        });

        report
    }

    /// Remove one id now, waiting for an in-flight fetch of it to finish
    ///
    /// Returns false if the id was not cached.
    pub async fn purge(&self, id: ContentId) -> Result<bool> {
        let _slot = self.slots.acquire(id).await;
        let size = self.cache.get(id).await?.map(|r| r.size_bytes);
        let removed = self.cache.remove(id).await?;
        if removed {
            info!(content_id = %id, "Purged from cache");
            self.emit(Event::Evicted {
                id,
                size_bytes: size.unwrap_or(0),
            });
        }
        Ok(removed)
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
