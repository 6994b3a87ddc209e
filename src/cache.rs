//! On-disk content cache
//!
//! [`CacheStore`] maps content ids to a record in the [`Database`] plus a directory
//! `{root}/{id}/` holding the fetched files. The record is the only authority for a
//! cache hit: a directory without a record is never served, and a record whose
//! directory is missing or short of files is discarded on access.
//!
//! Removal is two-phase. The record is first marked as a tombstone (so it stops
//! being served), then the directory is deleted, then the record. A crash between
//! the steps leaves a tombstone that [`CacheStore::reconcile`] finishes on startup.

use crate::db::{ContentRow, Database, record_state};
use crate::error::{Error, Result};
use crate::types::{ContentId, ContentRecord, NewContent};
use crate::utils::{list_content_files, remove_dir_if_exists};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a startup consistency pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Interrupted removals that were completed
    pub finished_tombstones: usize,
    /// Records dropped because their directory was missing or incomplete
    pub dropped_records: usize,
    /// Directories deleted because no record referenced them
    pub removed_orphans: usize,
}

/// Persistent mapping from content id to cached files
pub struct CacheStore {
    db: Arc<Database>,
    root: PathBuf,
    /// Store-wide lock serializing record reads and writes
    lock: tokio::sync::Mutex<()>,
}

impl CacheStore {
    /// Open the cache rooted at `root`, creating the directory if needed
    pub async fn open(db: Arc<Database>, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::storage(&root, e))?;
        Ok(Self {
            db,
            root,
            lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Root directory of the cache
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the files of `id`
    pub fn content_dir(&self, id: ContentId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// True if `id` has a valid record; refreshes its access time when it does
    pub async fn is_cached(&self, id: ContentId) -> Result<bool> {
        Ok(self.cached_files(id).await?.is_some())
    }

    /// Validated cache lookup
    ///
    /// Returns the record (with its refreshed access time) and the ordered file list,
    /// or `None` on a miss. An inconsistent entry is discarded and reported as a miss.
    pub async fn cached_files(&self, id: ContentId) -> Result<Option<(ContentRecord, Vec<PathBuf>)>> {
        let _guard = self.lock.lock().await;

        let Some(row) = self.db.get_content(id).await? else {
            return Ok(None);
        };
        if row.state != record_state::READY {
            return Ok(None);
        }

        let dir = self.content_dir(id);
        let files = match self.validate_dir(&dir, &row).await? {
            Some(files) => files,
            None => {
                warn!(
                    content_id = %id,
                    expected_files = row.file_count,
                    "Cached directory missing or incomplete, discarding record"
                );
                self.remove_locked(id).await?;
                return Ok(None);
            }
        };

        let now = chrono::Utc::now().timestamp_millis();
        let Some(access_time) = self.db.touch_content(id, now).await? else {
            return Ok(None);
        };

        let mut record = ContentRecord::from(row);
        record.access_time = crate::db::from_millis(access_time);
        debug!(content_id = %id, files = files.len(), "Cache hit");
        Ok(Some((record, files)))
    }

    /// Commit a record for a freshly written directory
    pub async fn record(&self, id: ContentId, meta: &NewContent) -> Result<ContentRecord> {
        let _guard = self.lock.lock().await;
        let now = chrono::Utc::now();
        self.db
            .upsert_content(id, meta, now.timestamp_millis())
            .await?;
        // Read back so the record carries exactly what was persisted
        match self.db.get_content(id).await? {
            Some(row) => Ok(ContentRecord::from(row)),
            None => Err(Error::Other(format!(
                "record for content {id} vanished after commit"
            ))),
        }
    }

    /// Ready record for `id`, without touching its access time
    pub async fn get(&self, id: ContentId) -> Result<Option<ContentRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .db
            .get_content(id)
            .await?
            .filter(|row| row.state == record_state::READY)
            .map(ContentRecord::from))
    }

    /// Total bytes accounted to cached content
    pub async fn total_size(&self) -> Result<u64> {
        let _guard = self.lock.lock().await;
        self.db.total_content_size().await
    }

    /// Ready records, least recently accessed first
    pub async fn records_by_access(&self) -> Result<Vec<ContentRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .db
            .list_content_by_access()
            .await?
            .into_iter()
            .map(ContentRecord::from)
            .collect())
    }

    /// Remove `id` from the cache: tombstone, delete directory, delete record
    ///
    /// Returns false if there was nothing to remove. Callers that may race a fetch
    /// must hold the id's fetch slot.
    pub async fn remove(&self, id: ContentId) -> Result<bool> {
        let _guard = self.lock.lock().await;
        self.remove_locked(id).await
    }

    async fn remove_locked(&self, id: ContentId) -> Result<bool> {
        let had_record = self.db.mark_tombstone(id).await?;
        let dir = self.content_dir(id);
        let had_dir = tokio::fs::try_exists(&dir).await.unwrap_or(false);
        if !had_record && !had_dir {
            return Ok(false);
        }

        // On failure the tombstone stays and reconcile retries the delete
        remove_dir_if_exists(&dir).await?;
        self.db.delete_content(id).await?;
        debug!(content_id = %id, "Removed cached content");
        Ok(true)
    }

    /// Create an empty directory for a fetch of `id`, clearing any leftovers
    pub async fn prepare_dir(&self, id: ContentId) -> Result<PathBuf> {
        let dir = self.content_dir(id);
        remove_dir_if_exists(&dir).await?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(&dir, e))?;
        Ok(dir)
    }

    /// Delete a directory written by a failed fetch (no record was committed)
    pub async fn discard_dir(&self, id: ContentId) {
        let dir = self.content_dir(id);
        if let Err(e) = remove_dir_if_exists(&dir).await {
            warn!(content_id = %id, error = %e, "Failed to roll back partial fetch directory");
        }
    }

    /// Bring records and directories back in line after a restart
    ///
    /// - finishes interrupted removals (tombstones)
    /// - drops records whose directory is missing or has the wrong file count
    /// - deletes id directories that have no record
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let _guard = self.lock.lock().await;
        let mut report = ReconcileReport::default();

        for id in self.db.list_tombstones().await? {
            match self.remove_locked(id).await {
                Ok(_) => report.finished_tombstones += 1,
                Err(e) => warn!(content_id = %id, error = %e, "Failed to finish removal"),
            }
        }

        for row in self.db.list_content_by_access().await? {
            let id = row.id;
            if self.validate_dir(&self.content_dir(id), &row).await?.is_none() {
                match self.remove_locked(id).await {
                    Ok(_) => report.dropped_records += 1,
                    Err(e) => warn!(content_id = %id, error = %e, "Failed to drop stale record"),
                }
            }
        }

        let known: HashSet<ContentId> = self.db.list_content_ids().await?.into_iter().collect();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::storage(&self.root, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(&self.root, e))?
        {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
                .map(ContentId)
            else {
                continue;
            };
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || known.contains(&id) {
                continue;
            }
            match remove_dir_if_exists(&entry.path()).await {
                Ok(()) => report.removed_orphans += 1,
                Err(e) => warn!(content_id = %id, error = %e, "Failed to remove orphaned directory"),
            }
        }

        info!(
            finished_tombstones = report.finished_tombstones,
            dropped_records = report.dropped_records,
            removed_orphans = report.removed_orphans,
            "Cache reconciled"
        );
        Ok(report)
    }

    /// Files of `dir` if it matches `row`, `None` if missing or incomplete
    async fn validate_dir(&self, dir: &Path, row: &ContentRow) -> Result<Option<Vec<PathBuf>>> {
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            return Ok(None);
        }
        let files = list_content_files(dir).await?;
        if files.is_empty() || files.len() as i64 != row.file_count {
            return Ok(None);
        }
        Ok(Some(files))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (CacheStore, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = Database::new(&temp_dir.path().join("cache.db")).await.unwrap();
        let store = CacheStore::open(Arc::new(db), temp_dir.path().join("download"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    async fn write_content(store: &CacheStore, id: ContentId, pages: usize) -> NewContent {
        let dir = store.prepare_dir(id).await.unwrap();
        for i in 1..=pages {
            std::fs::write(dir.join(format!("{:05}.jpg", i)), vec![0u8; 10]).unwrap();
        }
        NewContent {
            display_name: format!("album {id}"),
            file_count: pages as u32,
            size_bytes: pages as u64 * 10,
        }
    }

    #[tokio::test]
    async fn record_then_hit_returns_ordered_files() {
        let (store, _temp) = setup().await;
        let id = ContentId(123);
        let meta = write_content(&store, id, 12).await;

        assert!(!store.is_cached(ContentId(999)).await.unwrap());
        store.record(id, &meta).await.unwrap();

        let (record, files) = store.cached_files(id).await.unwrap().unwrap();
        assert_eq!(record.file_count, 12);
        assert_eq!(files.len(), 12);
        assert!(files[0].ends_with("00001.jpg"));
        assert!(files[11].ends_with("00012.jpg"));
        assert_eq!(store.total_size().await.unwrap(), 120);
    }

    #[tokio::test]
    async fn hits_strictly_increase_access_time() {
        let (store, _temp) = setup().await;
        let id = ContentId(1);
        let meta = write_content(&store, id, 2).await;
        let committed = store.record(id, &meta).await.unwrap();

        let mut last = committed.access_time;
        for _ in 0..5 {
            let (record, _) = store.cached_files(id).await.unwrap().unwrap();
            assert!(record.access_time > last);
            last = record.access_time;
        }
        // get() does not touch
        assert_eq!(store.get(id).await.unwrap().unwrap().access_time, last);
    }

    #[tokio::test]
    async fn directory_without_record_is_not_a_hit() {
        let (store, _temp) = setup().await;
        write_content(&store, ContentId(5), 3).await;
        assert!(!store.is_cached(ContentId(5)).await.unwrap());
    }

    #[tokio::test]
    async fn record_with_missing_files_is_discarded() {
        let (store, _temp) = setup().await;
        let id = ContentId(8);
        let meta = write_content(&store, id, 3).await;
        store.record(id, &meta).await.unwrap();

        std::fs::remove_file(store.content_dir(id).join("00002.jpg")).unwrap();

        assert!(!store.is_cached(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
        assert!(!store.content_dir(id).exists());
    }

    #[tokio::test]
    async fn remove_deletes_directory_and_record() {
        let (store, _temp) = setup().await;
        let id = ContentId(9);
        let meta = write_content(&store, id, 2).await;
        store.record(id, &meta).await.unwrap();

        assert!(store.remove(id).await.unwrap());
        assert!(!store.content_dir(id).exists());
        assert!(store.get(id).await.unwrap().is_none());
        assert_eq!(store.total_size().await.unwrap(), 0);
        assert!(!store.remove(id).await.unwrap());
    }

    #[tokio::test]
    async fn reconcile_finishes_tombstones_and_removes_orphans() {
        let (store, _temp) = setup().await;

        // Interrupted removal: tombstone with directory still on disk
        let a = ContentId(1);
        let meta = write_content(&store, a, 2).await;
        store.record(a, &meta).await.unwrap();
        store.db.mark_tombstone(a).await.unwrap();

        // Record whose directory vanished
        let b = ContentId(2);
        let meta = write_content(&store, b, 2).await;
        store.record(b, &meta).await.unwrap();
        std::fs::remove_dir_all(store.content_dir(b)).unwrap();

        // Directory from a crashed fetch, never recorded
        write_content(&store, ContentId(3), 2).await;

        // Healthy entry and an unrelated directory
        let d = ContentId(4);
        let meta = write_content(&store, d, 2).await;
        store.record(d, &meta).await.unwrap();
        std::fs::create_dir(store.root().join("not-an-id")).unwrap();

        let report = store.reconcile().await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                finished_tombstones: 1,
                dropped_records: 1,
                removed_orphans: 1,
            }
        );
        assert!(!store.content_dir(a).exists());
        assert!(!store.content_dir(ContentId(3)).exists());
        assert!(store.is_cached(d).await.unwrap());
        assert!(store.root().join("not-an-id").exists());
        assert_eq!(store.db.list_content_ids().await.unwrap(), vec![d]);
    }
}
