//! Cache record CRUD, access tracking and tombstones.

use crate::types::{ContentId, NewContent};
use crate::{Error, Result};

use super::{ContentRow, Database, record_state};

impl Database {
    /// Insert or replace the record for `id` as ready, stamped with `now_ms`
    ///
    /// Both `fetch_time` and `access_time` are set to `now_ms`.
    pub async fn upsert_content(&self, id: ContentId, meta: &NewContent, now_ms: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content (
                id, display_name, fetch_time, access_time, file_count, size_bytes, state
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                fetch_time = excluded.fetch_time,
                access_time = excluded.access_time,
                file_count = excluded.file_count,
                size_bytes = excluded.size_bytes,
                state = excluded.state
            "#,
        )
        .bind(id)
        .bind(&meta.display_name)
        .bind(now_ms)
        .bind(now_ms)
        .bind(i64::from(meta.file_count))
        .bind(i64::try_from(meta.size_bytes).unwrap_or(i64::MAX))
        .bind(record_state::READY)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Get the record for `id` in any state
    pub async fn get_content(&self, id: ContentId) -> Result<Option<ContentRow>> {
        let row = sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT id, display_name, fetch_time, access_time, file_count, size_bytes, state
            FROM content
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row)
    }

    /// Bump the access time of a ready record
    ///
    /// The new access time is `max(now_ms, previous + 1)` so that it strictly increases
    /// on every hit, even within one clock tick. Returns the new access time, or `None`
    /// if there is no ready record for `id`.
    pub async fn touch_content(&self, id: ContentId, now_ms: i64) -> Result<Option<i64>> {
        let access_time = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE content
            SET access_time = MAX(?, access_time + 1)
            WHERE id = ? AND state = ?
            RETURNING access_time
            "#,
        )
        .bind(now_ms)
        .bind(id)
        .bind(record_state::READY)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(access_time)
    }

    /// Total size of all records, including tombstones whose directories may still exist
    pub async fn total_content_size(&self) -> Result<u64> {
        let total =
            sqlx::query_scalar::<_, i64>("SELECT COALESCE(SUM(size_bytes), 0) FROM content")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?;

        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Ready records ordered by access time (least recently used first)
    pub async fn list_content_by_access(&self) -> Result<Vec<ContentRow>> {
        let rows = sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT id, display_name, fetch_time, access_time, file_count, size_bytes, state
            FROM content
            WHERE state = ?
            ORDER BY access_time ASC, id ASC
            "#,
        )
        .bind(record_state::READY)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows)
    }

    /// Ids of every record, whatever its state
    pub async fn list_content_ids(&self) -> Result<Vec<ContentId>> {
        let ids = sqlx::query_scalar::<_, ContentId>("SELECT id FROM content ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(ids)
    }

    /// Ids of records whose removal was interrupted
    pub async fn list_tombstones(&self) -> Result<Vec<ContentId>> {
        let ids =
            sqlx::query_scalar::<_, ContentId>("SELECT id FROM content WHERE state = ? ORDER BY id")
                .bind(record_state::TOMBSTONE)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Sqlx)?;

        Ok(ids)
    }

    /// Mark a record as being removed; it stops being served immediately
    ///
    /// Returns false if there is no record for `id`.
    pub async fn mark_tombstone(&self, id: ContentId) -> Result<bool> {
        let result = sqlx::query("UPDATE content SET state = ? WHERE id = ?")
            .bind(record_state::TOMBSTONE)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the record for `id`
    ///
    /// Returns false if there was no record.
    pub async fn delete_content(&self, id: ContentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM content WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}
