//! Repository for the `board_object_locks` table.

use jollyboard_core::locks::LockEntry;
use jollyboard_core::types::EpochMillis;
use sqlx::PgPool;

use crate::models::board_lock::BoardLockRow;

/// Column list for `board_object_locks` queries.
const COLUMNS: &str = "board_id, object_id, user_id, user_name, last_active, created_at";

/// Provides CRUD operations for exclusive board object locks.
///
/// The `(board_id, object_id)` primary key is what serializes competing
/// acquisitions: a plain `INSERT` fails with SQLSTATE 23505 for the loser.
pub struct BoardLockRepo;

impl BoardLockRepo {
    /// List every lock on a board, oldest first.
    pub async fn list_by_board(
        pool: &PgPool,
        board_id: &str,
    ) -> Result<Vec<BoardLockRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM board_object_locks \
             WHERE board_id = $1 ORDER BY created_at, object_id"
        );
        sqlx::query_as::<_, BoardLockRow>(&query)
            .bind(board_id)
            .fetch_all(pool)
            .await
    }

    /// List the locks on a board restricted to `object_ids`.
    pub async fn list_by_ids(
        pool: &PgPool,
        board_id: &str,
        object_ids: &[String],
    ) -> Result<Vec<BoardLockRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM board_object_locks \
             WHERE board_id = $1 AND object_id = ANY($2) ORDER BY created_at, object_id"
        );
        sqlx::query_as::<_, BoardLockRow>(&query)
            .bind(board_id)
            .bind(object_ids)
            .fetch_all(pool)
            .await
    }

    /// Insert a single lock row. Fails on conflict.
    pub async fn insert(
        pool: &PgPool,
        board_id: &str,
        entry: &LockEntry,
    ) -> Result<BoardLockRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO board_object_locks (board_id, object_id, user_id, user_name, last_active) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BoardLockRow>(&query)
            .bind(board_id)
            .bind(&entry.object_id)
            .bind(&entry.user_id)
            .bind(&entry.user_name)
            .bind(entry.last_active)
            .fetch_one(pool)
            .await
    }

    /// Insert many lock rows in a single statement.
    ///
    /// The statement is atomic: one conflicting row aborts the whole insert.
    pub async fn insert_many(
        pool: &PgPool,
        board_id: &str,
        entries: &[LockEntry],
    ) -> Result<u64, sqlx::Error> {
        let object_ids: Vec<&str> = entries.iter().map(|e| e.object_id.as_str()).collect();
        let user_ids: Vec<&str> = entries.iter().map(|e| e.user_id.as_str()).collect();
        let user_names: Vec<&str> = entries.iter().map(|e| e.user_name.as_str()).collect();
        let last_actives: Vec<i64> = entries.iter().map(|e| e.last_active).collect();

        let result = sqlx::query(
            "INSERT INTO board_object_locks (board_id, object_id, user_id, user_name, last_active) \
             SELECT $1, t.object_id, t.user_id, t.user_name, t.last_active \
             FROM UNNEST($2::text[], $3::text[], $4::text[], $5::bigint[]) \
                  AS t(object_id, user_id, user_name, last_active)",
        )
        .bind(board_id)
        .bind(&object_ids)
        .bind(&user_ids)
        .bind(&user_names)
        .bind(&last_actives)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Refresh `last_active` on a lock. Only the holder can refresh.
    ///
    /// Returns `true` if a row owned by `user_id` was updated.
    pub async fn touch(
        pool: &PgPool,
        board_id: &str,
        object_id: &str,
        user_id: &str,
        last_active: EpochMillis,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE board_object_locks SET last_active = $4 \
             WHERE board_id = $1 AND object_id = $2 AND user_id = $3",
        )
        .bind(board_id)
        .bind(object_id)
        .bind(user_id)
        .bind(last_active)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Refresh `last_active` on every lock in `object_ids` held by `user_id`.
    pub async fn touch_many(
        pool: &PgPool,
        board_id: &str,
        object_ids: &[String],
        user_id: &str,
        last_active: EpochMillis,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE board_object_locks SET last_active = $4 \
             WHERE board_id = $1 AND object_id = ANY($2) AND user_id = $3",
        )
        .bind(board_id)
        .bind(object_ids)
        .bind(user_id)
        .bind(last_active)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Release a lock. Only the holder can release.
    ///
    /// Returns `true` if a row was deleted.
    pub async fn release(
        pool: &PgPool,
        board_id: &str,
        object_id: &str,
        user_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM board_object_locks \
             WHERE board_id = $1 AND object_id = $2 AND user_id = $3",
        )
        .bind(board_id)
        .bind(object_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release every lock in `object_ids` held by `user_id`.
    pub async fn release_many(
        pool: &PgPool,
        board_id: &str,
        object_ids: &[String],
        user_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM board_object_locks \
             WHERE board_id = $1 AND object_id = ANY($2) AND user_id = $3",
        )
        .bind(board_id)
        .bind(object_ids)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete every lock whose `last_active` is older than `cutoff`.
    ///
    /// Returns the deleted rows so callers can announce the releases.
    pub async fn delete_stale(
        pool: &PgPool,
        cutoff: EpochMillis,
    ) -> Result<Vec<BoardLockRow>, sqlx::Error> {
        let query = format!(
            "DELETE FROM board_object_locks WHERE last_active < $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BoardLockRow>(&query)
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }
}
