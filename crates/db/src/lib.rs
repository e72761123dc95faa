//! Postgres persistence for board object locks.
//!
//! - [`repositories::BoardLockRepo`]: raw queries against `board_object_locks`.
//! - [`PgLockStore`]: the [`LockStore`](jollyboard_core::store::LockStore)
//!   implementation used by the server.
//! - [`LockChangeFeed`]: LISTEN/NOTIFY change notifications, fanned out per board.

use sqlx::postgres::PgPoolOptions;

pub mod change_feed;
pub mod models;
pub mod repositories;
pub mod store;

pub use change_feed::LockChangeFeed;
pub use store::PgLockStore;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
