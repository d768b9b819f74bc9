//! Database connection pool management.
//!
//! Connection pooling for SQLite using r2d2, same as the teacher: pool
//! init, connection customization (foreign keys on), and running
//! migrations before handing back the pool.

use dtg_common::{Error, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

fn build_pool(manager: SqliteConnectionManager) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::db_failure(format!("failed to create connection pool: {e}")))?;

    let conn = pool
        .get()
        .map_err(|e| Error::db_failure(format!("failed to get connection for migrations: {e}")))?;

    migrations::run_migrations(&conn)
        .map_err(|e| Error::db_failure(format!("failed to run migrations: {e}")))?;

    Ok(pool)
}

/// Initialize a new database pool backed by the file at `db_path`.
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    build_pool(manager)
}

/// Initialize an in-memory database pool, used by tests.
pub fn init_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    build_pool(manager)
}

/// Get a connection from the pool, converting the r2d2 error into `Error`.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::db_failure(format!("failed to get connection from pool: {e}")))
}
