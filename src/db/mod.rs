mod from_row;
mod schema;
pub mod queries;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::{init_audit_db, init_db};

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::engine::LicenseEngine;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Concurrent writers wait this long for the SQLite write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Owns both database pools (licenses and the separate audit file)
    pub engine: LicenseEngine,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
    Pool::builder().max_size(10).build(manager)
}

/// In-memory pool. Every SQLite memory connection is a separate database, so
/// the pool holds exactly one connection.
pub fn create_memory_pool() -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::memory();
    Pool::builder().max_size(1).build(manager)
}
