use anyhow::{Context, Result};
use log::warn;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Duration;

use crate::config::StoreSettings;
use crate::errors::{ReviewError, ReviewResult};

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

pub fn create_pool(settings: &StoreSettings) -> Result<DbPool> {
    let manager = build_manager(&settings.database_path, settings.busy_timeout_ms);
    build_pool(manager, settings.pool_size)
}

fn build_manager(path: &str, busy_timeout_ms: u64) -> SqliteConnectionManager {
    SqliteConnectionManager::file(path).with_init(move |conn| {
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", true)
    })
}

fn build_pool(manager: SqliteConnectionManager, pool_size: u32) -> Result<DbPool> {
    r2d2::Pool::builder()
        .max_size(pool_size.max(1))
        .build(manager)
        .context("Failed to create database connection pool")
}

pub fn get_connection(pool: &DbPool) -> Result<DbConn> {
    pool.get()
        .context("Failed to get database connection from pool")
}

/// Run `work` inside a `BEGIN IMMEDIATE` transaction, retrying while the
/// database is busy or an optimistic version check fails.
///
/// The closure may run more than once; it must not have side effects outside
/// the transaction. After `max_attempts` transient failures the last one is
/// reported as `ConcurrentUpdateConflict`.
pub fn with_write_transaction<T, F>(
    conn: &mut Connection,
    settings: &StoreSettings,
    mut work: F,
) -> ReviewResult<T>
where
    F: FnMut(&Transaction<'_>) -> ReviewResult<T>,
{
    let max_attempts = settings.max_fold_attempts.max(1);
    let mut attempt = 1;

    loop {
        match run_once(conn, &mut work) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                warn!("Write transaction attempt {}/{} failed: {}", attempt, max_attempts, err);
                std::thread::sleep(Duration::from_millis(settings.retry_backoff_ms * u64::from(attempt)));
                attempt += 1;
            }
            Err(err) if err.is_transient() => {
                warn!("Giving up write transaction after {} attempts: {}", attempt, err);
                return Err(ReviewError::ConcurrentUpdateConflict { attempts: attempt });
            }
            Err(err) => return Err(err),
        }
    }
}

fn run_once<T, F>(conn: &mut Connection, work: &mut F) -> ReviewResult<T>
where
    F: FnMut(&Transaction<'_>) -> ReviewResult<T>,
{
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to begin write transaction")?;
    // Dropping `tx` on error rolls back everything the closure wrote
    let value = work(&tx)?;
    tx.commit().context("Failed to commit write transaction")?;
    Ok(value)
}
