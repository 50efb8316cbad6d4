//! SQLite driver backed by an r2d2 pool.

use super::{Connection, Driver, config::ConnectionConfig};
use crate::core::{DbError, DriverError, DriverResult, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(1);

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteDriver {
    pool: Pool<SqliteConnectionManager>,
}

/// Build the r2d2 pool for `config.uri`
///
/// `:memory:` maps to a named shared-cache database so every pooled
/// connection sees the same schema; one idle connection is pinned to keep it
/// alive.
pub fn open_driver(config: &ConnectionConfig) -> Result<Arc<dyn Driver>> {
    if !config.username.is_empty() || !config.password.is_empty() {
        warn!("sqlite driver ignores credentials (username {:?})", config.username);
    }

    let max_size = pool_size(config.max_active, "max_active")?;
    let in_memory = matches!(config.uri.as_str(), ":memory:" | "file::memory:");

    let target = if in_memory {
        let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::SeqCst);
        format!(
            "file:txsession_{}_{}?mode=memory&cache=shared",
            std::process::id(),
            seq
        )
    } else {
        config.uri.clone()
    };
    let manager = SqliteConnectionManager::file(target).with_init(|c| c.busy_timeout(BUSY_TIMEOUT));

    let mut builder = Pool::builder()
        .max_size(max_size)
        .connection_timeout(config.connect_timeout);
    builder = if in_memory {
        let min_idle = pool_size(config.min_idle.max(1), "min_idle")?;
        builder.min_idle(Some(min_idle)).idle_timeout(None)
    } else {
        builder.min_idle(Some(pool_size(config.min_idle, "min_idle")?))
    };

    let pool = builder
        .build(manager)
        .map_err(|e| DbError::Acquisition(e.to_string()))?;

    Ok(Arc::new(SqliteDriver { pool }))
}

fn pool_size(value: usize, field: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| DbError::Config(format!("{} {} does not fit the sqlite pool", field, value)))
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(&self) -> DriverResult<Box<dyn Connection>> {
        let inner = self.pool.get()?;
        Ok(Box::new(SqliteConnection {
            inner: Some(inner),
            auto_commit: true,
        }))
    }

    fn idle_count(&self) -> usize {
        self.pool.state().idle_connections as usize
    }
}

/// Pooled rusqlite connection with emulated auto-commit switching
pub struct SqliteConnection {
    inner: Option<PooledConnection<SqliteConnectionManager>>,
    auto_commit: bool,
}

impl SqliteConnection {
    fn conn(&self) -> DriverResult<&rusqlite::Connection> {
        self.inner.as_deref().ok_or(DriverError::Closed)
    }

    /// Run `end` if a transaction is open, then re-open one
    fn end_and_reopen(&mut self, end: &str) -> DriverResult<()> {
        if self.auto_commit {
            return Ok(());
        }
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch(end)?;
        }
        conn.execute_batch("BEGIN")?;
        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> DriverResult<usize> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        if stmt.column_count() > 0 {
            let mut rows = stmt.query([])?;
            let mut count = 0;
            while rows.next()?.is_some() {
                count += 1;
            }
            Ok(count)
        } else {
            Ok(stmt.execute([])?)
        }
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()> {
        if enabled == self.auto_commit {
            return Ok(());
        }
        let conn = self.conn()?;
        if enabled {
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")?;
            }
        } else {
            conn.execute_batch("BEGIN")?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.end_and_reopen("COMMIT")
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.end_and_reopen("ROLLBACK")
    }

    fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn close(&mut self) -> DriverResult<()> {
        // Dropping the pooled handle returns it to r2d2; never park it mid-transaction.
        let Some(inner) = self.inner.take() else {
            return Ok(());
        };
        self.auto_commit = true;
        if !inner.is_autocommit() {
            inner.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}
