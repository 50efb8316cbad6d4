use super::{Connection, Driver, config::ConnectionConfig, open_driver};
use crate::core::{DbError, DriverResult, Result};
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Connection source
///
/// Shared process-wide by every session. Hands out driver connections and
/// keeps the outstanding count that bounds them by `max_active`; the
/// driver underneath is responsible for its own thread safety.
pub struct ConnectionPool {
    /// Pool configuration
    config: ConnectionConfig,
    /// Underlying pooling mechanism
    driver: Arc<dyn Driver>,
    /// Connections currently handed out, shared with every `PoolGuard`
    outstanding: Arc<AtomicUsize>,
}

impl ConnectionPool {
    /// Create a pool using the driver named in the configuration
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let driver = open_driver(&config)?;
        Self::with_driver(config, driver)
    }

    /// Create a pool over an already constructed driver
    pub fn with_driver(config: ConnectionConfig, driver: Arc<dyn Driver>) -> Result<Self> {
        config.validate()?;

        if config.file_path.is_none() {
            warn!("ConnectionPool: file_path is missing");
        }
        debug!("ConnectionPool({}) created", config.redacted());

        Ok(Self {
            config,
            driver,
            outstanding: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get a live connection
    ///
    /// Waits up to `connect_timeout` for an outstanding slot to free up. The
    /// slot is held by the returned guard until it is released or dropped.
    pub fn acquire(&self) -> Result<PoolGuard> {
        self.reserve_slot()?;

        match self.driver.connect() {
            Ok(connection) => {
                debug!(
                    "opened database connection, count in pool: {}/{}",
                    self.outstanding_count(),
                    self.capacity()
                );
                Ok(PoolGuard {
                    connection,
                    outstanding: Arc::clone(&self.outstanding),
                    returned: false,
                })
            }
            Err(e) => {
                free_slot(&self.outstanding);
                error!("Cannot open connection: {}", e);
                Err(DbError::Acquisition(e.to_string()))
            }
        }
    }

    /// Return a connection
    ///
    /// Uncommitted work is rolled back and auto-commit restored before the
    /// connection is closed. The slot is freed even when any of that fails;
    /// the failure comes back as `DbError::Release` for the caller to log.
    pub fn release(&self, mut guard: PoolGuard) -> Result<()> {
        let result = guard.give_back();

        debug!(
            "closed connection back to pool, count in pool: {}/{}",
            self.outstanding_count(),
            self.capacity()
        );

        result.map_err(DbError::Release)
    }

    /// Connections currently handed out
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Configured `max_active`
    pub fn capacity(&self) -> usize {
        self.config.max_active
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            driver: self.driver.name().to_string(),
            outstanding: self.outstanding_count(),
            capacity: self.capacity(),
            idle: self.driver.idle_count(),
        }
    }

    fn reserve_slot(&self) -> Result<()> {
        let start = Instant::now();
        let capacity = self.capacity();

        loop {
            let observed = match self
                .outstanding
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < capacity).then_some(n + 1)
                }) {
                Ok(_) => return Ok(()),
                Err(current) => current,
            };

            if start.elapsed() >= self.config.connect_timeout {
                error!(
                    "Cannot open connection: pool exhausted ({}/{})",
                    observed, capacity
                );
                return Err(DbError::Acquisition(format!(
                    "pool exhausted: {} outstanding, capacity {}, waited {:?}",
                    observed, capacity, self.config.connect_timeout
                )));
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn free_slot(outstanding: &AtomicUsize) {
    // Never below zero, even on a double release.
    let _ = outstanding.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
}

fn reset_and_close(connection: &mut dyn Connection) -> DriverResult<()> {
    if connection.is_closed() {
        return Ok(());
    }

    let reset = if connection.auto_commit() {
        Ok(())
    } else {
        connection
            .rollback()
            .and_then(|_| connection.set_auto_commit(true))
    };
    let closed = connection.close();

    reset.and(closed)
}

/// RAII guard for a pooled connection
///
/// Holds one outstanding slot. Dropping it without `ConnectionPool::release`
/// still rolls back, closes and frees the slot; failures there are logged.
pub struct PoolGuard {
    connection: Box<dyn Connection>,
    outstanding: Arc<AtomicUsize>,
    returned: bool,
}

impl PoolGuard {
    fn give_back(&mut self) -> DriverResult<()> {
        if self.returned {
            return Ok(());
        }
        self.returned = true;
        let result = reset_and_close(self.connection.as_mut());
        free_slot(&self.outstanding);
        result
    }
}

impl Deref for PoolGuard {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl DerefMut for PoolGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut()
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if self.returned {
            return;
        }
        warn!("PoolGuard dropped without release, returning connection");
        if let Err(e) = self.give_back() {
            error!("Cannot close connection: {}", e);
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub driver: String,
    pub outstanding: usize,
    pub capacity: usize,
    pub idle: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats ({}): {}/{} outstanding, {} idle",
            self.driver, self.outstanding, self.capacity, self.idle
        )
    }
}
