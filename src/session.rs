use crate::connection::{
    Connection,
    config::ConnectionConfig,
    pool::{ConnectionPool, PoolGuard},
};
use crate::core::{DbError, DriverError, Result, TxStateError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where a session's connection comes from
enum Ownership<'a> {
    /// Acquired lazily from the pool and released when a transaction ends
    Pooled {
        pool: Arc<ConnectionPool>,
        connection: Option<PoolGuard>,
    },
    /// Owned by an outer coordinator; never opened or closed here
    Borrowed(&'a mut dyn Connection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    ConnectedIdle,
    InTransaction,
}

#[derive(Debug, Clone, Copy)]
enum TxEnd {
    Commit,
    Rollback,
}

impl TxEnd {
    fn op(self) -> &'static str {
        match self {
            TxEnd::Commit => "commitTx",
            TxEnd::Rollback => "rollbackTx",
        }
    }
}

/// Database session
///
/// Holds at most one connection and a single-level transaction flag. Meant
/// for one unit of work at a time; it carries no locking of its own.
///
/// # Examples
///
/// ```
/// use txsession::{ConnectionConfig, Session};
///
/// # fn main() -> txsession::Result<()> {
/// let mut session = Session::open(ConnectionConfig::default())?;
/// session.execute("CREATE TABLE users (id INTEGER, name TEXT)")?;
///
/// session.begin_tx()?;
/// session.execute("INSERT INTO users VALUES (1, 'Alice')")?;
/// session.commit_tx()?;
///
/// assert!(!session.is_in_transaction());
/// # Ok(())
/// # }
/// ```
pub struct Session<'a> {
    ownership: Ownership<'a>,
    in_transaction: bool,
}

impl Session<'static> {
    /// Session drawing connections from a shared pool
    pub fn pooled(pool: Arc<ConnectionPool>) -> Self {
        Self {
            ownership: Ownership::Pooled {
                pool,
                connection: None,
            },
            in_transaction: false,
        }
    }

    /// Build a pool from `config` and open a session on it
    pub fn open(config: ConnectionConfig) -> Result<Self> {
        let pool = ConnectionPool::new(config)?;
        Ok(Self::pooled(Arc::new(pool)))
    }
}

impl<'a> Session<'a> {
    /// Pass-through session over a caller-managed connection
    pub fn borrowed(connection: &'a mut dyn Connection) -> Self {
        Self {
            ownership: Ownership::Borrowed(connection),
            in_transaction: false,
        }
    }

    /// The pool behind this session, if any
    pub fn pool(&self) -> Option<&Arc<ConnectionPool>> {
        match &self.ownership {
            Ownership::Pooled { pool, .. } => Some(pool),
            Ownership::Borrowed(_) => None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.in_transaction {
            return SessionState::InTransaction;
        }
        match &self.ownership {
            Ownership::Pooled {
                connection: None, ..
            } => SessionState::Disconnected,
            _ => SessionState::ConnectedIdle,
        }
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Open the connection (if not already)
    ///
    /// A held connection that the driver reports closed is released and
    /// replaced; any transaction it carried is lost.
    pub fn get_connection(&mut self) -> Result<&mut dyn Connection> {
        match &mut self.ownership {
            Ownership::Borrowed(connection) => Ok(&mut **connection),
            Ownership::Pooled { pool, connection } => {
                if connection.as_ref().is_some_and(|c| c.is_closed()) {
                    if self.in_transaction {
                        warn!("connection invalidated during an active transaction");
                        self.in_transaction = false;
                    }
                    if let Some(stale) = connection.take() {
                        if let Err(e) = pool.release(stale) {
                            error!("{}", e);
                        }
                    }
                }

                if connection.is_none() {
                    let mut fresh = pool.acquire()?;
                    // restore default
                    if let Err(e) = fresh.set_auto_commit(true) {
                        error!("Cannot open connection: {}", e);
                        if let Err(release) = pool.release(fresh) {
                            error!("{}", release);
                        }
                        return Err(DbError::Acquisition(e.to_string()));
                    }
                    *connection = Some(fresh);
                }

                match connection.as_deref_mut() {
                    Some(held) => Ok(held),
                    None => Err(DbError::Acquisition("no connection held".into())),
                }
            }
        }
    }

    /// Execute one statement on the session's connection
    pub fn execute(&mut self, sql: &str) -> Result<usize> {
        let connection = self.get_connection()?;
        Ok(connection.execute(sql)?)
    }

    pub fn begin_tx(&mut self) -> Result<()> {
        if self.in_transaction {
            error!("BeginTx failed: transaction already begun");
            return Err(DbError::tx_state("beginTx", TxStateError::AlreadyActive));
        }

        let connection = self.get_connection()?;
        connection.set_auto_commit(false).map_err(|e| {
            error!("beginTx failed: {}", e);
            DbError::Begin(e)
        })?;

        self.in_transaction = true;
        debug!("begin transaction");
        Ok(())
    }

    /// Commit the active transaction
    ///
    /// The connection goes back to the pool afterwards whether or not the
    /// commit succeeded; a failed release is logged and never replaces the
    /// commit outcome.
    pub fn commit_tx(&mut self) -> Result<()> {
        self.end_tx(TxEnd::Commit)
    }

    /// Roll back the active transaction, releasing the connection like
    /// [`Session::commit_tx`].
    pub fn rollback_tx(&mut self) -> Result<()> {
        self.end_tx(TxEnd::Rollback)
    }

    /// Run `body` inside a transaction
    ///
    /// Commits when `body` returns `Ok`, rolls back otherwise. The body's own
    /// error wins over a failing rollback, which is only logged.
    pub fn transaction<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.begin_tx()?;
        match body(self) {
            Ok(value) => {
                self.commit_tx()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback_tx() {
                    error!("rollback after failed transaction body: {}", rollback);
                }
                Err(e)
            }
        }
    }

    /// Release the connection
    ///
    /// Safe to call repeatedly. An open transaction is rolled back. A
    /// borrowed connection is left untouched.
    pub fn close(&mut self) {
        if let Ownership::Borrowed(_) = self.ownership {
            return;
        }
        if self.in_transaction {
            warn!("closing session with an active transaction, rolling back");
            self.in_transaction = false;
        }
        self.release_connection();
    }

    fn end_tx(&mut self, end: TxEnd) -> Result<()> {
        if !self.in_transaction {
            error!("{} failed: no active transaction", end.op());
            return Err(DbError::tx_state(end.op(), TxStateError::NoActiveTransaction));
        }

        let outcome = self.finish(end);
        self.in_transaction = false;
        self.release_connection();
        outcome
    }

    fn finish(&mut self, end: TxEnd) -> Result<()> {
        let Some(connection) = self.held_connection() else {
            return Err(wrap(end, DriverError::Closed));
        };

        let result = match end {
            TxEnd::Commit => connection.commit(),
            TxEnd::Rollback => connection.rollback(),
        }
        .and_then(|_| connection.set_auto_commit(true));

        match result {
            Ok(()) => {
                match end {
                    TxEnd::Commit => info!("committed transaction"),
                    TxEnd::Rollback => info!("rolled back transaction"),
                }
                Ok(())
            }
            Err(e) => {
                error!("{} failed: {}", end.op(), e);
                Err(wrap(end, e))
            }
        }
    }

    fn held_connection(&mut self) -> Option<&mut dyn Connection> {
        match &mut self.ownership {
            Ownership::Borrowed(connection) => Some(&mut **connection),
            Ownership::Pooled { connection, .. } => match connection.as_deref_mut() {
                Some(held) if !held.is_closed() => Some(held),
                _ => None,
            },
        }
    }

    /// Close the connection back to the pool (if not in transaction)
    fn release_connection(&mut self) {
        if self.in_transaction {
            debug!("Didn't close connection: transaction active");
            return;
        }
        if let Ownership::Pooled { pool, connection } = &mut self.ownership {
            if let Some(held) = connection.take() {
                if let Err(e) = pool.release(held) {
                    error!("{}", e);
                }
            }
        }
    }
}

fn wrap(end: TxEnd, e: DriverError) -> DbError {
    match end {
        TxEnd::Commit => DbError::Commit(e),
        TxEnd::Rollback => DbError::Rollback(e),
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
