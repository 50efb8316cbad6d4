use thiserror::Error;

/// Protocol misuse of a session's transaction calls.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStateError {
    #[error("transaction already begun")]
    AlreadyActive,

    #[error("no active transaction")]
    NoActiveTransaction,
}

/// Failure reported by a driver connection or the pool underneath it.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Pool(#[from] r2d2::Error),

    #[error("connection is closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Cannot open connection: {0}")]
    Acquisition(String),

    #[error("{op} failed: {kind}")]
    TransactionState { op: &'static str, kind: TxStateError },

    #[error("beginTx failed: {0}")]
    Begin(#[source] DriverError),

    #[error("commitTx failed: {0}")]
    Commit(#[source] DriverError),

    #[error("rollbackTx failed: {0}")]
    Rollback(#[source] DriverError),

    #[error("Cannot close connection: {0}")]
    Release(#[source] DriverError),

    #[error("Statement {index} failed ({statement}): {source}")]
    SqlExecution {
        index: usize,
        statement: String,
        #[source]
        source: DriverError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown driver '{0}'")]
    UnknownDriver(String),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Action '{0}' registered twice")]
    DuplicateAction(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub(crate) fn tx_state(op: &'static str, kind: TxStateError) -> Self {
        Self::TransactionState { op, kind }
    }

    /// True for protocol misuse (`beginTx` twice, commit without a transaction).
    pub fn is_transaction_state(&self) -> bool {
        matches!(self, Self::TransactionState { .. })
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_state_message() {
        let err = DbError::tx_state("commitTx", TxStateError::NoActiveTransaction);
        assert_eq!(err.to_string(), "commitTx failed: no active transaction");
        assert!(err.is_transaction_state());
    }

    #[test]
    fn test_sql_execution_keeps_source() {
        use std::error::Error as _;

        let err = DbError::SqlExecution {
            index: 3,
            statement: "CREATE TABLE x (a INT);".into(),
            source: DriverError::Other("syntax error".into()),
        };
        assert!(err.to_string().starts_with("Statement 3 failed"));
        assert_eq!(err.source().map(|s| s.to_string()), Some("syntax error".into()));
    }
}
