// ============================================================================
// txsession Library
// ============================================================================

pub mod core;
pub mod connection;
pub mod session;
pub mod bootstrap;
pub mod dispatch;
pub mod testing;

// Re-export main types for convenience
pub use crate::core::{DbError, DriverError, Result, TxStateError};
pub use session::{Session, SessionState};

// Re-export connection API
pub use connection::{
    Connection,
    Driver,
    pool::{ConnectionPool, PoolGuard, PoolStats},
    config::ConnectionConfig,
};
