pub mod config;
pub mod pool;
pub mod sqlite;

use crate::core::{DbError, DriverResult, Result};
use config::ConnectionConfig;
use std::sync::Arc;

/// Physical database connection handle
///
/// JDBC-shaped: auto-commit is on by default, turning it off opens an
/// implicit transaction that `commit`/`rollback` end (and re-open while
/// auto-commit stays off).
pub trait Connection: Send {
    /// Execute one statement, returning the affected row count
    fn execute(&mut self, sql: &str) -> DriverResult<usize>;

    fn auto_commit(&self) -> bool;

    /// Switching auto-commit back on commits any pending work.
    fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()>;

    fn commit(&mut self) -> DriverResult<()>;

    fn rollback(&mut self) -> DriverResult<()>;

    fn is_closed(&self) -> bool;

    /// Close the handle (for pooled drivers: hand it back to the driver's pool)
    fn close(&mut self) -> DriverResult<()>;
}

/// Underlying pooling mechanism
///
/// Thread safety of connection hand-out lives here, not in the session.
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a live connection
    fn connect(&self) -> DriverResult<Box<dyn Connection>>;

    /// Connections parked inside the driver's own pool
    fn idle_count(&self) -> usize;
}

type DriverFactory = fn(&ConnectionConfig) -> Result<Arc<dyn Driver>>;

/// Driver identity -> constructor
const DRIVERS: &[(&str, DriverFactory)] = &[
    ("sqlite", sqlite::open_driver),
    ("memory", crate::testing::open_driver),
];

/// Names accepted as `driver` in the configuration
pub fn driver_names() -> impl Iterator<Item = &'static str> {
    DRIVERS.iter().map(|(name, _)| *name)
}

/// Resolve and open the driver named by `config.driver`
pub fn open_driver(config: &ConnectionConfig) -> Result<Arc<dyn Driver>> {
    let factory = DRIVERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&config.driver))
        .map(|(_, factory)| *factory)
        .ok_or_else(|| DbError::UnknownDriver(config.driver.clone()))?;

    factory(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_table_lists_builtin_drivers() {
        let names: Vec<_> = driver_names().collect();
        assert_eq!(names, vec!["sqlite", "memory"]);
    }

    #[test]
    fn test_unknown_driver() {
        let config = ConnectionConfig::new("oracle", "thin:@db");
        assert!(matches!(
            open_driver(&config),
            Err(DbError::UnknownDriver(name)) if name == "oracle"
        ));
    }

    #[test]
    fn test_driver_lookup_ignores_case() {
        let config = ConnectionConfig::new("MEMORY", "scripted");
        let driver = open_driver(&config).unwrap();
        assert_eq!(driver.name(), "memory");
    }
}
