pub mod error;

pub use error::{DbError, DriverError, DriverResult, Result, TxStateError};
