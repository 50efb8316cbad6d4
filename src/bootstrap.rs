//! Schema bootstrap from a statement script.
//!
//! Statements are separated by `;`. There is no quoting support: a `;`
//! inside a string literal splits the statement.

use crate::connection::config::ConnectionConfig;
use crate::core::{DbError, Result};
use crate::session::Session;
use std::path::Path;
use tracing::{debug, error, info};

pub const TERMINATOR: char = ';';

/// Split script text into statements, each re-terminated with `;`.
/// Blank fragments are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    script
        .split(TERMINATOR)
        .filter(|fragment| !fragment.trim().is_empty())
        .map(|fragment| format!("{}{}", fragment, TERMINATOR))
        .collect()
}

/// Execute `script` statement by statement on the session's connection
///
/// Runs under whatever transaction state the session is in. The first
/// failing statement aborts the rest; statements already applied stay
/// applied. Returns the number of statements executed.
pub fn run_script(session: &mut Session<'_>, script: &str) -> Result<usize> {
    let statements = split_statements(script);
    let connection = session.get_connection()?;

    for (index, statement) in statements.iter().enumerate() {
        debug!("bootstrap statement {}: {}", index, statement.trim());
        if let Err(source) = connection.execute(statement) {
            error!("bootstrap statement {} failed: {}", index, source);
            return Err(DbError::SqlExecution {
                index,
                statement: statement.clone(),
                source,
            });
        }
    }

    info!("bootstrap script applied ({} statements)", statements.len());
    Ok(statements.len())
}

/// Read a UTF-8 script file and run it
pub fn run_script_file(session: &mut Session<'_>, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let script = std::fs::read_to_string(path).map_err(|e| {
        error!("cannot read bootstrap script {}: {}", path.display(), e);
        DbError::Io(e)
    })?;
    run_script(session, &script)
}

/// Create the schema from the configured bootstrap script
pub fn create_tables(session: &mut Session<'_>, config: &ConnectionConfig) -> Result<usize> {
    run_script_file(session, &config.bootstrap_script)
}

/// Schema migration is not provided
pub fn update_tables(_session: &mut Session<'_>) -> Result<()> {
    Err(DbError::Unsupported("update_tables".into()))
}
