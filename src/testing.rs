//! Scripted in-memory driver.
//!
//! Records every call made against its connections and can be told to fail
//! specific operations. Backs the `memory` driver identity and the test suite.

use crate::connection::{Connection, Driver, config::ConnectionConfig};
use crate::core::{DriverError, DriverResult, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One call observed by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Connect(u64),
    Execute(u64, String),
    SetAutoCommit(u64, bool),
    Commit(u64),
    Rollback(u64),
    Close(u64),
}

/// Operations to reject
#[derive(Debug, Clone, Default)]
pub struct Failures {
    pub connect: bool,
    pub commit: bool,
    pub rollback: bool,
    pub close: bool,
    pub set_auto_commit: bool,
    /// Reject statements containing this text
    pub statement: Option<String>,
}

#[derive(Default)]
struct Shared {
    calls: Vec<DriverCall>,
    failures: Failures,
    next_id: u64,
    live: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedDriver {
    shared: Arc<Mutex<Shared>>,
}

pub(crate) fn open_driver(_config: &ConnectionConfig) -> Result<Arc<dyn Driver>> {
    Ok(Arc::new(ScriptedDriver::new()))
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adjust the failure plan for subsequent calls
    pub fn inject(&self, f: impl FnOnce(&mut Failures)) {
        f(&mut self.lock().failures);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.lock().calls.clone()
    }

    /// Statements executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                DriverCall::Execute(_, sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Calls made against one connection id
    pub fn calls_for(&self, id: u64) -> Vec<DriverCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call_id(call) == id)
            .cloned()
            .collect()
    }

    /// Connections opened and not yet closed
    pub fn live_connections(&self) -> usize {
        self.lock().live
    }

    /// A connection outside any pool, for pass-through sessions
    pub fn standalone(&self) -> ScriptedConnection {
        self.open()
    }

    fn open(&self) -> ScriptedConnection {
        let mut shared = self.lock();
        shared.next_id += 1;
        shared.live += 1;
        let id = shared.next_id;
        shared.calls.push(DriverCall::Connect(id));
        ScriptedConnection {
            id,
            shared: Arc::clone(&self.shared),
            auto_commit: true,
            closed: false,
        }
    }
}

fn call_id(call: &DriverCall) -> u64 {
    match call {
        DriverCall::Connect(id)
        | DriverCall::Execute(id, _)
        | DriverCall::SetAutoCommit(id, _)
        | DriverCall::Commit(id)
        | DriverCall::Rollback(id)
        | DriverCall::Close(id) => *id,
    }
}

impl Driver for ScriptedDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn connect(&self) -> DriverResult<Box<dyn Connection>> {
        if self.lock().failures.connect {
            return Err(DriverError::Other("connection refused".into()));
        }
        Ok(Box::new(self.open()))
    }

    fn idle_count(&self) -> usize {
        0
    }
}

pub struct ScriptedConnection {
    id: u64,
    shared: Arc<Mutex<Shared>>,
    auto_commit: bool,
    closed: bool,
}

impl ScriptedConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Record `call`, failing with `reason` when `rejected` says so
    fn record(
        &self,
        call: DriverCall,
        rejected: impl FnOnce(&Failures) -> bool,
        reason: &str,
    ) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared.calls.push(call);
        if rejected(&shared.failures) {
            return Err(DriverError::Other(reason.to_string()));
        }
        Ok(())
    }
}

impl Connection for ScriptedConnection {
    fn execute(&mut self, sql: &str) -> DriverResult<usize> {
        self.record(
            DriverCall::Execute(self.id, sql.to_string()),
            |f| f.statement.as_deref().is_some_and(|bad| sql.contains(bad)),
            "statement rejected",
        )?;
        Ok(0)
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()> {
        self.record(
            DriverCall::SetAutoCommit(self.id, enabled),
            |f| f.set_auto_commit,
            "auto-commit switch rejected",
        )?;
        self.auto_commit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.record(DriverCall::Commit(self.id), |f| f.commit, "commit rejected")
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.record(
            DriverCall::Rollback(self.id),
            |f| f.rollback,
            "rollback rejected",
        )
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.record(
            DriverCall::Close(self.id),
            |f| f.close,
            "connection already invalidated",
        );
        self.closed = true;
        self.auto_commit = true;
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared.live -= 1;
        result
    }
}
