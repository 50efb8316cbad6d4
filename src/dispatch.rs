//! Action dispatch table.
//!
//! Maps an action name to a handler with a fixed signature. The table is
//! checked when it is built; looking up an unregistered name is a typed
//! error.

use crate::core::{DbError, Result};
use crate::session::Session;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::debug;

/// Incoming action with its parameters
#[derive(Debug, Clone, Default)]
pub struct ActionRequest {
    pub action: String,
    pub params: HashMap<String, String>,
}

impl ActionRequest {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            params: HashMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// What a handler did with the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Body for the caller to write out
    Rendered(String),
    /// The handler already produced the response itself
    AlreadyHandled,
}

pub type Handler = fn(&mut Session<'_>, &ActionRequest) -> Result<Outcome>;

pub struct ActionTable {
    handlers: HashMap<String, Handler>,
}

#[derive(Default)]
pub struct ActionTableBuilder {
    entries: Vec<(String, Handler)>,
}

impl ActionTableBuilder {
    pub fn register(mut self, name: &str, handler: Handler) -> Self {
        self.entries.push((name.to_string(), handler));
        self
    }

    pub fn build(self) -> Result<ActionTable> {
        let mut handlers = HashMap::with_capacity(self.entries.len());
        for (name, handler) in self.entries {
            if name.trim().is_empty() {
                return Err(DbError::Config("action name cannot be empty".into()));
            }
            match handlers.entry(name) {
                Entry::Occupied(taken) => {
                    return Err(DbError::DuplicateAction(taken.key().clone()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(handler);
                }
            }
        }
        Ok(ActionTable { handlers })
    }
}

impl ActionTable {
    pub fn builder() -> ActionTableBuilder {
        ActionTableBuilder::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Run the handler registered for `request.action`
    pub fn dispatch(&self, session: &mut Session<'_>, request: &ActionRequest) -> Result<Outcome> {
        let handler = self
            .handlers
            .get(&request.action)
            .ok_or_else(|| DbError::UnknownAction(request.action.clone()))?;

        debug!("dispatching action '{}'", request.action);
        handler(session, request)
    }
}
