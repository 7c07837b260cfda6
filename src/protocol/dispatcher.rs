use crate::error::constants::{ERR_DISPATCHER_READ_LOCK, ERR_DISPATCHER_WRITE_LOCK};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::CommandCall;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

type HandlerFn = dyn Fn(&Value) -> Result<Value> + Send + Sync + 'static;

/// Registry of named commands. Cloning shares the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<String, Box<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::CommandFailed(ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        info!(command = name, "Registering command");
        handlers.insert(name.to_string(), Box::new(handler));
        Ok(())
    }

    pub fn dispatch(&self, call: &CommandCall) -> Result<Value> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::CommandFailed(ERR_DISPATCHER_READ_LOCK.to_string()))?;

        debug!(command = %call.command, "Dispatching command");
        handlers
            .get(call.command.as_str())
            .ok_or_else(|| ProtocolError::UnknownCommand(call.command.clone()))
            .and_then(|handler| handler(&call.args))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .map(|handlers| handlers.contains_key(name))
            .unwrap_or(false)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
