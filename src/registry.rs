//! Native handlers the script side may invoke by name.

use crate::dispatcher::Responder;
use crate::error::{BridgeError, Result};
use crate::value::BridgeValue;
use dashmap::DashMap;
use std::sync::Arc;

/// Trait for native handler implementations
///
/// `data` is the decoded call payload. `responder` is present only when the
/// caller asked for a response; dropping it sends nothing.
pub trait BridgeHandler: Send + Sync {
    /// Handle one inbound call
    fn handle(&self, data: Option<BridgeValue>, responder: Option<Responder>);
}

impl<F> BridgeHandler for F
where
    F: Fn(Option<BridgeValue>, Option<Responder>) + Send + Sync,
{
    fn handle(&self, data: Option<BridgeValue>, responder: Option<Responder>) {
        self(data, responder)
    }
}

/// Shared handler reference
pub type SharedHandler = Arc<dyn BridgeHandler>;

/// Handler registry keyed by operation name
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, SharedHandler>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same name
    pub fn register(&self, name: impl Into<String>, handler: SharedHandler) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "handler name must not be empty".into(),
            ));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Remove a handler
    pub fn remove(&self, name: &str) -> Option<SharedHandler> {
        self.handlers.remove(name).map(|(_, handler)| handler)
    }

    /// Look up a handler; the map is not locked while the caller uses it
    pub fn lookup(&self, name: &str) -> Option<SharedHandler> {
        self.handlers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a handler is registered
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered handler names
    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Remove every handler
    pub fn clear(&self) {
        self.handlers.clear();
    }
}
