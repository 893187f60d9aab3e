//! Capability registry: maps each capability to its handler.
//!
//! Built once at startup and frozen behind an `Arc`. Registration needs
//! `&mut self`, so nothing reachable from request handling can mutate it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::capability::{Capability, CapabilityHandler};
use crate::error::RegistryError;

/// Registry of capability handlers, in declaration order.
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<Capability, Arc<dyn CapabilityHandler>>,
    /// Registration order; the classifier breaks ties with it.
    order: Vec<Capability>,
}

impl CapabilityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its capability.
    pub fn register(&mut self, handler: Arc<dyn CapabilityHandler>) -> Result<(), RegistryError> {
        let capability = handler.capability();
        if self.handlers.contains_key(&capability) {
            tracing::warn!(%capability, "Rejected duplicate capability registration");
            return Err(RegistryError::DuplicateCapability(capability));
        }
        self.handlers.insert(capability, handler);
        self.order.push(capability);
        tracing::debug!(%capability, "Registered capability");
        Ok(())
    }

    /// Look up the handler for a capability.
    pub fn resolve(
        &self,
        capability: Capability,
    ) -> Result<Arc<dyn CapabilityHandler>, RegistryError> {
        self.handlers
            .get(&capability)
            .cloned()
            .ok_or(RegistryError::UnknownCapability(capability))
    }

    /// Check if a capability has a handler.
    pub fn has(&self, capability: Capability) -> bool {
        self.handlers.contains_key(&capability)
    }

    /// Registered capabilities in declaration order.
    pub fn capabilities(&self) -> &[Capability] {
        &self.order
    }

    /// Registered handlers in declaration order.
    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn CapabilityHandler>> {
        self.order.iter().filter_map(|c| self.handlers.get(c))
    }

    /// Get the number of registered capabilities.
    pub fn count(&self) -> usize {
        self.order.len()
    }
}
