//! Built-in capability handlers.

pub mod automation;
pub mod domain_check;
pub mod file_search;
pub mod memory_query;
pub mod phone_sort;
pub mod research;

use std::sync::Arc;

pub use automation::AutomationHandler;
pub use domain_check::DomainCheckHandler;
pub use file_search::FileSearchHandler;
pub use memory_query::{MemoryQueryHandler, TimeWindow};
pub use phone_sort::PhoneSortHandler;
pub use research::ResearchHandler;

use crate::capability::CapabilityRegistry;
use crate::config::AssistantConfig;
use crate::error::RegistryError;

/// Register every built-in handler, in classifier tie-break order.
pub fn register_builtin(
    registry: &mut CapabilityRegistry,
    config: &AssistantConfig,
) -> Result<(), RegistryError> {
    registry.register(Arc::new(MemoryQueryHandler::new(config.recall_limit)))?;
    registry.register(Arc::new(FileSearchHandler::new(config.scan_limit)))?;
    registry.register(Arc::new(ResearchHandler::new()))?;
    registry.register(Arc::new(AutomationHandler::new()))?;
    registry.register(Arc::new(PhoneSortHandler::new()))?;
    registry.register(Arc::new(DomainCheckHandler::new()))?;
    Ok(())
}

/// A registry holding every built-in handler.
pub fn builtin_registry(config: &AssistantConfig) -> Result<CapabilityRegistry, RegistryError> {
    let mut registry = CapabilityRegistry::new();
    register_builtin(&mut registry, config)?;
    Ok(registry)
}
