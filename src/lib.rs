//! Brainsaver: a personal assistant core that routes free-form requests to
//! capability handlers and remembers every exchange.

pub mod agents;
pub mod capability;
pub mod classifier;
pub mod config;
pub mod error;
pub mod indexer;
pub mod orchestrator;
pub mod store;

pub use capability::{Capability, CapabilityHandler, CapabilityRegistry, Response, Slots};
pub use classifier::{Intent, IntentClassifier};
pub use config::AssistantConfig;
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
