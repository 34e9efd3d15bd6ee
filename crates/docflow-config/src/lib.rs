//! Docflow Config
//!
//! This crate contains the serializable workflow definition types for docflow.
//! A definition is a named, versioned template mapping a document type to an
//! ordered list of steps, each bound to one agent.
//!
//! Definitions can be loaded from:
//! - JSON files (via CLI with `docflow definitions load <file>`)
//! - Database storage (as JSON blobs)
//!
//! The engine takes these definitions and materializes them into execution
//! steps; it trusts the structure and never validates it beyond lookup.

mod document;
mod error;
mod load;
mod workflow;

pub use document::{AgentName, DocumentType, Stage};
pub use error::ConfigError;
pub use load::{load_definitions, parse_definitions};
pub use workflow::{StepDefinition, WorkflowDefinition};
