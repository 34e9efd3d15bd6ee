//! Docflow Orchestrator
//!
//! The engine never runs anything on its own. This crate supplies the loop
//! that does: [`WorkflowDriver`] asks the engine for the next pending step,
//! invokes the agent bound to it through an [`AgentInvoker`], feeds the
//! result back and decides between retrying, skipping and failing.
//!
//! # Architecture
//!
//! ```text
//! ExecutionRunner (mpsc of execution ids, one at a time)
//!   └── WorkflowDriver::run(execution_id, cancel)
//!         ├── batch: next pending step + contiguous parallel steps
//!         ├── AgentRegistry -> AgentInvoker (CommandAgent, ...)
//!         └── WorkflowEngine (state, steps, retry, events)
//! ```
//!
//! A driver assumes it is the only writer for the execution it drives.

mod agent;
mod command;
mod driver;
mod error;
mod runner;

pub use agent::{AgentInvoker, AgentRegistry, AgentRequest};
pub use command::CommandAgent;
pub use driver::{DriveOutcome, DriverConfig, WorkflowDriver};
pub use error::{DriverError, InvokeError};
pub use runner::ExecutionRunner;
