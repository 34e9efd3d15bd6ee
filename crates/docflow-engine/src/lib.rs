//! Docflow workflow engine.
//!
//! The engine is a passive state-transition API over a [`Store`]: it creates
//! executions from definitions, moves them through the pipeline states,
//! tracks step lifecycles, applies the retry policy and writes an
//! append-only audit trail. It never schedules work and never calls agents;
//! a driver polls [`WorkflowEngine::get_next_step`], invokes the agent and
//! feeds the [`AgentResult`] back through [`WorkflowEngine::complete_step`].
//!
//! # Architecture
//!
//! ```text
//! WorkflowEngine
//! ├── create_execution(input)          - execution + all steps, `started` event
//! ├── transition_state / pause / resume / fail / complete
//! ├── get_next_step(execution_id)      - lowest-order pending step
//! ├── start_step / complete_step       - step lifecycle + percent complete
//! ├── should_retry_step / retry_step   - policy check + backoff + reset
//! ├── record_event / get_events        - audit trail, newest first
//! └── status / control                 - status snapshot, unified control actions
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use docflow_engine::{AgentResult, CreateExecution, EngineConfig, WorkflowEngine};
//!
//! let store = Arc::new(MemoryStore::with_definitions(definitions));
//! let engine = WorkflowEngine::new(store.clone(), store, EngineConfig::default());
//!
//! let execution = engine
//!   .create_execution(CreateExecution::new("project-1", DocumentType::Ib))
//!   .await?;
//!
//! while let Some(step) = engine.get_next_step(&execution.execution_id).await? {
//!   engine.start_step(&step.step_id).await?;
//!   let result = run_agent(&step).await;
//!   engine.complete_step(&step.step_id, result).await?;
//! }
//! ```
//!
//! [`Store`]: docflow_store::Store

mod config;
mod control;
mod engine;
mod error;
mod events;
mod input;
mod result;
mod retry;
mod status;
mod steps;

pub use config::EngineConfig;
pub use control::{ControlAction, ControlOutcome};
pub use engine::WorkflowEngine;
pub use error::EngineError;
pub use events::NewEvent;
pub use input::{CreateExecution, ExecutionUpdate, StepUpdate};
pub use result::{AgentError, AgentResult};
pub use retry::is_retry_eligible;
pub use status::{ExecutionStatus, format_duration, percent_complete};

pub use docflow_store::{
  ActorType, ErrorType, EventType, Metadata, StepStatus, WorkflowEvent, WorkflowExecution,
  WorkflowState, WorkflowStep,
};
