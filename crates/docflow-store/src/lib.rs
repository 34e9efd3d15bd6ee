//! Docflow Store
//!
//! This crate provides the storage traits and implementations for workflow
//! executions, their steps and their audit events, plus the registry of
//! workflow definitions. Data is persisted to SQLite, or kept in memory for
//! tests and ephemeral runs.
//!
//! The [`Store`] trait defines operations for:
//! - Creating an execution together with its full step set
//! - Reading and updating executions and steps
//! - Appending and listing audit events
//!
//! The [`DefinitionRegistry`] trait looks up active definitions by name.
//!
//! Every update is a full-row write of a record previously read; callers are
//! expected to hold a single writer per execution. Progress is the exception:
//! [`Store::refresh_progress`] recounts and writes it in one step so
//! concurrent step completions cannot lose each other's updates.

mod error;
mod memory;
mod sqlite;
mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{
  ActorType, ErrorType, EventType, Metadata, StepStatus, WorkflowEvent, WorkflowExecution,
  WorkflowState, WorkflowStep, percent_complete,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_config::WorkflowDefinition;

/// Storage trait for executions, steps and events.
#[async_trait]
pub trait Store: Send + Sync {
  /// Insert an execution and all of its steps atomically.
  async fn create_execution(
    &self,
    execution: &WorkflowExecution,
    steps: &[WorkflowStep],
  ) -> Result<(), StoreError>;

  /// Get an execution by ID.
  async fn get_execution(&self, execution_id: &str) -> Result<WorkflowExecution, StoreError>;

  /// Overwrite an existing execution.
  async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

  /// Get a step by ID.
  async fn get_step(&self, step_id: &str) -> Result<WorkflowStep, StoreError>;

  /// Overwrite an existing step.
  async fn update_step(&self, step: &WorkflowStep) -> Result<(), StoreError>;

  /// Recount completed steps and store the execution's `percent_complete`
  /// together with `current_step`, atomically. Returns the new percent.
  async fn refresh_progress(
    &self,
    execution_id: &str,
    current_step: &str,
    updated_at: DateTime<Utc>,
  ) -> Result<i32, StoreError>;

  /// List steps for an execution, ordered by `step_order`.
  async fn list_steps(&self, execution_id: &str) -> Result<Vec<WorkflowStep>, StoreError>;

  /// Append an event.
  async fn insert_event(&self, event: &WorkflowEvent) -> Result<(), StoreError>;

  /// List events for an execution, newest first.
  async fn list_events(&self, execution_id: &str) -> Result<Vec<WorkflowEvent>, StoreError>;
}

/// Registry of workflow definitions.
#[async_trait]
pub trait DefinitionRegistry: Send + Sync {
  /// Find the active definition with the given name. When several versions
  /// are active the most recently saved one wins.
  async fn find_active_definition(
    &self,
    name: &str,
  ) -> Result<Option<WorkflowDefinition>, StoreError>;

  /// Insert or replace a definition, keyed by `(name, version)`.
  async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), StoreError>;

  /// List all definitions ordered by name and version.
  async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, StoreError>;
}
