//! In-memory store for tests and ephemeral runs.
//!
//! Mirrors the ordering and not-found behavior of [`crate::SqliteStore`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_config::WorkflowDefinition;

use crate::error::StoreError;
use crate::types::{StepStatus, WorkflowEvent, WorkflowExecution, WorkflowStep, percent_complete};
use crate::{DefinitionRegistry, Store};

#[derive(Default)]
struct Tables {
  executions: HashMap<String, WorkflowExecution>,
  steps: HashMap<String, WorkflowStep>,
  // Insertion order is chronological order.
  events: Vec<WorkflowEvent>,
  // Most recently saved last.
  definitions: Vec<WorkflowDefinition>,
}

/// A store that keeps every table in process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
  tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a store pre-loaded with definitions.
  pub fn with_definitions(definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
    let store = Self::new();
    {
      let mut tables = store.tables.write().unwrap();
      for definition in definitions {
        upsert_definition(&mut tables.definitions, definition);
      }
    }
    store
  }
}

fn upsert_definition(definitions: &mut Vec<WorkflowDefinition>, definition: WorkflowDefinition) {
  definitions.retain(|d| !(d.name == definition.name && d.version == definition.version));
  definitions.push(definition);
}

#[async_trait]
impl Store for MemoryStore {
  async fn create_execution(
    &self,
    execution: &WorkflowExecution,
    steps: &[WorkflowStep],
  ) -> Result<(), StoreError> {
    let mut tables = self.tables.write().unwrap();
    tables
      .executions
      .insert(execution.execution_id.clone(), execution.clone());
    for step in steps {
      tables.steps.insert(step.step_id.clone(), step.clone());
    }
    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<WorkflowExecution, StoreError> {
    let tables = self.tables.read().unwrap();
    tables
      .executions
      .get(execution_id)
      .cloned()
      .ok_or_else(|| StoreError::not_found("execution", execution_id))
  }

  async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
    let mut tables = self.tables.write().unwrap();
    match tables.executions.get_mut(&execution.execution_id) {
      Some(existing) => {
        *existing = execution.clone();
        Ok(())
      }
      None => Err(StoreError::not_found("execution", &execution.execution_id)),
    }
  }

  async fn get_step(&self, step_id: &str) -> Result<WorkflowStep, StoreError> {
    let tables = self.tables.read().unwrap();
    tables
      .steps
      .get(step_id)
      .cloned()
      .ok_or_else(|| StoreError::not_found("step", step_id))
  }

  async fn update_step(&self, step: &WorkflowStep) -> Result<(), StoreError> {
    let mut tables = self.tables.write().unwrap();
    match tables.steps.get_mut(&step.step_id) {
      Some(existing) => {
        *existing = step.clone();
        Ok(())
      }
      None => Err(StoreError::not_found("step", &step.step_id)),
    }
  }

  async fn refresh_progress(
    &self,
    execution_id: &str,
    current_step: &str,
    updated_at: DateTime<Utc>,
  ) -> Result<i32, StoreError> {
    let mut tables = self.tables.write().unwrap();
    let (completed, total) = tables
      .steps
      .values()
      .filter(|s| s.execution_id == execution_id)
      .fold((0, 0), |(completed, total), s| {
        (completed + usize::from(s.status == StepStatus::Completed), total + 1)
      });

    let execution = tables
      .executions
      .get_mut(execution_id)
      .ok_or_else(|| StoreError::not_found("execution", execution_id))?;
    execution.percent_complete = percent_complete(completed, total);
    execution.current_step = Some(current_step.to_string());
    execution.updated_at = updated_at;
    Ok(execution.percent_complete)
  }

  async fn list_steps(&self, execution_id: &str) -> Result<Vec<WorkflowStep>, StoreError> {
    let tables = self.tables.read().unwrap();
    let mut steps: Vec<_> = tables
      .steps
      .values()
      .filter(|s| s.execution_id == execution_id)
      .cloned()
      .collect();
    steps.sort_by_key(|s| s.step_order);
    Ok(steps)
  }

  async fn insert_event(&self, event: &WorkflowEvent) -> Result<(), StoreError> {
    self.tables.write().unwrap().events.push(event.clone());
    Ok(())
  }

  async fn list_events(&self, execution_id: &str) -> Result<Vec<WorkflowEvent>, StoreError> {
    let tables = self.tables.read().unwrap();
    let mut events: Vec<_> = tables
      .events
      .iter()
      .filter(|e| e.execution_id == execution_id)
      .cloned()
      .collect();
    // Stable sort keeps insertion order among equal timestamps; reverse for newest first.
    events.sort_by_key(|e| e.created_at);
    events.reverse();
    Ok(events)
  }
}

#[async_trait]
impl DefinitionRegistry for MemoryStore {
  async fn find_active_definition(
    &self,
    name: &str,
  ) -> Result<Option<WorkflowDefinition>, StoreError> {
    let tables = self.tables.read().unwrap();
    Ok(
      tables
        .definitions
        .iter()
        .rev()
        .find(|d| d.name == name && d.is_active)
        .cloned(),
    )
  }

  async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
    let mut tables = self.tables.write().unwrap();
    upsert_definition(&mut tables.definitions, definition.clone());
    Ok(())
  }

  async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
    let tables = self.tables.read().unwrap();
    let mut definitions = tables.definitions.clone();
    definitions.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
    Ok(definitions)
  }
}
