//! Execution lifecycle: creation, state transitions and the pause, resume,
//! fail and complete controls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docflow_config::StepDefinition;
use docflow_store::{
  DefinitionRegistry, EventType, Metadata, StepStatus, Store, WorkflowExecution,
  WorkflowState, WorkflowStep,
};
use serde_json::json;
use sqlx::types::Json;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{NewEvent, meta};
use crate::input::{CreateExecution, ExecutionUpdate};

/// The workflow engine.
///
/// Passive: every method is a request/response against the store. Cheap to
/// share behind an `Arc`.
pub struct WorkflowEngine {
  pub(crate) store: Arc<dyn Store>,
  pub(crate) definitions: Arc<dyn DefinitionRegistry>,
  pub(crate) config: EngineConfig,
}

impl WorkflowEngine {
  pub fn new(
    store: Arc<dyn Store>,
    definitions: Arc<dyn DefinitionRegistry>,
    config: EngineConfig,
  ) -> Self {
    Self {
      store,
      definitions,
      config,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Create an execution from the active definition named by
  /// `input.workflow_name`, together with all of its steps.
  ///
  /// The execution row and its steps are written in one store call, so a
  /// failure leaves nothing behind.
  pub async fn create_execution(
    &self,
    input: CreateExecution,
  ) -> Result<WorkflowExecution, EngineError> {
    if input.project_id.trim().is_empty() {
      return Err(EngineError::invalid_input("project_id is required"));
    }

    let definition = self
      .definitions
      .find_active_definition(&input.workflow_name)
      .await?
      .ok_or_else(|| EngineError::not_found("workflow definition", &input.workflow_name))?;

    let now = Utc::now();
    let execution = WorkflowExecution {
      execution_id: uuid::Uuid::new_v4().to_string(),
      project_id: input.project_id,
      document_type: input.document_type,
      document_id: input.document_id,
      workflow_name: definition.name.clone(),
      workflow_version: definition.version.clone(),
      current_state: WorkflowState::Created,
      current_step: None,
      percent_complete: 0,
      started_at: now,
      completed_at: None,
      paused_at: None,
      resumed_at: None,
      error_code: None,
      error_message: None,
      retry_count: 0,
      max_retries: self.config.execution_max_retries(),
      checkpoint_data: None,
      triggered_by: input.triggered_by,
      metadata: Json(input.metadata.unwrap_or_default()),
      created_at: now,
      updated_at: now,
    };

    let steps: Vec<WorkflowStep> = definition
      .steps
      .iter()
      .enumerate()
      .map(|(index, step)| materialize_step(&execution.execution_id, index, step, now))
      .collect();

    self.store.create_execution(&execution, &steps).await?;

    self
      .record_event(
        NewEvent::new(&execution.execution_id, EventType::Started)
          .user_or_system(execution.triggered_by.clone())
          .states(None, WorkflowState::Created)
          .data(json!({
            "workflow_name": execution.workflow_name,
            "workflow_version": execution.workflow_version,
            "document_type": execution.document_type,
            "steps_total": steps.len(),
          })),
      )
      .await?;

    info!(
      execution_id = %execution.execution_id,
      workflow_name = %execution.workflow_name,
      workflow_version = %execution.workflow_version,
      steps = steps.len(),
      "execution created"
    );

    Ok(execution)
  }

  /// Best-effort read for status displays. A missing execution and a store
  /// failure both yield `None`; the failure is logged.
  pub async fn get_execution(&self, execution_id: &str) -> Option<WorkflowExecution> {
    match self.store.get_execution(execution_id).await {
      Ok(execution) => Some(execution),
      Err(docflow_store::StoreError::NotFound { .. }) => None,
      Err(e) => {
        warn!(execution_id = %execution_id, error = %e, "failed to read workflow execution");
        None
      }
    }
  }

  /// Strict read: missing executions and store failures are errors.
  pub async fn execution(&self, execution_id: &str) -> Result<WorkflowExecution, EngineError> {
    Ok(self.store.get_execution(execution_id).await?)
  }

  /// Apply a partial update.
  ///
  /// `completed_at` is kept consistent with the resulting state: stamped when
  /// the execution ends up `completed` or `failed`, cleared otherwise.
  pub async fn update_execution(
    &self,
    execution_id: &str,
    update: ExecutionUpdate,
  ) -> Result<WorkflowExecution, EngineError> {
    let mut execution = self.execution(execution_id).await?;
    let now = Utc::now();

    if let Some(percent) = update.percent_complete.filter(|p| !(0..=100).contains(p)) {
      return Err(EngineError::invalid_input(format!(
        "percent_complete must be within 0..=100, got {percent}"
      )));
    }

    let ExecutionUpdate {
      current_state,
      current_step,
      percent_complete,
      completed_at,
      paused_at,
      resumed_at,
      error_code,
      error_message,
      retry_count,
      checkpoint_data,
      metadata,
    } = update;

    if let Some(v) = current_step {
      execution.current_step = Some(v);
    }
    if let Some(v) = percent_complete {
      execution.percent_complete = v;
    }
    if let Some(v) = completed_at {
      execution.completed_at = Some(v);
    }
    if let Some(v) = paused_at {
      execution.paused_at = Some(v);
    }
    if let Some(v) = resumed_at {
      execution.resumed_at = Some(v);
    }
    if let Some(v) = error_code {
      execution.error_code = Some(v);
    }
    if let Some(v) = error_message {
      execution.error_message = Some(v);
    }
    if let Some(v) = retry_count {
      execution.retry_count = v;
    }
    if let Some(v) = checkpoint_data {
      execution.checkpoint_data = Some(Json(v));
    }
    if let Some(v) = metadata {
      execution.metadata = Json(v);
    }
    if let Some(state) = current_state {
      enter_state(&mut execution, state, now);
    }
    normalize_completion(&mut execution, now);

    self.save_execution(&mut execution, now).await?;
    Ok(execution)
  }

  /// Move the execution into `new_state`, shallow-merging `metadata` into
  /// the execution's metadata, and record a `state_changed` event.
  ///
  /// Terminal executions cannot be moved; a paused one only leaves through
  /// [`resume_execution`](Self::resume_execution) or
  /// [`fail_execution`](Self::fail_execution).
  pub async fn transition_state(
    &self,
    execution_id: &str,
    new_state: WorkflowState,
    metadata: Option<Metadata>,
  ) -> Result<WorkflowExecution, EngineError> {
    let mut execution = self.execution(execution_id).await?;
    let previous = execution.current_state;

    if previous.is_terminal() {
      return Err(EngineError::invalid_transition(format!(
        "execution {execution_id} is {previous:?} and cannot move to {new_state:?}"
      )));
    }
    if previous == WorkflowState::Paused && new_state != WorkflowState::Paused {
      return Err(EngineError::invalid_transition(format!(
        "execution {execution_id} is paused; resume it before moving to {new_state:?}"
      )));
    }

    let now = Utc::now();
    enter_state(&mut execution, new_state, now);
    if let Some(extra) = &metadata {
      merge_metadata(&mut execution.metadata, extra);
    }
    self.save_execution(&mut execution, now).await?;

    let mut event =
      NewEvent::new(execution_id, EventType::StateChanged).states(Some(previous), new_state);
    if let Some(extra) = metadata {
      event = event.metadata(extra);
    }
    self.record_event(event).await?;

    info!(
      execution_id = %execution_id,
      from = ?previous,
      to = ?new_state,
      "execution state changed"
    );

    Ok(execution)
  }

  /// Soft-stop an execution. Resumable through
  /// [`resume_execution`](Self::resume_execution).
  pub async fn pause_execution(
    &self,
    execution_id: &str,
    actor_id: Option<String>,
  ) -> Result<WorkflowExecution, EngineError> {
    let mut execution = self.execution(execution_id).await?;
    let previous = execution.current_state;
    if previous.is_terminal() {
      return Err(EngineError::invalid_transition(format!(
        "cannot pause execution {execution_id}: it is {previous:?}"
      )));
    }

    let now = Utc::now();
    enter_state(&mut execution, WorkflowState::Paused, now);
    self.save_execution(&mut execution, now).await?;

    self
      .record_event(
        NewEvent::new(execution_id, EventType::Paused)
          .user_or_system(actor_id)
          .states(Some(previous), WorkflowState::Paused),
      )
      .await?;

    info!(execution_id = %execution_id, "execution paused");
    Ok(execution)
  }

  /// Resume a paused execution. It restarts from `created` and the driver
  /// re-evaluates from the first pending step.
  pub async fn resume_execution(
    &self,
    execution_id: &str,
    actor_id: Option<String>,
  ) -> Result<WorkflowExecution, EngineError> {
    let mut execution = self.execution(execution_id).await?;
    if execution.current_state != WorkflowState::Paused {
      return Err(EngineError::invalid_transition(format!(
        "cannot resume execution {execution_id}: it is {:?}, not paused",
        execution.current_state
      )));
    }

    let now = Utc::now();
    enter_state(&mut execution, WorkflowState::Created, now);
    execution.resumed_at = Some(now);
    self.save_execution(&mut execution, now).await?;

    self
      .record_event(
        NewEvent::new(execution_id, EventType::Resumed)
          .user_or_system(actor_id)
          .states(Some(WorkflowState::Paused), WorkflowState::Created),
      )
      .await?;

    info!(execution_id = %execution_id, "execution resumed");
    Ok(execution)
  }

  /// Hard-stop an execution. Failing an already failed execution re-records
  /// the error.
  pub async fn fail_execution(
    &self,
    execution_id: &str,
    error_code: &str,
    error_message: &str,
  ) -> Result<WorkflowExecution, EngineError> {
    let mut execution = self.execution(execution_id).await?;
    let previous = execution.current_state;
    if previous == WorkflowState::Completed {
      return Err(EngineError::invalid_transition(format!(
        "cannot fail execution {execution_id}: it already completed"
      )));
    }

    let now = Utc::now();
    enter_state(&mut execution, WorkflowState::Failed, now);
    execution.error_code = Some(error_code.to_string());
    execution.error_message = Some(error_message.to_string());
    self.save_execution(&mut execution, now).await?;

    self
      .record_event(
        NewEvent::new(execution_id, EventType::Failed)
          .states(Some(previous), WorkflowState::Failed)
          .metadata(meta([
            ("error_code", json!(error_code)),
            ("error_message", json!(error_message)),
          ])),
      )
      .await?;

    info!(
      execution_id = %execution_id,
      error_code = %error_code,
      "execution failed"
    );
    Ok(execution)
  }

  /// Mark the execution completed at 100%.
  pub async fn complete_execution(
    &self,
    execution_id: &str,
  ) -> Result<WorkflowExecution, EngineError> {
    let mut execution = self.execution(execution_id).await?;
    let previous = execution.current_state;
    if matches!(previous, WorkflowState::Failed | WorkflowState::Paused) {
      return Err(EngineError::invalid_transition(format!(
        "cannot complete execution {execution_id}: it is {previous:?}"
      )));
    }

    let now = Utc::now();
    enter_state(&mut execution, WorkflowState::Completed, now);
    execution.percent_complete = 100;
    self.save_execution(&mut execution, now).await?;

    self
      .record_event(
        NewEvent::new(execution_id, EventType::Completed)
          .states(Some(previous), WorkflowState::Completed),
      )
      .await?;

    info!(execution_id = %execution_id, "execution completed");
    Ok(execution)
  }

  /// Store an opaque checkpoint for the execution, replacing any previous one.
  pub async fn save_checkpoint(
    &self,
    execution_id: &str,
    data: serde_json::Value,
  ) -> Result<WorkflowExecution, EngineError> {
    let mut execution = self.execution(execution_id).await?;
    let now = Utc::now();
    execution.checkpoint_data = Some(Json(data));
    self.save_execution(&mut execution, now).await?;
    Ok(execution)
  }

  /// The execution's checkpoint, if one was saved.
  pub async fn checkpoint(
    &self,
    execution_id: &str,
  ) -> Result<Option<serde_json::Value>, EngineError> {
    let execution = self.execution(execution_id).await?;
    Ok(execution.checkpoint_data.map(|Json(data)| data))
  }

  pub(crate) async fn save_execution(
    &self,
    execution: &mut WorkflowExecution,
    now: DateTime<Utc>,
  ) -> Result<(), EngineError> {
    execution.updated_at = now;
    self.store.update_execution(execution).await?;
    Ok(())
  }
}

fn materialize_step(
  execution_id: &str,
  index: usize,
  step: &StepDefinition,
  now: DateTime<Utc>,
) -> WorkflowStep {
  let metadata = meta([
    ("description", json!(step.description)),
    ("timeout_minutes", json!(step.timeout_minutes)),
    ("retry_on_failure", json!(step.retry_on_failure)),
    ("parallel", json!(step.parallel)),
    ("required", json!(step.required)),
  ]);

  WorkflowStep {
    step_id: uuid::Uuid::new_v4().to_string(),
    execution_id: execution_id.to_string(),
    step_name: step.name.clone(),
    step_order: i32::try_from(index + 1).unwrap_or(i32::MAX),
    agent_name: step.agent,
    status: StepStatus::Pending,
    started_at: None,
    completed_at: None,
    duration_ms: None,
    input_data: None,
    output_data: None,
    error_type: None,
    error_message: None,
    error_stack: None,
    retry_attempt: 0,
    metadata: Json(metadata),
    created_at: now,
    updated_at: now,
  }
}

/// Set the state together with the timestamps that travel with it.
fn enter_state(execution: &mut WorkflowExecution, state: WorkflowState, now: DateTime<Utc>) {
  execution.current_state = state;
  if state == WorkflowState::Paused {
    execution.paused_at = Some(now);
  }
  normalize_completion(execution, now);
}

/// `completed_at` is set iff the execution is terminal.
fn normalize_completion(execution: &mut WorkflowExecution, now: DateTime<Utc>) {
  if execution.current_state.is_terminal() {
    execution.completed_at.get_or_insert(now);
  } else {
    execution.completed_at = None;
  }
}

/// Shallow merge; keys in `extra` win.
pub(crate) fn merge_metadata(target: &mut Metadata, extra: &Metadata) {
  for (key, value) in extra {
    target.insert(key.clone(), value.clone());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use docflow_config::AgentName;

  #[test]
  fn test_materialized_step_carries_definition_fields() {
    let mut def = StepDefinition::new("write", AgentName::Writer);
    def.parallel = true;
    def.retry_on_failure = false;
    def.timeout_minutes = 15;

    let step = materialize_step("exec-1", 2, &def, Utc::now());
    assert_eq!(step.step_order, 3);
    assert_eq!(step.status, StepStatus::Pending);
    assert!(step.parallel());
    assert!(!step.retry_on_failure());
    assert!(step.required());
    assert_eq!(step.timeout_minutes(), Some(15));
  }

  #[test]
  fn test_merge_metadata_new_keys_win() {
    let mut target = meta([("a", json!(1)), ("b", json!(2))]);
    merge_metadata(&mut target, &meta([("b", json!(3)), ("c", json!(4))]));
    assert_eq!(target["a"], 1);
    assert_eq!(target["b"], 3);
    assert_eq!(target["c"], 4);
  }
}
