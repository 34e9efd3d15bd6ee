//! Step lifecycle: next-step selection, start, completion, skip and requeue.

use chrono::Utc;
use docflow_store::{ActorType, EventType, StepStatus, WorkflowStep};
use serde_json::json;
use sqlx::types::Json;
use tracing::{debug, info, warn};

use crate::engine::{WorkflowEngine, merge_metadata};
use crate::error::EngineError;
use crate::events::{NewEvent, meta};
use crate::input::StepUpdate;
use crate::result::AgentResult;

impl WorkflowEngine {
  /// Best-effort read of an execution's steps in `step_order`. Degrades to an
  /// empty list when the store cannot be read.
  pub async fn get_steps(&self, execution_id: &str) -> Vec<WorkflowStep> {
    match self.store.list_steps(execution_id).await {
      Ok(steps) => steps,
      Err(e) => {
        warn!(execution_id = %execution_id, error = %e, "failed to read workflow steps");
        Vec::new()
      }
    }
  }

  /// Strict read of an execution's steps in `step_order`.
  pub async fn steps(&self, execution_id: &str) -> Result<Vec<WorkflowStep>, EngineError> {
    Ok(self.store.list_steps(execution_id).await?)
  }

  pub async fn step(&self, step_id: &str) -> Result<WorkflowStep, EngineError> {
    Ok(self.store.get_step(step_id).await?)
  }

  /// The lowest-ordered `pending` step, if any.
  pub async fn get_next_step(
    &self,
    execution_id: &str,
  ) -> Result<Option<WorkflowStep>, EngineError> {
    let steps = self.steps(execution_id).await?;
    Ok(
      steps
        .into_iter()
        .find(|step| step.status == StepStatus::Pending),
    )
  }

  /// Move a pending step to `running`.
  pub async fn start_step(&self, step_id: &str) -> Result<WorkflowStep, EngineError> {
    let mut step = self.step(step_id).await?;
    if step.status != StepStatus::Pending {
      return Err(EngineError::invalid_transition(format!(
        "cannot start step {}: it is {}",
        step.step_name,
        step.status.as_str()
      )));
    }

    let now = Utc::now();
    step.status = StepStatus::Running;
    step.started_at = Some(now);
    step.completed_at = None;
    step.duration_ms = None;
    step.updated_at = now;
    self.store.update_step(&step).await?;

    // Step starts share the `step_completed` event type; `status` tells them apart.
    self
      .record_event(
        NewEvent::new(&step.execution_id, EventType::StepCompleted)
          .actor(Some(step.agent_name.to_string()), ActorType::Agent)
          .step(&step.step_id)
          .metadata(meta([
            ("step_name", json!(step.step_name)),
            ("status", json!(StepStatus::Running.as_str())),
          ])),
      )
      .await?;

    debug!(
      execution_id = %step.execution_id,
      step_name = %step.step_name,
      agent = %step.agent_name,
      "step started"
    );
    Ok(step)
  }

  /// Record an agent's result for a step, then refresh the execution's
  /// progress.
  ///
  /// Steps that never started get no `duration_ms`. Completed and skipped
  /// steps cannot be completed again.
  pub async fn complete_step(
    &self,
    step_id: &str,
    result: AgentResult,
  ) -> Result<WorkflowStep, EngineError> {
    let mut step = self.step(step_id).await?;
    if matches!(step.status, StepStatus::Completed | StepStatus::Skipped) {
      return Err(EngineError::invalid_transition(format!(
        "step {} is already {}",
        step.step_name,
        step.status.as_str()
      )));
    }

    let now = Utc::now();
    step.completed_at = Some(now);
    step.duration_ms = step
      .started_at
      .map(|started| (now - started).num_milliseconds());
    step.output_data = result.data.map(Json);

    if result.success {
      step.status = StepStatus::Completed;
      step.error_type = None;
      step.error_message = None;
      step.error_stack = None;
    } else {
      step.status = StepStatus::Failed;
      step.error_type = result.error.as_ref().map(|e| e.error_type);
      step.error_message = result.error.as_ref().map(|e| e.message.clone());
      if let Some(code) = result.error.as_ref().and_then(|e| e.code.clone()) {
        step.metadata.insert("error_code".to_string(), json!(code));
      }
    }
    if let Some(extra) = &result.metadata {
      merge_metadata(&mut step.metadata, extra);
    }
    step.updated_at = now;
    self.store.update_step(&step).await?;

    self
      .record_event(
        NewEvent::new(&step.execution_id, EventType::StepCompleted)
          .actor(Some(step.agent_name.to_string()), ActorType::Agent)
          .step(&step.step_id)
          .metadata(meta([
            ("step_name", json!(step.step_name)),
            ("status", json!(step.status.as_str())),
            ("duration_ms", json!(step.duration_ms)),
          ])),
      )
      .await?;

    self
      .refresh_progress(&step.execution_id, &step.step_name)
      .await?;

    info!(
      execution_id = %step.execution_id,
      step_name = %step.step_name,
      status = step.status.as_str(),
      duration_ms = ?step.duration_ms,
      "step finished"
    );
    Ok(step)
  }

  /// Skip an optional step that is pending or has failed.
  pub async fn skip_step(
    &self,
    step_id: &str,
    reason: Option<&str>,
  ) -> Result<WorkflowStep, EngineError> {
    let mut step = self.step(step_id).await?;
    if step.required() {
      return Err(EngineError::invalid_transition(format!(
        "step {} is required and cannot be skipped",
        step.step_name
      )));
    }
    if !matches!(step.status, StepStatus::Pending | StepStatus::Failed) {
      return Err(EngineError::invalid_transition(format!(
        "cannot skip step {}: it is {}",
        step.step_name,
        step.status.as_str()
      )));
    }

    let now = Utc::now();
    step.status = StepStatus::Skipped;
    step.completed_at = Some(now);
    step.updated_at = now;
    self.store.update_step(&step).await?;

    self
      .record_event(
        NewEvent::new(&step.execution_id, EventType::StepCompleted)
          .step(&step.step_id)
          .metadata(meta([
            ("step_name", json!(step.step_name)),
            ("status", json!(StepStatus::Skipped.as_str())),
            ("reason", json!(reason)),
          ])),
      )
      .await?;

    self
      .refresh_progress(&step.execution_id, &step.step_name)
      .await?;

    info!(
      execution_id = %step.execution_id,
      step_name = %step.step_name,
      reason = reason.unwrap_or_default(),
      "step skipped"
    );
    Ok(step)
  }

  /// Return a `running` step to `pending` without spending a retry attempt.
  pub async fn requeue_step(&self, step_id: &str) -> Result<WorkflowStep, EngineError> {
    let mut step = self.step(step_id).await?;
    if step.status != StepStatus::Running {
      return Err(EngineError::invalid_transition(format!(
        "cannot requeue step {}: it is {}",
        step.step_name,
        step.status.as_str()
      )));
    }

    step.status = StepStatus::Pending;
    step.started_at = None;
    step.updated_at = Utc::now();
    self.store.update_step(&step).await?;

    debug!(
      execution_id = %step.execution_id,
      step_name = %step.step_name,
      "step requeued"
    );
    Ok(step)
  }

  /// Partial update of a step's payload.
  pub async fn update_step(
    &self,
    step_id: &str,
    update: StepUpdate,
  ) -> Result<WorkflowStep, EngineError> {
    let mut step = self.step(step_id).await?;
    if let Some(input) = update.input_data {
      step.input_data = Some(Json(input));
    }
    if let Some(output) = update.output_data {
      step.output_data = Some(Json(output));
    }
    if let Some(extra) = &update.metadata {
      merge_metadata(&mut step.metadata, extra);
    }
    step.updated_at = Utc::now();
    self.store.update_step(&step).await?;
    Ok(step)
  }

  /// Recompute `percent_complete` over all steps and point `current_step` at
  /// the step that just finished.
  async fn refresh_progress(&self, execution_id: &str, step_name: &str) -> Result<(), EngineError> {
    let percent = self
      .store
      .refresh_progress(execution_id, step_name, Utc::now())
      .await?;
    debug!(execution_id = %execution_id, percent_complete = percent, "progress refreshed");
    Ok(())
  }
}
