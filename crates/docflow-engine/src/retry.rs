//! Retry policy and step reset.

use chrono::Utc;
use docflow_store::{ErrorType, EventType, StepStatus, WorkflowStep};
use serde_json::json;
use tracing::info;

use crate::engine::WorkflowEngine;
use crate::error::EngineError;
use crate::events::{NewEvent, meta};

/// Whether `step` may be retried under a budget of `max_retries`.
///
/// Only failed steps qualify. Fatal and validation errors never do, nor
/// steps whose definition turned `retry_on_failure` off, nor steps that
/// have used up the budget.
pub fn is_retry_eligible(step: &WorkflowStep, max_retries: i32) -> bool {
  if step.status != StepStatus::Failed {
    return false;
  }
  if matches!(
    step.error_type,
    Some(ErrorType::Fatal) | Some(ErrorType::Validation)
  ) {
    return false;
  }
  if !step.retry_on_failure() {
    return false;
  }
  step.retry_attempt < max_retries
}

impl WorkflowEngine {
  /// Retry eligibility against the owning execution's `max_retries`.
  pub async fn should_retry_step(&self, step: &WorkflowStep) -> Result<bool, EngineError> {
    let execution = self.execution(&step.execution_id).await?;
    Ok(is_retry_eligible(step, execution.max_retries))
  }

  /// Wait out the backoff for the step's attempt, then return it to
  /// `pending` with `retry_attempt` incremented and its error cleared.
  ///
  /// Ineligible steps are rejected before any wait or mutation. Eligibility
  /// is checked again after the wait, so of two retries racing on the same
  /// failed step only one resets it.
  pub async fn retry_step(&self, step_id: &str) -> Result<WorkflowStep, EngineError> {
    let step = self.step(step_id).await?;
    self.ensure_retry_eligible(&step).await?;

    let delay = self
      .config
      .retry_delay(u32::try_from(step.retry_attempt).unwrap_or_default());
    info!(
      execution_id = %step.execution_id,
      step_name = %step.step_name,
      retry_attempt = step.retry_attempt + 1,
      delay_ms = delay.as_millis() as u64,
      "retrying step after backoff"
    );
    tokio::time::sleep(delay).await;

    // Re-read after the wait so concurrent payload updates are kept.
    let mut step = self.step(step_id).await?;
    self.ensure_retry_eligible(&step).await?;

    let now = Utc::now();
    step.status = StepStatus::Pending;
    step.retry_attempt += 1;
    step.error_type = None;
    step.error_message = None;
    step.error_stack = None;
    step.started_at = None;
    step.completed_at = None;
    step.duration_ms = None;
    step.updated_at = now;
    self.store.update_step(&step).await?;

    let mut execution = self.execution(&step.execution_id).await?;
    execution.retry_count += 1;
    self.save_execution(&mut execution, now).await?;

    self
      .record_event(
        NewEvent::new(&step.execution_id, EventType::Retry)
          .step(&step.step_id)
          .metadata(meta([
            ("step_name", json!(step.step_name)),
            ("retry_attempt", json!(step.retry_attempt)),
            ("retry_delay_ms", json!(delay.as_millis() as u64)),
          ])),
      )
      .await?;

    Ok(step)
  }

  async fn ensure_retry_eligible(&self, step: &WorkflowStep) -> Result<(), EngineError> {
    if self.should_retry_step(step).await? {
      return Ok(());
    }
    Err(EngineError::invalid_transition(format!(
      "step {} is not eligible for retry (status {}, attempt {})",
      step.step_name,
      step.status.as_str(),
      step.retry_attempt
    )))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use docflow_config::AgentName;
  use docflow_store::Metadata;
  use sqlx::types::Json;

  fn failed_step(error_type: Option<ErrorType>, retry_attempt: i32) -> WorkflowStep {
    let now = Utc::now();
    WorkflowStep {
      step_id: "s1".to_string(),
      execution_id: "e1".to_string(),
      step_name: "write".to_string(),
      step_order: 1,
      agent_name: AgentName::Writer,
      status: StepStatus::Failed,
      started_at: Some(now),
      completed_at: Some(now),
      duration_ms: Some(0),
      input_data: None,
      output_data: None,
      error_type,
      error_message: Some("boom".to_string()),
      error_stack: None,
      retry_attempt,
      metadata: Json(Metadata::new()),
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn test_transient_failure_is_eligible() {
    assert!(is_retry_eligible(&failed_step(Some(ErrorType::Transient), 0), 3));
    assert!(is_retry_eligible(&failed_step(None, 2), 3));
  }

  #[test]
  fn test_fatal_and_validation_never_eligible() {
    for error_type in [ErrorType::Fatal, ErrorType::Validation] {
      for attempt in 0..3 {
        assert!(!is_retry_eligible(&failed_step(Some(error_type), attempt), 3));
      }
    }
  }

  #[test]
  fn test_budget_exhausted() {
    assert!(!is_retry_eligible(&failed_step(Some(ErrorType::Transient), 3), 3));
    assert!(!is_retry_eligible(&failed_step(Some(ErrorType::Transient), 0), 0));
  }

  #[test]
  fn test_only_failed_steps_are_eligible() {
    for status in [
      StepStatus::Pending,
      StepStatus::Running,
      StepStatus::Completed,
      StepStatus::Skipped,
    ] {
      let mut step = failed_step(Some(ErrorType::Transient), 0);
      step.status = status;
      assert!(!is_retry_eligible(&step, 3));
    }
  }

  #[test]
  fn test_retry_on_failure_flag() {
    let mut step = failed_step(Some(ErrorType::Transient), 0);
    step
      .metadata
      .insert("retry_on_failure".to_string(), json!(false));
    assert!(!is_retry_eligible(&step, 3));
  }
}
