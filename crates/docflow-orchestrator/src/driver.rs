//! The driver loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use docflow_engine::{
  AgentResult, ErrorType, StepStatus, StepUpdate, WorkflowEngine, WorkflowExecution,
  WorkflowState, WorkflowStep,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::agent::{AgentRegistry, AgentRequest};
use crate::error::DriverError;

/// Configuration for the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
  /// Upper bound on steps invoked concurrently from one parallel batch.
  pub max_parallel_steps: usize,
}

impl Default for DriverConfig {
  fn default() -> Self {
    Self {
      max_parallel_steps: 4,
    }
  }
}

/// How a driver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
  Completed,
  Failed,
  /// Paused by an operator or by cancellation; resumable.
  Paused,
}

/// What happened to one step of a batch.
enum StepRun {
  Finished(WorkflowStep),
  /// Cancelled mid-invocation; the step went back to `pending`.
  Cancelled,
}

/// Drives executions to a terminal or paused state.
pub struct WorkflowDriver {
  engine: Arc<WorkflowEngine>,
  agents: AgentRegistry,
  config: DriverConfig,
}

impl WorkflowDriver {
  pub fn new(engine: Arc<WorkflowEngine>, agents: AgentRegistry, config: DriverConfig) -> Self {
    Self {
      engine,
      agents,
      config,
    }
  }

  pub fn engine(&self) -> &Arc<WorkflowEngine> {
    &self.engine
  }

  /// Run an execution until it completes, fails or pauses.
  ///
  /// Cancelling `cancel` pauses the execution: steps in flight are returned
  /// to `pending` and the execution can be resumed and driven again later.
  #[instrument(
    name = "driver_run",
    skip(self, execution_id, cancel),
    fields(execution_id = %execution_id)
  )]
  pub async fn run(
    &self,
    execution_id: &str,
    cancel: CancellationToken,
  ) -> Result<DriveOutcome, DriverError> {
    info!(execution_id = %execution_id, "driver_started");

    loop {
      let execution = self.engine.execution(execution_id).await?;
      match execution.current_state {
        WorkflowState::Completed => return Ok(DriveOutcome::Completed),
        WorkflowState::Failed => return Ok(DriveOutcome::Failed),
        WorkflowState::Paused => return Ok(DriveOutcome::Paused),
        _ => {}
      }

      if cancel.is_cancelled() {
        self.engine.pause_execution(execution_id, None).await?;
        warn!(execution_id = %execution_id, "driver cancelled, execution paused");
        return Ok(DriveOutcome::Paused);
      }

      let steps = self.engine.steps(execution_id).await?;

      // Nothing runs between iterations, so a running step was abandoned
      // by an earlier driver.
      let stale: Vec<_> = steps
        .iter()
        .filter(|s| s.status == StepStatus::Running)
        .collect();
      if !stale.is_empty() {
        for step in stale {
          warn!(execution_id = %execution_id, step_name = %step.step_name, "requeueing stale step");
          self.engine.requeue_step(&step.step_id).await?;
        }
        continue;
      }

      if let Some(failed) = steps.iter().find(|s| s.status == StepStatus::Failed) {
        if let Some(outcome) = self.resolve_failure(failed, &cancel).await? {
          return Ok(outcome);
        }
        continue;
      }

      let batch = self.next_batch(execution_id, &steps).await?;
      if batch.is_empty() {
        self.engine.complete_execution(execution_id).await?;
        info!(execution_id = %execution_id, "driver_completed");
        return Ok(DriveOutcome::Completed);
      }

      self.run_batch(&execution, &steps, &batch, &cancel).await?;
    }
  }

  /// The next pending step plus, when it is parallel, the contiguous pending
  /// parallel steps after it.
  async fn next_batch(
    &self,
    execution_id: &str,
    steps: &[WorkflowStep],
  ) -> Result<Vec<WorkflowStep>, DriverError> {
    let Some(head) = self.engine.get_next_step(execution_id).await? else {
      return Ok(Vec::new());
    };

    let limit = self.config.max_parallel_steps.max(1);
    let mut batch = vec![head.clone()];
    if head.parallel() {
      batch.extend(
        steps
          .iter()
          .filter(|s| s.step_order > head.step_order)
          .take_while(|s| s.status == StepStatus::Pending && s.parallel())
          .take(limit - 1)
          .cloned(),
      );
    }
    Ok(batch)
  }

  async fn run_batch(
    &self,
    execution: &WorkflowExecution,
    steps: &[WorkflowStep],
    batch: &[WorkflowStep],
    cancel: &CancellationToken,
  ) -> Result<(), DriverError> {
    let execution_id = &execution.execution_id;
    let stage = batch[0].agent_name.stage();
    let running = WorkflowState::running(stage);
    if execution.current_state != running {
      self
        .engine
        .transition_state(execution_id, running, None)
        .await?;
    }

    let upstream: BTreeMap<String, serde_json::Value> = steps
      .iter()
      .filter(|s| s.status == StepStatus::Completed)
      .filter_map(|s| {
        s.output_data
          .as_ref()
          .map(|output| (s.step_name.clone(), output.0.clone()))
      })
      .collect();

    info!(
      execution_id = %execution_id,
      steps = ?batch.iter().map(|s| s.step_name.as_str()).collect::<Vec<_>>(),
      "executing batch"
    );

    let runs = futures::future::join_all(
      batch
        .iter()
        .map(|step| self.run_step(execution, step, &upstream, cancel)),
    )
    .await;

    let mut all_completed = true;
    for run in runs {
      match run? {
        StepRun::Finished(step) => all_completed &= step.status == StepStatus::Completed,
        StepRun::Cancelled => all_completed = false,
      }
    }

    let Some(done) = WorkflowState::finished(stage) else {
      return Ok(());
    };
    if all_completed {
      // An operator may have paused the execution while the batch ran.
      let current = self.engine.execution(execution_id).await?;
      if current.current_state == running {
        self.engine.transition_state(execution_id, done, None).await?;
      }
    }
    Ok(())
  }

  #[instrument(
    name = "driver_step",
    skip(self, execution, step, upstream, cancel),
    fields(step_name = %step.step_name, agent = %step.agent_name)
  )]
  async fn run_step(
    &self,
    execution: &WorkflowExecution,
    step: &WorkflowStep,
    upstream: &BTreeMap<String, serde_json::Value>,
    cancel: &CancellationToken,
  ) -> Result<StepRun, DriverError> {
    let request = AgentRequest {
      execution_id: execution.execution_id.clone(),
      step_id: step.step_id.clone(),
      step_name: step.step_name.clone(),
      agent: step.agent_name,
      project_id: execution.project_id.clone(),
      document_type: execution.document_type,
      document_id: execution.document_id.clone(),
      attempt: step.retry_attempt,
      metadata: step.metadata.0.clone(),
      checkpoint: execution.checkpoint_data.as_ref().map(|c| c.0.clone()),
      upstream: upstream.clone(),
    };

    self
      .engine
      .update_step(
        &step.step_id,
        StepUpdate {
          input_data: Some(serde_json::to_value(&request)?),
          ..Default::default()
        },
      )
      .await?;
    self.engine.start_step(&step.step_id).await?;

    let timeout = step_timeout(step, self.engine.config().step_timeout());

    let result = match self.agents.get(step.agent_name) {
      None => AgentResult::failure(
        ErrorType::Fatal,
        format!("no invoker registered for agent {}", step.agent_name),
      ),
      Some(invoker) => {
        tokio::select! {
          _ = cancel.cancelled() => {
            self.engine.requeue_step(&step.step_id).await?;
            warn!(step_name = %step.step_name, "step cancelled, requeued");
            return Ok(StepRun::Cancelled);
          }
          outcome = tokio::time::timeout(timeout, invoker.invoke(request)) => match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => AgentResult::failure(ErrorType::Transient, e.to_string()),
            Err(_) => AgentResult::failure(
              ErrorType::Transient,
              format!("agent timed out after {}s", timeout.as_secs()),
            ),
          },
        }
      }
    };

    let step = self.engine.complete_step(&step.step_id, result).await?;
    Ok(StepRun::Finished(step))
  }

  /// Retry, skip or give up on a failed step. Returns an outcome when the
  /// run is over.
  async fn resolve_failure(
    &self,
    step: &WorkflowStep,
    cancel: &CancellationToken,
  ) -> Result<Option<DriveOutcome>, DriverError> {
    if self.engine.should_retry_step(step).await? {
      tokio::select! {
        // Backoff is abandoned untouched; the step stays failed for the next run.
        _ = cancel.cancelled() => {}
        retried = self.engine.retry_step(&step.step_id) => {
          retried?;
        }
      }
      return Ok(None);
    }

    if !step.required() && step.error_type != Some(ErrorType::Fatal) {
      self
        .engine
        .skip_step(&step.step_id, step.error_message.as_deref())
        .await?;
      return Ok(None);
    }

    let message = format!(
      "step '{}' failed: {}",
      step.step_name,
      step.error_message.as_deref().unwrap_or("unknown error")
    );
    self
      .engine
      .fail_execution(&step.execution_id, "step_failed", &message)
      .await?;
    warn!(
      execution_id = %step.execution_id,
      step_name = %step.step_name,
      "driver_failed"
    );
    Ok(Some(DriveOutcome::Failed))
  }
}

/// The step's own timeout, or `default` when its definition set none.
fn step_timeout(step: &WorkflowStep, default: Duration) -> Duration {
  step
    .timeout_minutes()
    .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
    .unwrap_or(default)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use docflow_config::AgentName;
  use docflow_engine::Metadata;
  use serde_json::json;
  use sqlx::types::Json;

  fn step(metadata: Metadata) -> WorkflowStep {
    let now = Utc::now();
    WorkflowStep {
      step_id: "s1".to_string(),
      execution_id: "e1".to_string(),
      step_name: "write".to_string(),
      step_order: 1,
      agent_name: AgentName::Writer,
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

  #[test]
  fn test_step_timeout_falls_back_to_default() {
    let default = Duration::from_secs(3600);
    assert_eq!(step_timeout(&step(Metadata::new()), default), default);

    let mut metadata = Metadata::new();
    metadata.insert("timeout_minutes".to_string(), json!(2));
    assert_eq!(step_timeout(&step(metadata), default), Duration::from_secs(120));
  }

  #[test]
  fn test_step_timeout_saturates() {
    let mut metadata = Metadata::new();
    metadata.insert("timeout_minutes".to_string(), json!(u64::MAX));
    assert_eq!(
      step_timeout(&step(metadata), Duration::ZERO),
      Duration::from_secs(u64::MAX)
    );
  }
}
