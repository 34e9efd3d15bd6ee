//! Status snapshots and display helpers.

use docflow_store::{StepStatus, WorkflowEvent, WorkflowExecution, WorkflowStep};
use serde::Serialize;

use crate::engine::WorkflowEngine;
use crate::error::EngineError;

pub use docflow_store::percent_complete;

/// Point-in-time view of an execution for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStatus {
  pub execution: WorkflowExecution,
  pub steps_completed: usize,
  pub steps_total: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub steps: Option<Vec<WorkflowStep>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub events: Option<Vec<WorkflowEvent>>,
}

impl WorkflowEngine {
  /// Snapshot of an execution. Steps and events are best-effort reads; the
  /// execution itself must exist.
  pub async fn status(
    &self,
    execution_id: &str,
    include_steps: bool,
    include_events: bool,
  ) -> Result<ExecutionStatus, EngineError> {
    let execution = self
      .get_execution(execution_id)
      .await
      .ok_or_else(|| EngineError::not_found("execution", execution_id))?;

    let steps = self.get_steps(execution_id).await;
    let steps_completed = steps
      .iter()
      .filter(|s| s.status == StepStatus::Completed)
      .count();
    let steps_total = steps.len();

    let events = if include_events {
      Some(self.get_events(execution_id).await)
    } else {
      None
    };

    Ok(ExecutionStatus {
      execution,
      steps_completed,
      steps_total,
      steps: include_steps.then_some(steps),
      events,
    })
  }
}

/// Human-readable duration: `850ms`, `12.5s`, `3.2m`, `1.5h`.
pub fn format_duration(ms: i64) -> String {
  const SECOND: i64 = 1_000;
  const MINUTE: i64 = 60 * SECOND;
  const HOUR: i64 = 60 * MINUTE;

  if ms < SECOND {
    format!("{ms}ms")
  } else if ms < MINUTE {
    format!("{:.1}s", ms as f64 / SECOND as f64)
  } else if ms < HOUR {
    format!("{:.1}m", ms as f64 / MINUTE as f64)
  } else {
    format!("{:.1}h", ms as f64 / HOUR as f64)
  }
}
