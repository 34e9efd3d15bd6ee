//! Unified control actions, as accepted by a control endpoint.

use docflow_store::{WorkflowExecution, WorkflowStep};
use serde::{Deserialize, Serialize};

use crate::engine::WorkflowEngine;
use crate::error::EngineError;

/// A control request against one execution.
///
/// Deserializes from `{"action": "pause" | "resume" | "retry" | "fail", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlAction {
  Pause {
    #[serde(default)]
    actor_id: Option<String>,
  },
  Resume {
    #[serde(default)]
    actor_id: Option<String>,
  },
  Retry {
    step_id: String,
  },
  Fail {
    error_code: String,
    error_message: String,
  },
}

/// What a control action returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ControlOutcome {
  Execution(WorkflowExecution),
  Step(WorkflowStep),
}

impl WorkflowEngine {
  /// Apply a control action to an execution.
  pub async fn control(
    &self,
    execution_id: &str,
    action: ControlAction,
  ) -> Result<ControlOutcome, EngineError> {
    match action {
      ControlAction::Pause { actor_id } => self
        .pause_execution(execution_id, actor_id)
        .await
        .map(ControlOutcome::Execution),
      ControlAction::Resume { actor_id } => self
        .resume_execution(execution_id, actor_id)
        .await
        .map(ControlOutcome::Execution),
      ControlAction::Retry { step_id } => {
        let step = self.step(&step_id).await?;
        if step.execution_id != execution_id {
          return Err(EngineError::invalid_input(format!(
            "step {step_id} does not belong to execution {execution_id}"
          )));
        }
        self.retry_step(&step_id).await.map(ControlOutcome::Step)
      }
      ControlAction::Fail {
        error_code,
        error_message,
      } => {
        if error_code.trim().is_empty() || error_message.trim().is_empty() {
          return Err(EngineError::invalid_input(
            "fail requires error_code and error_message",
          ));
        }
        self
          .fail_execution(execution_id, &error_code, &error_message)
          .await
          .map(ControlOutcome::Execution)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_control_actions() {
    let pause: ControlAction = serde_json::from_value(json!({ "action": "pause" })).unwrap();
    assert_eq!(pause, ControlAction::Pause { actor_id: None });

    let retry: ControlAction =
      serde_json::from_value(json!({ "action": "retry", "step_id": "s1" })).unwrap();
    assert_eq!(
      retry,
      ControlAction::Retry {
        step_id: "s1".to_string()
      }
    );

    let fail: ControlAction = serde_json::from_value(json!({
      "action": "fail",
      "error_code": "E_AGENT",
      "error_message": "writer crashed"
    }))
    .unwrap();
    assert!(matches!(fail, ControlAction::Fail { .. }));
  }

  #[test]
  fn test_retry_requires_step_id() {
    let result = serde_json::from_value::<ControlAction>(json!({ "action": "retry" }));
    assert!(result.is_err());
  }
}
