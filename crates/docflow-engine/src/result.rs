//! The result shape agents hand back to the engine.

use docflow_store::{ErrorType, Metadata};
use serde::{Deserialize, Serialize};

/// Outcome of one agent invocation, consumed by
/// [`crate::WorkflowEngine::complete_step`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<AgentError>,
  /// Merged into the step's metadata (model used, tokens consumed, ...).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata: Option<Metadata>,
}

/// Failure details of an agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentError {
  #[serde(rename = "type")]
  pub error_type: ErrorType,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
}

impl AgentResult {
  pub fn success(data: serde_json::Value) -> Self {
    Self {
      success: true,
      data: Some(data),
      error: None,
      metadata: None,
    }
  }

  pub fn failure(error_type: ErrorType, message: impl Into<String>) -> Self {
    Self {
      success: false,
      data: None,
      error: Some(AgentError {
        error_type,
        message: message.into(),
        code: None,
      }),
      metadata: None,
    }
  }

  pub fn with_metadata(mut self, metadata: Metadata) -> Self {
    self.metadata = Some(metadata);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_failure_result() {
    let result: AgentResult = serde_json::from_value(json!({
      "success": false,
      "error": { "type": "transient", "message": "timeout", "code": "ETIMEDOUT" }
    }))
    .unwrap();

    let error = result.error.unwrap();
    assert_eq!(error.error_type, ErrorType::Transient);
    assert_eq!(error.code.as_deref(), Some("ETIMEDOUT"));
    assert!(result.data.is_none());
  }

  #[test]
  fn test_parse_minimal_success() {
    let result: AgentResult = serde_json::from_value(json!({ "success": true })).unwrap();
    assert!(result.success);
    assert!(result.error.is_none());
  }
}
