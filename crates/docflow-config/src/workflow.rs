use serde::{Deserialize, Serialize};

use crate::document::{AgentName, DocumentType};

/// A named, versioned pipeline template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
  pub name: String,
  pub version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub document_type: DocumentType,
  pub steps: Vec<StepDefinition>,
  #[serde(default = "default_true")]
  pub is_active: bool,
  #[serde(default)]
  pub is_default: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_by: Option<String>,
  #[serde(default)]
  pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// One entry of a definition's ordered step list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
  pub name: String,
  pub agent: AgentName,
  #[serde(default)]
  pub description: String,
  /// May run concurrently with adjacent parallel steps.
  #[serde(default)]
  pub parallel: bool,
  /// Optional steps are skipped instead of failing the workflow.
  #[serde(default = "default_true")]
  pub required: bool,
  #[serde(default = "default_timeout_minutes")]
  pub timeout_minutes: u32,
  #[serde(default = "default_true")]
  pub retry_on_failure: bool,
}

impl StepDefinition {
  /// A required, sequential step with default timeout and retry policy.
  pub fn new(name: impl Into<String>, agent: AgentName) -> Self {
    Self {
      name: name.into(),
      agent,
      description: String::new(),
      parallel: false,
      required: true,
      timeout_minutes: default_timeout_minutes(),
      retry_on_failure: true,
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_timeout_minutes() -> u32 {
  60
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_step_defaults_applied() {
    let step: StepDefinition = serde_json::from_value(json!({
      "name": "enrich",
      "agent": "regdata"
    }))
    .unwrap();

    assert_eq!(step, StepDefinition::new("enrich", AgentName::Regdata));
  }

  #[test]
  fn test_definition_deserializes() {
    let def: WorkflowDefinition = serde_json::from_value(json!({
      "name": "ib-generation",
      "version": "1.0.0",
      "document_type": "ib",
      "steps": [
        { "name": "enrich", "agent": "regdata", "timeout_minutes": 10 },
        { "name": "compose", "agent": "composer", "retry_on_failure": false },
        { "name": "write", "agent": "writer", "parallel": true, "required": false }
      ]
    }))
    .unwrap();

    assert!(def.is_active);
    assert!(!def.is_default);
    assert_eq!(def.steps.len(), 3);
    assert_eq!(def.steps[0].timeout_minutes, 10);
    assert!(!def.steps[1].retry_on_failure);
    assert!(def.steps[2].parallel);
    assert!(!def.steps[2].required);
  }
}
