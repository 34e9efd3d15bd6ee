//! Request shapes for engine operations.

use chrono::{DateTime, Utc};
use docflow_config::DocumentType;
use docflow_store::{Metadata, WorkflowState};
use serde::{Deserialize, Serialize};

/// Input for [`crate::WorkflowEngine::create_execution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateExecution {
  pub project_id: String,
  pub document_type: DocumentType,
  #[serde(default)]
  pub document_id: Option<String>,
  pub workflow_name: String,
  #[serde(default)]
  pub triggered_by: Option<String>,
  #[serde(default)]
  pub metadata: Option<Metadata>,
}

impl CreateExecution {
  /// Input bound to the document type's default workflow
  /// (`<document_type>-generation`).
  pub fn new(project_id: impl Into<String>, document_type: DocumentType) -> Self {
    Self {
      project_id: project_id.into(),
      document_type,
      document_id: None,
      workflow_name: document_type.default_workflow_name(),
      triggered_by: None,
      metadata: None,
    }
  }

  pub fn workflow_name(mut self, name: impl Into<String>) -> Self {
    self.workflow_name = name.into();
    self
  }

  pub fn triggered_by(mut self, actor: impl Into<String>) -> Self {
    self.triggered_by = Some(actor.into());
    self
  }

  pub fn document_id(mut self, id: impl Into<String>) -> Self {
    self.document_id = Some(id.into());
    self
  }

  pub fn metadata(mut self, metadata: Metadata) -> Self {
    self.metadata = Some(metadata);
    self
  }
}

/// Partial update of an execution. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionUpdate {
  pub current_state: Option<WorkflowState>,
  pub current_step: Option<String>,
  pub percent_complete: Option<i32>,
  pub completed_at: Option<DateTime<Utc>>,
  pub paused_at: Option<DateTime<Utc>>,
  pub resumed_at: Option<DateTime<Utc>>,
  pub error_code: Option<String>,
  pub error_message: Option<String>,
  pub retry_count: Option<i32>,
  pub checkpoint_data: Option<serde_json::Value>,
  /// Replaces the whole metadata map.
  pub metadata: Option<Metadata>,
}

/// Partial update of a step's payload. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepUpdate {
  pub input_data: Option<serde_json::Value>,
  pub output_data: Option<serde_json::Value>,
  /// Shallow-merged into the existing metadata.
  pub metadata: Option<Metadata>,
}
