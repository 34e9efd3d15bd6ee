use chrono::{DateTime, Utc};
use docflow_config::{AgentName, DocumentType, Stage};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Freeform top-level map carried by executions, steps and events.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// `round(100 * completed / total)` with halves rounded up; `0` when there
/// are no steps.
pub fn percent_complete(completed: usize, total: usize) -> i32 {
  if total == 0 {
    return 0;
  }
  let percent = (200 * completed.min(total) + total) / (2 * total);
  percent as i32
}

/// State of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum WorkflowState {
  Created,
  Enriching,
  Enriched,
  Composing,
  Composed,
  Writing,
  Written,
  Validating,
  Validated,
  Assembling,
  Assembled,
  Exporting,
  Completed,
  Failed,
  Paused,
}

impl WorkflowState {
  pub const ALL: [WorkflowState; 15] = [
    WorkflowState::Created,
    WorkflowState::Enriching,
    WorkflowState::Enriched,
    WorkflowState::Composing,
    WorkflowState::Composed,
    WorkflowState::Writing,
    WorkflowState::Written,
    WorkflowState::Validating,
    WorkflowState::Validated,
    WorkflowState::Assembling,
    WorkflowState::Assembled,
    WorkflowState::Exporting,
    WorkflowState::Completed,
    WorkflowState::Failed,
    WorkflowState::Paused,
  ];

  /// `completed` and `failed` end an execution.
  pub fn is_terminal(&self) -> bool {
    matches!(self, WorkflowState::Completed | WorkflowState::Failed)
  }

  /// State held while agents of `stage` are working.
  pub fn running(stage: Stage) -> WorkflowState {
    match stage {
      Stage::Enrichment => WorkflowState::Enriching,
      Stage::Composition => WorkflowState::Composing,
      Stage::Writing => WorkflowState::Writing,
      Stage::Validation => WorkflowState::Validating,
      Stage::Assembly => WorkflowState::Assembling,
      Stage::Export => WorkflowState::Exporting,
    }
  }

  /// State reached once `stage` has produced its result. Export has none;
  /// finishing it completes the execution.
  pub fn finished(stage: Stage) -> Option<WorkflowState> {
    match stage {
      Stage::Enrichment => Some(WorkflowState::Enriched),
      Stage::Composition => Some(WorkflowState::Composed),
      Stage::Writing => Some(WorkflowState::Written),
      Stage::Validation => Some(WorkflowState::Validated),
      Stage::Assembly => Some(WorkflowState::Assembled),
      Stage::Export => None,
    }
  }

  pub fn display_name(&self) -> &'static str {
    match self {
      WorkflowState::Created => "Created",
      WorkflowState::Enriching => "Enriching Data",
      WorkflowState::Enriched => "Data Enriched",
      WorkflowState::Composing => "Composing Structure",
      WorkflowState::Composed => "Structure Ready",
      WorkflowState::Writing => "Writing Content",
      WorkflowState::Written => "Content Written",
      WorkflowState::Validating => "Validating",
      WorkflowState::Validated => "Validated",
      WorkflowState::Assembling => "Assembling Document",
      WorkflowState::Assembled => "Document Assembled",
      WorkflowState::Exporting => "Exporting",
      WorkflowState::Completed => "Completed",
      WorkflowState::Failed => "Failed",
      WorkflowState::Paused => "Paused",
    }
  }
}

/// Status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StepStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Skipped,
}

impl StepStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      StepStatus::Pending => "pending",
      StepStatus::Running => "running",
      StepStatus::Completed => "completed",
      StepStatus::Failed => "failed",
      StepStatus::Skipped => "skipped",
    }
  }

  pub fn display_name(&self) -> &'static str {
    match self {
      StepStatus::Pending => "Pending",
      StepStatus::Running => "Running",
      StepStatus::Completed => "Completed",
      StepStatus::Failed => "Failed",
      StepStatus::Skipped => "Skipped",
    }
  }
}

/// Classification of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ErrorType {
  /// Network errors and the like; retried automatically.
  Transient,
  /// Bad data; needs a fix before another attempt.
  Validation,
  /// Unrecoverable; fails the workflow.
  Fatal,
}

impl ErrorType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorType::Transient => "transient",
      ErrorType::Validation => "validation",
      ErrorType::Fatal => "fatal",
    }
  }
}

/// Kind of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EventType {
  Started,
  /// Step lifecycle signal; `metadata.status` tells start, completion and skip apart.
  StepCompleted,
  StateChanged,
  Paused,
  Resumed,
  Failed,
  Completed,
  Retry,
}

/// Who caused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActorType {
  User,
  #[default]
  System,
  Agent,
}

/// A workflow execution as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecution {
  pub execution_id: String,
  pub project_id: String,
  pub document_type: DocumentType,
  pub document_id: Option<String>,
  pub workflow_name: String,
  pub workflow_version: String,
  pub current_state: WorkflowState,
  pub current_step: Option<String>,
  pub percent_complete: i32,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub paused_at: Option<DateTime<Utc>>,
  pub resumed_at: Option<DateTime<Utc>>,
  pub error_code: Option<String>,
  pub error_message: Option<String>,
  pub retry_count: i32,
  pub max_retries: i32,
  pub checkpoint_data: Option<Json<serde_json::Value>>,
  pub triggered_by: Option<String>,
  pub metadata: Json<Metadata>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A step of an execution as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowStep {
  pub step_id: String,
  pub execution_id: String,
  pub step_name: String,
  pub step_order: i32,
  pub agent_name: AgentName,
  pub status: StepStatus,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub duration_ms: Option<i64>,
  pub input_data: Option<Json<serde_json::Value>>,
  pub output_data: Option<Json<serde_json::Value>>,
  pub error_type: Option<ErrorType>,
  pub error_message: Option<String>,
  pub error_stack: Option<String>,
  pub retry_attempt: i32,
  pub metadata: Json<Metadata>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl WorkflowStep {
  fn flag(&self, key: &str) -> Option<bool> {
    self.metadata.get(key).and_then(serde_json::Value::as_bool)
  }

  /// `retry_on_failure` from the definition, `true` when absent.
  pub fn retry_on_failure(&self) -> bool {
    self.flag("retry_on_failure").unwrap_or(true)
  }

  /// Whether the step may run alongside adjacent parallel steps.
  pub fn parallel(&self) -> bool {
    self.flag("parallel").unwrap_or(false)
  }

  /// Whether failing this step fails the execution. Defaults to `true`.
  pub fn required(&self) -> bool {
    self.flag("required").unwrap_or(true)
  }

  /// Per-step timeout in minutes, if the definition set one.
  pub fn timeout_minutes(&self) -> Option<u64> {
    self
      .metadata
      .get("timeout_minutes")
      .and_then(serde_json::Value::as_u64)
  }
}

/// An audit event as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowEvent {
  pub event_id: String,
  pub execution_id: String,
  pub event_type: EventType,
  pub event_data: Option<Json<serde_json::Value>>,
  pub actor_id: Option<String>,
  pub actor_type: ActorType,
  pub step_id: Option<String>,
  pub previous_state: Option<WorkflowState>,
  pub new_state: Option<WorkflowState>,
  pub metadata: Option<Json<Metadata>>,
  pub created_at: DateTime<Utc>,
}
