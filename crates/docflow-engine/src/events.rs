//! Audit event recording.

use chrono::Utc;
use docflow_store::{ActorType, EventType, Metadata, WorkflowEvent, WorkflowState};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use tracing::{debug, error, warn};

use crate::engine::WorkflowEngine;
use crate::error::EngineError;

/// Input for [`WorkflowEngine::record_event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
  pub execution_id: String,
  pub event_type: EventType,
  #[serde(default)]
  pub event_data: Option<serde_json::Value>,
  #[serde(default)]
  pub actor_id: Option<String>,
  /// Defaults to `system`.
  #[serde(default)]
  pub actor_type: Option<ActorType>,
  #[serde(default)]
  pub step_id: Option<String>,
  #[serde(default)]
  pub previous_state: Option<WorkflowState>,
  #[serde(default)]
  pub new_state: Option<WorkflowState>,
  #[serde(default)]
  pub metadata: Option<Metadata>,
}

impl NewEvent {
  pub fn new(execution_id: impl Into<String>, event_type: EventType) -> Self {
    Self {
      execution_id: execution_id.into(),
      event_type,
      event_data: None,
      actor_id: None,
      actor_type: None,
      step_id: None,
      previous_state: None,
      new_state: None,
      metadata: None,
    }
  }

  pub fn actor(mut self, actor_id: Option<String>, actor_type: ActorType) -> Self {
    self.actor_id = actor_id;
    self.actor_type = Some(actor_type);
    self
  }

  /// Attribute the event to `actor_id` as a user, or to the system when absent.
  pub fn user_or_system(self, actor_id: Option<String>) -> Self {
    let actor_type = if actor_id.is_some() {
      ActorType::User
    } else {
      ActorType::System
    };
    self.actor(actor_id, actor_type)
  }

  pub fn step(mut self, step_id: impl Into<String>) -> Self {
    self.step_id = Some(step_id.into());
    self
  }

  pub fn states(mut self, previous: Option<WorkflowState>, new: WorkflowState) -> Self {
    self.previous_state = previous;
    self.new_state = Some(new);
    self
  }

  pub fn data(mut self, data: serde_json::Value) -> Self {
    self.event_data = Some(data);
    self
  }

  pub fn metadata(mut self, metadata: Metadata) -> Self {
    self.metadata = Some(metadata);
    self
  }
}

impl WorkflowEngine {
  /// Append an event to the audit trail.
  ///
  /// Store failures always propagate: a lost event means a corrupted trail.
  pub async fn record_event(&self, input: NewEvent) -> Result<WorkflowEvent, EngineError> {
    if input.execution_id.trim().is_empty() {
      return Err(EngineError::invalid_input("event requires an execution_id"));
    }

    let event = WorkflowEvent {
      event_id: uuid::Uuid::new_v4().to_string(),
      execution_id: input.execution_id,
      event_type: input.event_type,
      event_data: input.event_data.map(Json),
      actor_id: input.actor_id,
      actor_type: input.actor_type.unwrap_or_default(),
      step_id: input.step_id,
      previous_state: input.previous_state,
      new_state: input.new_state,
      metadata: input.metadata.map(Json),
      created_at: Utc::now(),
    };

    if let Err(e) = self.store.insert_event(&event).await {
      error!(
        execution_id = %event.execution_id,
        event_type = ?event.event_type,
        error = %e,
        "failed to record workflow event"
      );
      return Err(e.into());
    }

    debug!(
      execution_id = %event.execution_id,
      event_id = %event.event_id,
      event_type = ?event.event_type,
      "event_recorded"
    );

    Ok(event)
  }

  /// Events of an execution, newest first. Degrades to an empty list when
  /// the store cannot be read.
  pub async fn get_events(&self, execution_id: &str) -> Vec<WorkflowEvent> {
    match self.store.list_events(execution_id).await {
      Ok(events) => events,
      Err(e) => {
        warn!(execution_id = %execution_id, error = %e, "failed to read workflow events");
        Vec::new()
      }
    }
  }
}

/// Build a metadata map from key/value pairs.
pub(crate) fn meta<const N: usize>(entries: [(&str, serde_json::Value); N]) -> Metadata {
  entries
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
