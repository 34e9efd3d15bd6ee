//! Agent invocation seam.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use docflow_config::{AgentName, DocumentType};
use docflow_engine::{AgentResult, Metadata};
use serde::{Deserialize, Serialize};

use crate::error::InvokeError;

/// Everything an agent gets to work with for one step attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
  pub execution_id: String,
  pub step_id: String,
  pub step_name: String,
  pub agent: AgentName,
  pub project_id: String,
  pub document_type: DocumentType,
  #[serde(default)]
  pub document_id: Option<String>,
  /// Zero on the first attempt.
  pub attempt: i32,
  /// The step's metadata (description, timeout, flags).
  #[serde(default)]
  pub metadata: Metadata,
  /// Checkpoint saved on the execution, if any.
  #[serde(default)]
  pub checkpoint: Option<serde_json::Value>,
  /// Outputs of completed steps, keyed by step name.
  #[serde(default)]
  pub upstream: BTreeMap<String, serde_json::Value>,
}

/// Runs one agent.
///
/// Implementations report domain failures as an unsuccessful
/// [`AgentResult`]; `Err` is reserved for failing to reach the agent at all.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
  async fn invoke(&self, request: AgentRequest) -> Result<AgentResult, InvokeError>;
}

/// Binds agent names to invokers.
#[derive(Clone, Default)]
pub struct AgentRegistry {
  invokers: HashMap<AgentName, Arc<dyn AgentInvoker>>,
}

impl AgentRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register (or replace) the invoker for `agent`.
  pub fn register(&mut self, agent: AgentName, invoker: Arc<dyn AgentInvoker>) {
    self.invokers.insert(agent, invoker);
  }

  /// Builder form of [`register`](Self::register).
  pub fn with(mut self, agent: AgentName, invoker: Arc<dyn AgentInvoker>) -> Self {
    self.register(agent, invoker);
    self
  }

  pub fn get(&self, agent: AgentName) -> Option<Arc<dyn AgentInvoker>> {
    self.invokers.get(&agent).cloned()
  }

  pub fn agents(&self) -> impl Iterator<Item = AgentName> + '_ {
    self.invokers.keys().copied()
  }

  pub fn len(&self) -> usize {
    self.invokers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.invokers.is_empty()
  }
}
