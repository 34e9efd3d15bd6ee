//! Orchestrator error types.

use docflow_engine::EngineError;

/// Errors that stop a driver.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
  /// An engine operation failed.
  #[error(transparent)]
  Engine(#[from] EngineError),

  /// The agent request could not be encoded.
  #[error("failed to encode agent request: {0}")]
  Request(#[from] serde_json::Error),

  /// The runner is no longer accepting executions.
  #[error("execution runner channel closed")]
  ChannelClosed,
}

/// Errors from invoking an agent. The driver turns them into transient step
/// failures.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
  /// The agent process could not be started.
  #[error("failed to spawn '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// Talking to the agent process failed.
  #[error("agent i/o failed: {0}")]
  Io(#[from] std::io::Error),

  /// The agent process exited unsuccessfully.
  #[error("'{program}' exited with {status}: {stderr}")]
  ExitStatus {
    program: String,
    status: String,
    stderr: String,
  },

  /// The agent's output was not a valid result.
  #[error("invalid agent output: {message}")]
  InvalidOutput { message: String },

  /// Any other invocation failure.
  #[error("agent invocation failed: {message}")]
  Failed { message: String },
}
