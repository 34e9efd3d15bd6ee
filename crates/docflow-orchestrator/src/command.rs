//! Agents backed by external commands.

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use docflow_engine::AgentResult;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::agent::{AgentInvoker, AgentRequest};
use crate::error::InvokeError;

/// Runs an agent as a child process.
///
/// The [`AgentRequest`] is written to the process's stdin as JSON and an
/// [`AgentResult`] is read back from its stdout. The process is killed if
/// the invocation is dropped (timeout or cancellation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAgent {
  pub program: String,
  #[serde(default)]
  pub args: Vec<String>,
}

impl CommandAgent {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }
}

#[async_trait]
impl AgentInvoker for CommandAgent {
  async fn invoke(&self, request: AgentRequest) -> Result<AgentResult, InvokeError> {
    let input = serde_json::to_vec(&request).map_err(|e| InvokeError::Failed {
      message: format!("failed to encode request: {e}"),
    })?;

    let mut child = Command::new(&self.program)
      .args(&self.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| InvokeError::Spawn {
        program: self.program.clone(),
        source,
      })?;

    // Feed stdin while stdout is drained, so neither side can fill its pipe
    // and stall the other.
    let stdin = child.stdin.take();
    let write = async move {
      let Some(mut stdin) = stdin else {
        return Ok(());
      };
      // Dropping stdin at the end closes it, which signals end of request.
      match stdin.write_all(&input).await {
        // The agent may answer without reading its whole request.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
          debug!(error = %e, "agent closed stdin early");
          Ok(())
        }
        other => other,
      }
    };
    let (written, output) = tokio::join!(write, child.wait_with_output());
    let output = output?;
    written?;
    debug!(
      program = %self.program,
      step_id = %request.step_id,
      status = %output.status,
      stdout_bytes = output.stdout.len(),
      "agent process exited"
    );

    if !output.status.success() {
      return Err(InvokeError::ExitStatus {
        program: self.program.clone(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    serde_json::from_slice(&output.stdout).map_err(|e| InvokeError::InvalidOutput {
      message: e.to_string(),
    })
  }
}
