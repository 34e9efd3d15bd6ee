//! Channel-fed execution runner.
//!
//! The `ExecutionRunner` owns an mpsc channel of execution ids and drives
//! them one at a time with a [`WorkflowDriver`], which keeps a single writer
//! per execution.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::driver::WorkflowDriver;
use crate::error::DriverError;

/// Drives executions submitted through its channel.
///
/// # Usage
///
/// ```ignore
/// let runner = ExecutionRunner::new(driver);
///
/// // Hand the sender to whatever creates executions
/// let sender = runner.sender();
///
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct ExecutionRunner {
  sender: mpsc::Sender<String>,
  receiver: mpsc::Receiver<String>,
  driver: Arc<WorkflowDriver>,
}

impl ExecutionRunner {
  pub fn new(driver: Arc<WorkflowDriver>) -> Self {
    Self::with_buffer_size(driver, 100)
  }

  pub fn with_buffer_size(driver: Arc<WorkflowDriver>, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      driver,
    }
  }

  /// A sender handle for submitting execution ids.
  pub fn sender(&self) -> mpsc::Sender<String> {
    self.sender.clone()
  }

  /// Queue an execution to be driven.
  pub async fn submit(&self, execution_id: impl Into<String>) -> Result<(), DriverError> {
    self
      .sender
      .send(execution_id.into())
      .await
      .map_err(|_| DriverError::ChannelClosed)
  }

  /// Start the loop.
  ///
  /// Runs until `cancel` fires or every sender is gone. An execution in
  /// flight when `cancel` fires is paused by its driver.
  pub async fn start(self, cancel: CancellationToken) -> Result<(), DriverError> {
    let Self {
      sender,
      mut receiver,
      driver,
    } = self;
    // Only external senders keep the channel open.
    drop(sender);

    info!("starting execution runner");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("execution runner cancelled");
          break;
        }
        next = receiver.recv() => {
          let Some(execution_id) = next else {
            info!("execution runner channel closed");
            break;
          };

          match driver.run(&execution_id, cancel.child_token()).await {
            Ok(outcome) => {
              info!(execution_id = %execution_id, outcome = ?outcome, "execution driven");
            }
            Err(e) => {
              error!(execution_id = %execution_id, error = %e, "execution driver failed");
            }
          }
        }
      }
    }

    Ok(())
  }
}
