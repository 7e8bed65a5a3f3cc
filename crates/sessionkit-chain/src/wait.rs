//! Polling an operation until it reaches a terminal status.

use std::time::Duration;

use tokio::time::Instant;

use sessionkit_core::OperationId;

use crate::error::{ChainError, Result};
use crate::operation::{ExecutionReceipt, OperationStatus, ReceiptStatus};
use crate::traits::Broadcaster;

/// How long and how often to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Confirmations needed before a receipt is returned.
    pub required_confirmations: u32,

    /// Delay between polls.
    pub poll_interval: Duration,

    /// Give up waiting (not the operation) at this instant.
    pub deadline: Option<Instant>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            required_confirmations: 1,
            poll_interval: Duration::from_millis(2000),
            deadline: None,
        }
    }
}

impl WaitOptions {
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

/// Poll `operation` until it is confirmed enough times or fails.
///
/// With no deadline this waits indefinitely. When the deadline passes the
/// wait ends with [`ChainError::WaitElapsed`]; the operation itself is not
/// affected and may be waited on again.
pub async fn wait_for_receipt<B: Broadcaster + ?Sized>(
    broadcaster: &B,
    operation: &OperationId,
    options: &WaitOptions,
) -> Result<ExecutionReceipt> {
    let polling = poll_until_terminal(broadcaster, operation, options);
    match options.deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, polling)
            .await
            .map_err(|_| ChainError::WaitElapsed(*operation))?,
        None => polling.await,
    }
}

async fn poll_until_terminal<B: Broadcaster + ?Sized>(
    broadcaster: &B,
    operation: &OperationId,
    options: &WaitOptions,
) -> Result<ExecutionReceipt> {
    let required = options.required_confirmations.max(1);
    loop {
        match broadcaster.poll(operation).await? {
            OperationStatus::Confirmed { confirmations } if confirmations >= required => {
                return Ok(ExecutionReceipt {
                    operation: *operation,
                    status: ReceiptStatus::Confirmed { confirmations },
                });
            }
            OperationStatus::Failed {
                reason,
                failed_call,
            } => {
                return Ok(ExecutionReceipt {
                    operation: *operation,
                    status: ReceiptStatus::Failed {
                        reason,
                        failed_call,
                    },
                });
            }
            status => {
                tracing::trace!(operation = %operation, ?status, "operation not final");
            }
        }
        tokio::time::sleep(options.poll_interval).await;
    }
}
