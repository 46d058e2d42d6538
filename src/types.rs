//! Common type definitions used throughout the engine

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::QueueError;

/// Result of one successful generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Newly generated text, whitespace-trimmed; never includes the prompt
    pub text: String,
    /// Wall-clock time of the generation loop alone
    pub elapsed: Duration,
    /// Prompt length after truncation
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
}

/// Handle for a request submitted to the generation queue
#[derive(Debug)]
pub struct QueueHandle {
    /// Job ID in the queue
    job_id: u64,
    /// Channel for receiving the result
    receiver: oneshot::Receiver<Result<Completion, QueueError>>,
}

impl QueueHandle {
    pub(crate) fn new(job_id: u64, receiver: oneshot::Receiver<Result<Completion, QueueError>>) -> Self {
        Self { job_id, receiver }
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Wait for the generation result
    pub async fn wait(self) -> Result<Completion, QueueError> {
        self.receiver.await.map_err(|_| QueueError::Closed)?
    }
}
