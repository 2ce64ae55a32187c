use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ai::{Blob, GenerationBackend, VideoOperation};
use crate::cancel::OrCancelExt;
use crate::config::LabsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the backend reports completion.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&LabsConfig::default())
    }
}

impl PollPolicy {
    pub fn from_config(config: &LabsConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ready(Blob),
    /// The backend finished the job without a usable video.
    Failed(String),
    Cancelled,
    Exhausted { attempts: u32 },
}

/// Drives a submitted video operation to a terminal state.
pub struct VideoPoller<'a> {
    backend: &'a dyn GenerationBackend,
    policy: PollPolicy,
}

impl<'a> VideoPoller<'a> {
    pub fn new(backend: &'a dyn GenerationBackend, policy: PollPolicy) -> Self {
        Self { backend, policy }
    }

    /// Sleeps, re-fetches and repeats until the operation is done, then
    /// downloads the result. Transport errors are returned as `Err`.
    pub async fn drive(
        &self,
        mut operation: VideoOperation,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome> {
        let mut attempts = 0u32;

        while !operation.done {
            if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                warn!(operation = %operation.name, attempts, "video job still running, giving up");
                return Ok(PollOutcome::Exhausted { attempts });
            }
            if tokio::time::sleep(self.policy.interval)
                .or_cancel(cancel)
                .await
                .is_err()
            {
                return Ok(PollOutcome::Cancelled);
            }

            attempts += 1;
            debug!(operation = %operation.name, attempts, "polling video job");
            operation = match self.backend.video_status(&operation).or_cancel(cancel).await {
                Ok(status) => status?,
                Err(_) => return Ok(PollOutcome::Cancelled),
            };
        }

        if let Some(error) = operation.error {
            return Ok(PollOutcome::Failed(error));
        }
        let Some(uri) = operation.video_uri else {
            return Ok(PollOutcome::Failed(
                "The job finished without a video".to_string(),
            ));
        };

        match self.backend.fetch_video(&uri).or_cancel(cancel).await {
            Ok(blob) => Ok(PollOutcome::Ready(blob?)),
            Err(_) => Ok(PollOutcome::Cancelled),
        }
    }
}
