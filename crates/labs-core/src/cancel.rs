//! Job cancellation for backend calls.
//!
//! Every generation job owns a `CancellationToken`. Any await on the
//! backend for that job goes through `or_cancel` so that abandoning the
//! job (leaving video mode, `cancel`, `shutdown`) stops it at the next
//! await point instead of after the request returns.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// The job was abandoned while the call was still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// Resolves with the call's output, or `Cancelled` once the job token
    /// fires. A job abandoned before the call starts never sees its output.
    async fn or_cancel(self, job: &CancellationToken) -> Result<Self::Output, Cancelled>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, job: &CancellationToken) -> Result<Self::Output, Cancelled> {
        tokio::select! {
            biased;
            _ = job.cancelled() => Err(Cancelled),
            output = self => Ok(output),
        }
    }
}
