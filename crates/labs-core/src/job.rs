use anyhow::{anyhow, Result};

use crate::ai::Blob;
use crate::mode::Mode;

/// Identity of one submission. A new submission always gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub(crate) u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Pending,
    Polling,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Polling)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// `idle -> pending -> (polling)* -> succeeded | failed`
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (*self, next),
            (Idle, Pending)
                | (Pending, Polling)
                | (Polling, Polling)
                | (Pending | Polling, Succeeded | Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Text(String),
    Image(Blob),
    Video(Blob),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationJob {
    pub id: JobId,
    pub mode: Mode,
    pub prompt: String,
    pub status: JobStatus,
    pub result: Option<JobResult>,
    pub error_message: Option<String>,
}

impl GenerationJob {
    pub(crate) fn new(id: JobId, mode: Mode, prompt: impl Into<String>) -> Self {
        Self {
            id,
            mode,
            prompt: prompt.into(),
            status: JobStatus::Idle,
            result: None,
            error_message: None,
        }
    }

    pub(crate) fn advance(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_advance_to(next) {
            return Err(anyhow!(
                "{} cannot move from {:?} to {:?}",
                self.id,
                self.status,
                next
            ));
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn succeed(&mut self, result: JobResult) -> Result<()> {
        self.advance(JobStatus::Succeeded)?;
        self.result = Some(result);
        Ok(())
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.advance(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }
}
