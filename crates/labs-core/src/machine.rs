//! Per-mode lifecycle tracking.
//!
//! Each mode owns one slot holding its latest job and that job's
//! cancellation token. Slots never touch each other, so switching modes
//! leaves every other mode's last result or error in place.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::job::{GenerationJob, JobId, JobResult, JobStatus};
use crate::mode::Mode;

/// What a front end shows for a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    Idle,
    Loading,
    Success,
    Error,
}

impl From<JobStatus> for ModeState {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Idle => ModeState::Idle,
            JobStatus::Pending | JobStatus::Polling => ModeState::Loading,
            JobStatus::Succeeded => ModeState::Success,
            JobStatus::Failed => ModeState::Error,
        }
    }
}

#[derive(Debug)]
struct Slot {
    job: GenerationJob,
    cancel: CancellationToken,
}

impl Slot {
    fn is_live(&self, id: JobId) -> bool {
        self.job.id == id && self.job.status.is_in_flight() && !self.cancel.is_cancelled()
    }
}

#[derive(Debug, Default)]
pub struct ModeMachine {
    slots: HashMap<Mode, Slot>,
    /// Bumped on every cancel, so a submission that was still waiting on
    /// the credential prompt can tell it was abandoned.
    epochs: HashMap<Mode, u64>,
    next_id: u64,
}

impl ModeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, mode: Mode) -> ModeState {
        self.slots
            .get(&mode)
            .map(|slot| slot.job.status.into())
            .unwrap_or(ModeState::Idle)
    }

    pub fn job(&self, mode: Mode) -> Option<&GenerationJob> {
        self.slots.get(&mode).map(|slot| &slot.job)
    }

    pub fn is_busy(&self, mode: Mode) -> bool {
        self.slots
            .get(&mode)
            .is_some_and(|slot| slot.job.status.is_in_flight())
    }

    pub fn epoch(&self, mode: Mode) -> u64 {
        self.epochs.get(&mode).copied().unwrap_or(0)
    }

    /// Whether `id` is still the mode's running, uncancelled job.
    pub fn is_live(&self, mode: Mode, id: JobId) -> bool {
        self.slots.get(&mode).is_some_and(|slot| slot.is_live(id))
    }

    /// Replaces the mode's job with a fresh pending one. `None` while the
    /// mode already has a job in flight.
    pub fn begin(&mut self, mode: Mode, prompt: &str) -> Option<(JobId, CancellationToken)> {
        if self.is_busy(mode) {
            return None;
        }

        self.next_id += 1;
        let id = JobId(self.next_id);
        let mut job = GenerationJob::new(id, mode, prompt);
        job.advance(JobStatus::Pending).ok()?;

        let cancel = CancellationToken::new();
        self.slots.insert(
            mode,
            Slot {
                job,
                cancel: cancel.clone(),
            },
        );
        Some((id, cancel))
    }

    /// The slot for `id`, provided that job is still the live one.
    fn live(&mut self, mode: Mode, id: JobId) -> Option<&mut GenerationJob> {
        let slot = self.slots.get_mut(&mode)?;
        let live = slot.is_live(id);
        if !live {
            debug!(%mode, job = %id, "ignoring update for stale job");
        }
        live.then_some(&mut slot.job)
    }

    pub fn mark_polling(&mut self, mode: Mode, id: JobId) -> bool {
        self.live(mode, id)
            .is_some_and(|job| job.advance(JobStatus::Polling).is_ok())
    }

    pub fn succeed(&mut self, mode: Mode, id: JobId, result: JobResult) -> bool {
        self.live(mode, id)
            .is_some_and(|job| job.succeed(result).is_ok())
    }

    pub fn fail(&mut self, mode: Mode, id: JobId, message: impl Into<String>) -> bool {
        let message = message.into();
        self.live(mode, id)
            .is_some_and(|job| job.fail(message).is_ok())
    }

    /// Cancels the mode's in-flight job, failing it with `message`. Also
    /// advances the mode's epoch whether or not a job was running.
    pub fn cancel(&mut self, mode: Mode, message: &str) -> bool {
        *self.epochs.entry(mode).or_default() += 1;
        let Some(slot) = self.slots.get_mut(&mode) else {
            return false;
        };
        if !slot.job.status.is_in_flight() {
            return false;
        }
        slot.cancel.cancel();
        slot.job.fail(message).is_ok()
    }

    /// Cancels every mode and returns those that had a job in flight.
    pub fn cancel_all(&mut self, message: &str) -> Vec<Mode> {
        Mode::all()
            .into_iter()
            .filter(|mode| self.cancel(*mode, message))
            .collect()
    }
}
