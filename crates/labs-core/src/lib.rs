pub mod ai;
pub mod cancel;
pub mod citations;
pub mod config;
pub mod credential;
pub mod dispatcher;
pub mod job;
pub mod machine;
pub mod mode;
pub mod poller;
pub mod state;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use ai::{Blob, GeminiClient, GenerationBackend, Reply};
pub use citations::extract_citations;
pub use config::LabsConfig;
pub use credential::{CredentialCapability, EnvCredential};
pub use dispatcher::{ChatSettings, Dispatch, Dispatcher, DispatcherSettings, IgnoreReason};
pub use job::{GenerationJob, JobId, JobResult, JobStatus};
pub use machine::{ModeMachine, ModeState};
pub use mode::{ImageSize, Mode};
pub use poller::{PollOutcome, PollPolicy, VideoPoller};
pub use state::{ChatRole, Citation, ConversationStore, ConversationTurn};
