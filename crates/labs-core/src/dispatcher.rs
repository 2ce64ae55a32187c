//! Request dispatch for one widget instance.
//!
//! A `Dispatcher` owns everything a widget needs: the conversation store,
//! one lifecycle slot per mode and the handles to the backend and the
//! credential capability. Two dispatchers never share state.
//!
//! Backend and transport failures stop here. Callers get a `Dispatch`
//! describing what happened and read results back through `state`, `job`
//! and `conversation`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ai::{
    ChatReply, ChatRequest, GeminiClient, GenerationBackend, ImageReply, ImageRequest, Reply,
    VideoOperation, VideoRequest,
};
use crate::cancel::OrCancelExt;
use crate::citations::extract_citations;
use crate::config::LabsConfig;
use crate::credential::{CredentialCapability, EnvCredential};
use crate::job::{GenerationJob, JobId, JobResult};
use crate::machine::{ModeMachine, ModeState};
use crate::mode::{ImageSize, Mode};
use crate::poller::{PollOutcome, PollPolicy, VideoPoller};
use crate::state::{ChatRole, ConversationStore, ConversationTurn};

pub const CHAT_FALLBACK: &str =
    "Sorry, I'm experiencing a bit of a glitch. Please try again in a moment.";
pub const EMPTY_REPLY_FALLBACK: &str =
    "I'm having trouble connecting to my creative core. Please try again.";
pub const IMAGE_FAILURE: &str = "Neural sequence interrupted.";
pub const VIDEO_FAILURE: &str = "Video sequence failed.";
pub const NO_IMAGE: &str = "The model returned no image.";
pub const VIDEO_TIMED_OUT: &str = "Video generation timed out.";
pub const CANCELLED: &str = "Generation cancelled.";

const ASSISTANT_PERSONA: &str = "You are the creative concierge for a design studio \
specialising in branding, logo design, social media graphics and print. \
Keep responses concise, professional and helpful. \
If asked about pricing, suggest contacting the studio directly for a custom quote.";
const ASSISTANT_GREETING: &str =
    "Hello! I'm the studio's creative assistant. Want to see the latest branding work or ask about a logo project?";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub system_instruction: Option<String>,
    /// Attach the search grounding tool.
    pub grounded: bool,
    pub thinking_budget: Option<u32>,
    /// Send the whole transcript rather than just the new prompt.
    pub include_history: bool,
    /// Assistant turn seeded into a fresh store.
    pub greeting: Option<String>,
}

impl ChatSettings {
    /// Multi-turn research chat with search grounding.
    pub fn labs(config: &LabsConfig) -> Self {
        Self {
            model: config.chat_model.clone(),
            system_instruction: None,
            grounded: true,
            thinking_budget: Some(32768),
            include_history: true,
            greeting: None,
        }
    }

    /// Single-turn concierge with a fixed persona.
    pub fn assistant(config: &LabsConfig) -> Self {
        Self {
            model: config.assistant_model.clone(),
            system_instruction: Some(ASSISTANT_PERSONA.to_string()),
            grounded: false,
            thinking_budget: None,
            include_history: false,
            greeting: Some(ASSISTANT_GREETING.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherSettings {
    pub chat: ChatSettings,
    pub image_model: String,
    pub image_aspect_ratio: String,
    pub video_model: String,
    pub video_resolution: String,
    pub video_aspect_ratio: String,
    pub video_count: u32,
    pub poll: PollPolicy,
}

impl DispatcherSettings {
    pub fn from_config(config: &LabsConfig, chat: ChatSettings) -> Self {
        Self {
            chat,
            image_model: config.image_model.clone(),
            image_aspect_ratio: "16:9".to_string(),
            video_model: config.video_model.clone(),
            video_resolution: "720p".to_string(),
            video_aspect_ratio: "16:9".to_string(),
            video_count: 1,
            poll: PollPolicy::from_config(config),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyPrompt,
    /// The mode already has a job pending or polling.
    Busy,
    CredentialDeclined,
    /// The mode was cancelled or left while the credential prompt was open.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The job ran to a terminal state (or was cancelled).
    Settled { job: JobId, state: ModeState },
    /// Nothing changed.
    Ignored(IgnoreReason),
}

struct Inner {
    backend: Arc<dyn GenerationBackend>,
    credentials: Arc<dyn CredentialCapability>,
    settings: DispatcherSettings,
    store: ConversationStore,
    machine: Mutex<ModeMachine>,
    active: Mutex<Mode>,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        credentials: Arc<dyn CredentialCapability>,
        settings: DispatcherSettings,
    ) -> Self {
        let store = ConversationStore::new();
        if let Some(greeting) = &settings.chat.greeting {
            store.append(ConversationTurn::assistant(greeting.clone(), None));
        }

        Self {
            inner: Arc::new(Inner {
                backend,
                credentials,
                settings,
                store,
                machine: Mutex::new(ModeMachine::new()),
                active: Mutex::new(Mode::Chat),
            }),
        }
    }

    /// The multi-mode panel backed by Gemini.
    pub fn labs(config: LabsConfig) -> Self {
        let settings = DispatcherSettings::from_config(&config, ChatSettings::labs(&config));
        Self::with_gemini(config, settings)
    }

    /// The standalone chat concierge backed by Gemini.
    pub fn assistant(config: LabsConfig) -> Self {
        let settings = DispatcherSettings::from_config(&config, ChatSettings::assistant(&config));
        Self::with_gemini(config, settings)
    }

    fn with_gemini(config: LabsConfig, settings: DispatcherSettings) -> Self {
        Self::new(
            Arc::new(GeminiClient::new(config.clone())),
            Arc::new(EnvCredential::new(config)),
            settings,
        )
    }

    fn machine(&self) -> MutexGuard<'_, ModeMachine> {
        self.inner
            .machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.inner.settings
    }

    pub fn active_mode(&self) -> Mode {
        *self.inner.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switches the active mode. Leaving video mode abandons its running
    /// job; other modes keep running into their own slot.
    pub fn set_active_mode(&self, mode: Mode) {
        let previous = {
            let mut active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *active, mode)
        };
        if previous == Mode::Video && mode != Mode::Video && self.cancel(Mode::Video) {
            info!(to = %mode, "left video mode, abandoned running job");
        }
    }

    pub fn state(&self, mode: Mode) -> ModeState {
        self.machine().state(mode)
    }

    pub fn job(&self, mode: Mode) -> Option<GenerationJob> {
        self.machine().job(mode).cloned()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.inner.store
    }

    pub fn conversation(&self) -> Vec<ConversationTurn> {
        self.inner.store.snapshot()
    }

    /// Cancels the mode's in-flight job. Its result, if it still arrives,
    /// is discarded.
    pub fn cancel(&self, mode: Mode) -> bool {
        self.machine().cancel(mode, CANCELLED)
    }

    /// Cancels everything still running, for when the widget goes away.
    pub fn shutdown(&self) {
        let cancelled = self.machine().cancel_all(CANCELLED);
        if !cancelled.is_empty() {
            info!(?cancelled, "dispatcher shut down with jobs in flight");
        }
    }

    pub async fn submit(&self, prompt: &str) -> Dispatch {
        self.submit_to(self.active_mode(), prompt).await
    }

    pub async fn submit_to(&self, mode: Mode, prompt: &str) -> Dispatch {
        if prompt.trim().is_empty() {
            return Dispatch::Ignored(IgnoreReason::EmptyPrompt);
        }
        if self.is_busy(mode) {
            debug!(%mode, "dispatch ignored, job in flight");
            return Dispatch::Ignored(IgnoreReason::Busy);
        }
        let epoch = self.machine().epoch(mode);
        if mode.requires_credential() && !self.ensure_credential().await {
            return Dispatch::Ignored(IgnoreReason::CredentialDeclined);
        }
        let (id, cancel) = match self.begin(mode, prompt, epoch) {
            Ok(begun) => begun,
            Err(reason) => return Dispatch::Ignored(reason),
        };
        info!(%mode, job = %id, "dispatch accepted");

        self.execute(mode, id, prompt, &cancel).await;

        let state = self.settled_state(mode, id);
        info!(%mode, job = %id, ?state, "dispatch settled");
        Dispatch::Settled { job: id, state }
    }

    fn is_busy(&self, mode: Mode) -> bool {
        self.machine().is_busy(mode)
    }

    /// Starts the job unless the mode was cancelled since `epoch` was read
    /// or another submission got there first.
    fn begin(
        &self,
        mode: Mode,
        prompt: &str,
        epoch: u64,
    ) -> Result<(JobId, CancellationToken), IgnoreReason> {
        let mut machine = self.machine();
        if machine.epoch(mode) != epoch {
            info!(%mode, "mode cancelled during credential selection, dropping dispatch");
            return Err(IgnoreReason::Abandoned);
        }
        let begun = machine.begin(mode, prompt).ok_or(IgnoreReason::Busy)?;
        if mode == Mode::Chat {
            self.inner.store.append(ConversationTurn::user(prompt));
        }
        Ok(begun)
    }

    fn settled_state(&self, mode: Mode, id: JobId) -> ModeState {
        match self.machine().job(mode) {
            Some(job) if job.id == id => job.status.into(),
            // superseded after being cancelled
            _ => ModeState::Error,
        }
    }

    async fn ensure_credential(&self) -> bool {
        let credentials = &self.inner.credentials;
        if credentials.has_selected_credential().await {
            return true;
        }
        info!("no credential selected, opening selection");
        match credentials.prompt_credential_selection().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "credential selection did not complete");
                false
            }
        }
    }

    async fn execute(&self, mode: Mode, id: JobId, prompt: &str, cancel: &CancellationToken) {
        let reply = match self.request(mode, prompt).or_cancel(cancel).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(%mode, job = %id, error = %e, "generation request failed");
                self.fail(mode, id, failure_message(mode));
                return;
            }
            Err(_) => {
                debug!(%mode, job = %id, "request cancelled, discarding");
                return;
            }
        };

        match reply {
            Reply::Chat(chat) => self.settle_chat(id, chat),
            Reply::Image(image) => self.settle_image(mode, id, image),
            Reply::Video(operation) => self.settle_video(id, operation, cancel).await,
        }
    }

    async fn request(&self, mode: Mode, prompt: &str) -> Result<Reply> {
        let settings = &self.inner.settings;
        let backend = &self.inner.backend;
        match mode {
            Mode::Chat => backend.chat(self.chat_request(prompt)).await.map(Reply::Chat),
            Mode::Image | Mode::Background => backend
                .generate_image(ImageRequest {
                    model: settings.image_model.clone(),
                    prompt: prompt.to_string(),
                    aspect_ratio: settings.image_aspect_ratio.clone(),
                    image_size: mode.image_size().unwrap_or(ImageSize::OneK),
                })
                .await
                .map(Reply::Image),
            Mode::Video => backend
                .start_video(VideoRequest {
                    model: settings.video_model.clone(),
                    prompt: prompt.to_string(),
                    count: settings.video_count,
                    resolution: settings.video_resolution.clone(),
                    aspect_ratio: settings.video_aspect_ratio.clone(),
                })
                .await
                .map(Reply::Video),
        }
    }

    fn chat_request(&self, prompt: &str) -> ChatRequest {
        let chat = &self.inner.settings.chat;
        // The backend expects the conversation to open with a user turn.
        let turns = if chat.include_history {
            let mut turns: Vec<ConversationTurn> = Vec::new();
            for turn in self
                .inner
                .store
                .snapshot()
                .into_iter()
                .skip_while(|turn| turn.role == ChatRole::Assistant)
            {
                // a cancelled prompt never got an answer
                if turn.role == ChatRole::User
                    && turns.last().is_some_and(|prev| prev.role == ChatRole::User)
                {
                    turns.pop();
                }
                turns.push(turn);
            }
            turns
        } else {
            vec![ConversationTurn::user(prompt)]
        };

        ChatRequest {
            model: chat.model.clone(),
            turns,
            system_instruction: chat.system_instruction.clone(),
            grounded: chat.grounded,
            thinking_budget: chat.thinking_budget,
        }
    }

    fn settle_chat(&self, id: JobId, reply: ChatReply) {
        let citations = extract_citations(reply.grounding.as_ref());
        let mut machine = self.machine();
        if !machine.is_live(Mode::Chat, id) {
            debug!(job = %id, "chat reply for a stale job, discarding");
            return;
        }
        // The answer is in the store before the state reports it.
        match reply.text.filter(|text| !text.trim().is_empty()) {
            Some(text) => {
                self.inner
                    .store
                    .append(ConversationTurn::assistant(text.clone(), citations));
                machine.succeed(Mode::Chat, id, JobResult::Text(text));
            }
            None => {
                warn!(job = %id, "chat reply carried no text");
                self.inner
                    .store
                    .append(ConversationTurn::assistant(EMPTY_REPLY_FALLBACK, None));
                machine.fail(Mode::Chat, id, "The model returned an empty reply.");
            }
        }
    }

    fn settle_image(&self, mode: Mode, id: JobId, reply: ImageReply) {
        match reply.first_image() {
            Some(blob) => {
                debug!(%mode, job = %id, bytes = blob.len(), "image received");
                self.machine().succeed(mode, id, JobResult::Image(blob));
            }
            None => {
                warn!(%mode, job = %id, "image reply had no usable payload");
                self.machine().fail(mode, id, NO_IMAGE);
            }
        }
    }

    async fn settle_video(&self, id: JobId, operation: VideoOperation, cancel: &CancellationToken) {
        if !self.mark_polling(id) {
            return;
        }
        info!(job = %id, operation = %operation.name, "video submitted, polling");

        let poller = VideoPoller::new(self.inner.backend.as_ref(), self.inner.settings.poll);
        match poller.drive(operation, cancel).await {
            Ok(PollOutcome::Ready(blob)) => {
                debug!(job = %id, bytes = blob.len(), "video downloaded");
                self.succeed(Mode::Video, id, JobResult::Video(blob));
            }
            Ok(PollOutcome::Failed(reason)) => {
                warn!(job = %id, %reason, "video job failed");
                self.fail(Mode::Video, id, VIDEO_FAILURE);
            }
            Ok(PollOutcome::Exhausted { attempts }) => {
                self.fail(Mode::Video, id, VIDEO_TIMED_OUT);
                warn!(job = %id, attempts, "video job timed out");
            }
            Ok(PollOutcome::Cancelled) => {
                debug!(job = %id, "video polling cancelled, discarding");
            }
            Err(e) => {
                warn!(job = %id, error = %e, "video polling failed");
                self.fail(Mode::Video, id, VIDEO_FAILURE);
            }
        }
    }

    fn mark_polling(&self, id: JobId) -> bool {
        self.machine().mark_polling(Mode::Video, id)
    }

    fn succeed(&self, mode: Mode, id: JobId, result: JobResult) {
        self.machine().succeed(mode, id, result);
    }

    /// Fails the job; a failed chat also gets an apologetic assistant turn.
    fn fail(&self, mode: Mode, id: JobId, message: &str) {
        let mut machine = self.machine();
        if mode == Mode::Chat && machine.is_live(mode, id) {
            self.inner
                .store
                .append(ConversationTurn::assistant(CHAT_FALLBACK, None));
        }
        machine.fail(mode, id, message);
    }
}

fn failure_message(mode: Mode) -> &'static str {
    match mode {
        Mode::Chat => CHAT_FALLBACK,
        Mode::Image | Mode::Background => IMAGE_FAILURE,
        Mode::Video => VIDEO_FAILURE,
    }
}
