//! Test doubles for the backend and credential seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Notify;

use crate::ai::{
    Blob, ChatReply, ChatRequest, GenerationBackend, ImageReply, ImageRequest, VideoOperation,
    VideoRequest,
};
use crate::credential::CredentialCapability;

#[derive(Default)]
struct Script {
    chat: VecDeque<Result<ChatReply, String>>,
    images: VecDeque<Result<ImageReply, String>>,
    start_error: Option<String>,
    status_error: Option<String>,
    final_operation: Option<VideoOperation>,
    video: Option<Blob>,
    chat_requests: Vec<ChatRequest>,
    image_requests: Vec<ImageRequest>,
    video_requests: Vec<VideoRequest>,
    fetched: Vec<String>,
}

/// A `GenerationBackend` that replays canned answers.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
    pending_polls: AtomicU32,
    status_calls: AtomicU32,
    gate: Option<Arc<Notify>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// Every submission waits for a `notify_one` on `gate` before answering.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn chat_reply(self, text: &str) -> Self {
        self.chat_with(ChatReply {
            text: Some(text.to_string()),
            grounding: None,
        })
    }

    pub fn chat_with(self, reply: ChatReply) -> Self {
        self.script().chat.push_back(Ok(reply));
        self
    }

    pub fn chat_error(self, message: &str) -> Self {
        self.script().chat.push_back(Err(message.to_string()));
        self
    }

    pub fn image_with(self, reply: ImageReply) -> Self {
        self.script().images.push_back(Ok(reply));
        self
    }

    pub fn image_error(self, message: &str) -> Self {
        self.script().images.push_back(Err(message.to_string()));
        self
    }

    pub fn start_error(self, message: &str) -> Self {
        self.script().start_error = Some(message.to_string());
        self
    }

    /// The first `count` status checks report the job as still running.
    pub fn pending_polls(self, count: u32) -> Self {
        self.pending_polls.store(count, Ordering::SeqCst);
        self
    }

    pub fn finished_video(self, uri: &str, data: &[u8]) -> Self {
        {
            let mut script = self.script();
            script.final_operation = Some(VideoOperation {
                name: "operations/test".to_string(),
                done: true,
                video_uri: Some(uri.to_string()),
                error: None,
            });
            script.video = Some(Blob {
                mime_type: "video/mp4".to_string(),
                data: data.to_vec(),
            });
        }
        self
    }

    pub fn failed_video(self, message: &str) -> Self {
        self.script().final_operation = Some(VideoOperation {
            name: "operations/test".to_string(),
            done: true,
            video_uri: None,
            error: Some(message.to_string()),
        });
        self
    }

    pub fn status_error(self, message: &str) -> Self {
        self.script().status_error = Some(message.to_string());
        self
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn fetched_uris(&self) -> Vec<String> {
        self.script().fetched.clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.script().chat_requests.clone()
    }

    pub fn image_requests(&self) -> Vec<ImageRequest> {
        self.script().image_requests.clone()
    }

    pub fn video_requests(&self) -> Vec<VideoRequest> {
        self.script().video_requests.clone()
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        self.wait_for_gate().await;
        let mut script = self.script();
        script.chat_requests.push(request);
        match script.chat.pop_front() {
            Some(reply) => reply.map_err(|e| anyhow!(e)),
            None => Ok(ChatReply {
                text: Some("ok".to_string()),
                grounding: None,
            }),
        }
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageReply> {
        self.wait_for_gate().await;
        let mut script = self.script();
        script.image_requests.push(request);
        script
            .images
            .pop_front()
            .unwrap_or_else(|| Ok(ImageReply::default()))
            .map_err(|e| anyhow!(e))
    }

    async fn start_video(&self, request: VideoRequest) -> Result<VideoOperation> {
        self.wait_for_gate().await;
        let mut script = self.script();
        script.video_requests.push(request);
        if let Some(message) = script.start_error.clone() {
            return Err(anyhow!(message));
        }
        Ok(VideoOperation {
            name: "operations/test".to_string(),
            ..VideoOperation::default()
        })
    }

    async fn video_status(&self, operation: &VideoOperation) -> Result<VideoOperation> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script();
        if let Some(message) = script.status_error.clone() {
            return Err(anyhow!(message));
        }
        let still_running = self
            .pending_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if still_running {
            return Ok(VideoOperation {
                done: false,
                ..operation.clone()
            });
        }
        Ok(script.final_operation.clone().unwrap_or(VideoOperation {
            name: operation.name.clone(),
            done: true,
            video_uri: None,
            error: None,
        }))
    }

    async fn fetch_video(&self, uri: &str) -> Result<Blob> {
        let mut script = self.script();
        script.fetched.push(uri.to_string());
        script
            .video
            .clone()
            .ok_or_else(|| anyhow!("nothing at {}", uri))
    }
}

/// A `CredentialCapability` that counts how often it is consulted.
pub struct ScriptedCredentials {
    selected: AtomicBool,
    grant_on_prompt: bool,
    prompt_gate: Option<Arc<Notify>>,
    checks: AtomicUsize,
    prompts: AtomicUsize,
}

impl ScriptedCredentials {
    pub fn selected() -> Self {
        Self::build(true, true)
    }

    /// Not selected yet; the prompt selects one.
    pub fn granted_on_prompt() -> Self {
        Self::build(false, true)
    }

    /// Not selected and the user dismisses the prompt.
    pub fn declined() -> Self {
        Self::build(false, false)
    }

    fn build(selected: bool, grant_on_prompt: bool) -> Self {
        Self {
            selected: AtomicBool::new(selected),
            grant_on_prompt,
            prompt_gate: None,
            checks: AtomicUsize::new(0),
            prompts: AtomicUsize::new(0),
        }
    }

    /// The selection prompt stays open until `gate` is notified.
    pub fn prompt_waits_on(mut self, gate: Arc<Notify>) -> Self {
        self.prompt_gate = Some(gate);
        self
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialCapability for ScriptedCredentials {
    async fn has_selected_credential(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.selected.load(Ordering::SeqCst)
    }

    async fn prompt_credential_selection(&self) -> Result<()> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.prompt_gate {
            gate.notified().await;
        }
        if self.grant_on_prompt {
            self.selected.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(anyhow!("selection dismissed"))
        }
    }
}
