use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::wire::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, GoogleSearch,
    ImageConfig, OperationResponse, PredictLongRunningRequest, ThinkingConfig, Tool,
    VideoInstance, VideoParameters,
};
use super::{
    Blob, ChatReply, ChatRequest, GenerationBackend, ImageReply, ImageRequest, VideoOperation,
    VideoRequest,
};
use crate::config::LabsConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: LabsConfig,
}

impl GeminiClient {
    pub fn new(config: LabsConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            model,
            method
        )
    }

    /// The key is looked up per request so a newly selected key applies
    /// without rebuilding the client.
    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request.header(API_KEY_HEADER, self.config.require_api_key()?))
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!(%url, "POST");
        let response = self
            .authorized(self.client.post(url))?
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.post_json(&self.model_url(model, "generateContent"), request)
            .await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(anyhow!("Gemini API error {}: {}", status, text))
}

fn to_video_operation(response: OperationResponse) -> VideoOperation {
    VideoOperation {
        video_uri: response.video_uri().map(str::to_string),
        error: response.error.map(|e| match e.code {
            Some(code) => format!("{} (code {})", e.message, code),
            None => e.message,
        }),
        done: response.done,
        name: response.name,
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let body = GenerateContentRequest {
            contents: request
                .turns
                .iter()
                .map(|turn| Content::text(Some(turn.role.wire_role()), &turn.text))
                .collect(),
            system_instruction: request
                .system_instruction
                .as_deref()
                .map(|text| Content::text(None, text)),
            tools: if request.grounded {
                vec![Tool {
                    google_search: Some(GoogleSearch {}),
                }]
            } else {
                Vec::new()
            },
            generation_config: request.thinking_budget.map(|budget| GenerationConfig {
                thinking_config: Some(ThinkingConfig {
                    thinking_budget: budget,
                }),
                image_config: None,
            }),
        };

        let response = self.generate_content(&request.model, &body).await?;
        Ok(ChatReply {
            text: response.text(),
            grounding: response.grounding_metadata().cloned(),
        })
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageReply> {
        let body = GenerateContentRequest {
            contents: vec![Content::text(None, &request.prompt)],
            generation_config: Some(GenerationConfig {
                thinking_config: None,
                image_config: Some(ImageConfig {
                    aspect_ratio: request.aspect_ratio.clone(),
                    image_size: request.image_size.as_str().to_string(),
                }),
            }),
            ..GenerateContentRequest::default()
        };

        let response = self.generate_content(&request.model, &body).await?;
        Ok(ImageReply {
            parts: response.into_parts(),
        })
    }

    async fn start_video(&self, request: VideoRequest) -> Result<VideoOperation> {
        let body = PredictLongRunningRequest {
            instances: vec![VideoInstance {
                prompt: request.prompt.clone(),
            }],
            parameters: VideoParameters {
                aspect_ratio: request.aspect_ratio.clone(),
                resolution: request.resolution.clone(),
                sample_count: request.count,
            },
        };

        let response: OperationResponse = self
            .post_json(&self.model_url(&request.model, "predictLongRunning"), &body)
            .await?;
        Ok(to_video_operation(response))
    }

    async fn video_status(&self, operation: &VideoOperation) -> Result<VideoOperation> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            operation.name
        );
        debug!(%url, "GET");
        let response = self.authorized(self.client.get(&url))?.send().await?;
        let response: OperationResponse = check_status(response).await?.json().await?;
        Ok(to_video_operation(response))
    }

    async fn fetch_video(&self, uri: &str) -> Result<Blob> {
        debug!(%uri, "downloading video");
        let response = self.authorized(self.client.get(uri))?.send().await?;
        let response = check_status(response).await?;

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or("video/mp4")
            .to_string();
        let data = response.bytes().await?.to_vec();
        if data.is_empty() {
            return Err(anyhow!("Video download from {} was empty", uri));
        }

        Ok(Blob { mime_type, data })
    }
}
