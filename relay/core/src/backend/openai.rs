//! OpenAI-compatible Backend
//!
//! Chat-completions client used as the cloud fallback for vision requests and
//! for the transcript workflow. Any server speaking the OpenAI
//! `/chat/completions` dialect works when `base_url` points at it.
//!
//! Images are sent as `image_url` content parts carrying full data URLs;
//! streaming uses server-sent events terminated by `data: [DONE]`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::lines::{next_chunk, send_bounded, LineBuffer};
use super::traits::{BackendError, LlmBackend, LlmRequest, LlmResponse, ModelInfo, StreamingToken};

/// Default API root
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Images forwarded per request; extra attachments are dropped
pub const MAX_IMAGES: usize = 4;

/// Reply budget when the request does not set one
const DEFAULT_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    delta: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// What one SSE line means for the token stream
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Token(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(payload) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseEvent::Done;
    }

    let Ok(chunk) = serde_json::from_str::<ChatCompletion>(payload) else {
        return SseEvent::Skip;
    };
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty())
        .map_or(SseEvent::Skip, SseEvent::Token)
}

/// OpenAI chat-completions client
#[derive(Clone)]
pub struct OpenAiBackend {
    api_key: String,
    base_url: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiBackend {
    /// Create a client for the public API
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(api_key, reqwest::Client::new())
    }

    /// Create a client sharing an existing HTTP client
    pub fn with_client(api_key: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            http_client,
        }
    }

    /// Point at a compatible server instead of the public API
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }

    /// JSON body for `/chat/completions`
    fn request_body(&self, request: &LlmRequest, stream: bool) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }

        let content = if request.images.is_empty() {
            serde_json::Value::from(request.prompt.as_str())
        } else {
            let mut parts = vec![serde_json::json!({ "type": "text", "text": request.prompt })];
            parts.extend(request.images.iter().take(MAX_IMAGES).map(|image| {
                serde_json::json!({
                    "type": "image_url",
                    "image_url": { "url": image.data_url(), "detail": "high" },
                })
            }));
            serde_json::Value::Array(parts)
        };
        messages.push(serde_json::json!({ "role": "user", "content": content }));

        let max_tokens = if request.max_tokens > 0 {
            request.max_tokens
        } else {
            DEFAULT_MAX_TOKENS
        };

        serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "stream": stream,
        })
    }

    async fn post_completions(
        &self,
        request: &LlmRequest,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let builder = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request, stream));
        let response = send_bounded(builder, request.timeout, stream).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Other(format!("OpenAI returned {status}: {body}")));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.models_url())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError> {
        let (tx, rx) = mpsc::channel(100);

        let response = self.post_completions(request, true).await?;
        let mut stream = Box::pin(response.bytes_stream());
        let model = request.model.clone();
        let idle = request.timeout;

        tokio::spawn(async move {
            let mut lines = LineBuffer::default();
            let mut produced = false;

            loop {
                let bytes = match next_chunk(&mut stream, idle).await {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => break,
                    Err(detail) => {
                        let _ = tx.send(StreamingToken::Error(detail)).await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        SseEvent::Token(token) => {
                            produced = true;
                            if tx.send(StreamingToken::Token(token)).await.is_err() {
                                debug!(model = %model, "Stream receiver dropped");
                                return;
                            }
                        }
                        SseEvent::Done => {
                            let _ = tx.send(StreamingToken::Complete).await;
                            return;
                        }
                        SseEvent::Skip => {}
                    }
                }
            }

            let final_token = if produced {
                StreamingToken::Complete
            } else {
                StreamingToken::Error("OpenAI stream ended without output".to_string())
            };
            let _ = tx.send(final_token).await;
        });

        Ok(rx)
    }

    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, BackendError> {
        let start = Instant::now();

        let response = self.post_completions(request, false).await?;
        let data: ChatCompletion = response.json().await?;

        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|choice| {
                if let Some(reason) = choice.finish_reason.as_deref() {
                    debug!(finish_reason = reason, "OpenAI completion finished");
                }
                choice.message
            })
            .and_then(|message| message.content)
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            tokens_used: data.usage.and_then(|u| u.completion_tokens),
            duration_ms: u64::try_from(start.elapsed().as_millis()).ok(),
        })
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let response = self
            .http_client
            .get(self.models_url())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI returned {status}: {body}");
        }

        let list: ModelList = response.json().await?;
        Ok(list
            .data
            .into_iter()
            .map(|entry| ModelInfo {
                name: entry.id,
                size: None,
                parameters: None,
            })
            .collect())
    }
}
