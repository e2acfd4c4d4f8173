//! Ollama Backend Implementation
//!
//! LLM backend for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/generate` - Generate completions (streaming NDJSON or a single JSON object)
//! - `/api/tags` - List available models
//!
//! Vision models (LLaVA) take the same generate endpoint with an `images`
//! array of bare base64 payloads.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::lines::{next_chunk, send_bounded, LineBuffer};
use super::traits::{BackendError, LlmBackend, LlmRequest, LlmResponse, ModelInfo, StreamingToken};

/// Default Ollama endpoint
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";

/// Images forwarded to LLaVA; it answers about the first attachment only
const MAX_IMAGES: usize = 1;

/// One object of the generate response (whole body or one NDJSON line)
#[derive(Debug, Default, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// Forward one NDJSON line to the token channel; `Break` ends the stream task
async fn forward_line(
    line: &str,
    tx: &mpsc::Sender<StreamingToken>,
    produced: &mut bool,
    model: &str,
) -> ControlFlow<()> {
    let Ok(data) = serde_json::from_str::<GenerateChunk>(line) else {
        debug!(model = %model, "Skipping malformed stream line");
        return ControlFlow::Continue(());
    };

    if let Some(error) = data.error {
        let _ = tx.send(StreamingToken::Error(error)).await;
        return ControlFlow::Break(());
    }

    if let Some(token) = data.response.filter(|t| !t.is_empty()) {
        *produced = true;
        if tx.send(StreamingToken::Token(token)).await.is_err() {
            debug!(model = %model, "Stream receiver dropped");
            return ControlFlow::Break(());
        }
    }

    if data.done {
        let _ = tx.send(StreamingToken::Complete).await;
        return ControlFlow::Break(());
    }

    ControlFlow::Continue(())
}

/// Ollama backend client
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    /// Base URL, e.g. `http://localhost:11434`
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a backend sharing an existing HTTP client (and its connection pool)
    pub fn with_client(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get generate endpoint URL
    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }

    /// Build the full prompt including the optional system text
    fn build_prompt(&self, request: &LlmRequest) -> String {
        let mut full_prompt = String::new();

        if let Some(ref system) = request.system {
            full_prompt.push_str(system);
            full_prompt.push_str("\n\n");
        }

        full_prompt.push_str(&request.prompt);
        full_prompt
    }

    /// JSON body for `/api/generate`
    fn request_body(&self, request: &LlmRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "prompt": self.build_prompt(request),
            "stream": stream,
        });

        if !request.images.is_empty() {
            body["images"] = request
                .images
                .iter()
                .take(MAX_IMAGES)
                .map(|image| serde_json::Value::from(image.bare_base64()))
                .collect();
        }

        if request.max_tokens > 0 {
            body["options"] = serde_json::json!({ "num_predict": request.max_tokens });
        }

        body
    }

    async fn post_generate(
        &self,
        request: &LlmRequest,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let builder = self
            .http_client
            .post(self.generate_url())
            .json(&self.request_body(request, stream));
        let response = send_bounded(builder, request.timeout, stream).await?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Other(format!("Ollama returned {status}: {body}")));
        }

        Ok(response)
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_ENDPOINT)
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
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

        let response = self.post_generate(request, true).await?;
        let mut stream = Box::pin(response.bytes_stream());
        let model = request.model.clone();
        let idle = request.timeout;

        // Spawn task to process stream
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
                    if forward_line(&line, &tx, &mut produced, &model).await.is_break() {
                        return;
                    }
                }
            }

            if let Some(line) = lines.finish() {
                if forward_line(&line, &tx, &mut produced, &model).await.is_break() {
                    return;
                }
            }

            // Stream ended without done signal
            let final_token = if produced {
                StreamingToken::Complete
            } else {
                StreamingToken::Error("Ollama stream ended without output".to_string())
            };
            let _ = tx.send(final_token).await;
        });

        Ok(rx)
    }

    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, BackendError> {
        let start = Instant::now();

        let response = self.post_generate(request, false).await?;
        let data: GenerateChunk = response.json().await?;

        if let Some(error) = data.error {
            return Err(BackendError::Other(error));
        }

        Ok(LlmResponse {
            content: data.response.unwrap_or_default(),
            model: request.model.clone(),
            tokens_used: data.eval_count,
            duration_ms: u64::try_from(start.elapsed().as_millis()).ok(),
        })
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let response = self
            .http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }

        let data: serde_json::Value = response.json().await?;

        let models = data
            .get("models")
            .and_then(|m| m.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| {
                        let name = m.get("name")?.as_str()?.to_string();
                        let size = m.get("size").and_then(serde_json::Value::as_u64);
                        let parameters = m
                            .get("details")
                            .and_then(|d| d.get("parameter_size"))
                            .and_then(|p| p.as_str())
                            .map(String::from);

                        Some(ModelInfo {
                            name,
                            size,
                            parameters,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }
}
