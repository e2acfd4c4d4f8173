//! LLM Backend Traits
//!
//! Trait definitions for generation backends. The fallback chain and the
//! transcript workflow only ever talk to `dyn LlmBackend`, so a local Ollama
//! server and an OpenAI-compatible API are interchangeable candidates.
//!
//! # Design Philosophy
//!
//! The LlmBackend trait provides a common interface for:
//! - Sending prompts and receiving responses (streaming or batch)
//! - Health checking the backend
//! - Querying available models
//!
//! Every failure is reported as a [`BackendError`] so callers can decide
//! whether to try the next candidate without inspecting transport errors.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::messages::{ImageBlob, Modality};

/// Default per-call timeout for text generation
pub const DEFAULT_TEXT_TIMEOUT: Duration = Duration::from_secs(180);

/// Token stream events from LLM backends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// A piece of the response
    Token(String),
    /// Response completed successfully
    Complete,
    /// The stream failed after it had started
    Error(String),
}

/// Uniform failure kinds for a backend call
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Connection could not be established
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The call exceeded its timeout
    #[error("backend request timed out")]
    Timeout,

    /// The call succeeded but produced no usable text
    #[error("backend returned no content")]
    EmptyResponse,

    /// Any other transport, status or decoding failure
    #[error("backend error: {0}")]
    Other(String),

    /// Every candidate in a fallback chain failed
    #[error("all {attempts} backend candidates failed")]
    AllBackendsExhausted {
        /// Candidates actually attempted
        attempts: usize,
        /// Failure of the final attempt, if any attempt was made
        last: Option<Box<BackendError>>,
    },
}

impl BackendError {
    /// The failure that ended the call, looking through exhaustion wrappers
    #[must_use]
    pub fn root_cause(&self) -> Option<&BackendError> {
        match self {
            Self::AllBackendsExhausted { last, .. } => {
                last.as_deref().and_then(BackendError::root_cause)
            }
            other => Some(other),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Unreachable(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Configuration for LLM requests
#[derive(Clone, Debug)]
pub struct LlmRequest {
    /// The fully rendered prompt
    pub prompt: String,
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// Text or vision
    pub modality: Modality,
    /// Images for vision requests
    pub images: Vec<ImageBlob>,
    /// Whether to stream the response
    pub stream: bool,
    /// Maximum tokens in response (0 = backend default)
    pub max_tokens: u32,
    /// System prompt (optional, prepended to the prompt)
    pub system: Option<String>,
    /// Per-call timeout
    pub timeout: Duration,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: String::new(),
            modality: Modality::Text,
            images: Vec::new(),
            stream: false,
            max_tokens: 0,
            system: None,
            timeout: DEFAULT_TEXT_TIMEOUT,
        }
    }
}

impl LlmRequest {
    /// Create a new request with prompt and model
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Same request aimed at a different model
    #[must_use]
    pub fn for_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    /// Set streaming mode
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set modality
    #[must_use]
    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = modality;
        self
    }

    /// Attach images
    #[must_use]
    pub fn with_images(mut self, images: Vec<ImageBlob>) -> Self {
        self.images = images;
        self
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Response from non-streaming LLM request
#[derive(Clone, Debug)]
pub struct LlmResponse {
    /// The response text
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Tokens used (if available)
    pub tokens_used: Option<u32>,
    /// Response generation time in milliseconds
    pub duration_ms: Option<u64>,
}

/// Information about an available model
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model identifier
    pub name: String,
    /// Model size in bytes (if known)
    pub size: Option<u64>,
    /// Parameter count (if known)
    pub parameters: Option<String>,
}

/// Outcome of a successful backend call
#[derive(Debug)]
pub enum Completion {
    /// Whole reply, trimmed and non-empty
    Text(String),
    /// Established stream of tokens
    Stream(mpsc::Receiver<StreamingToken>),
}

impl Completion {
    /// Reduce to the full reply text, draining a stream if necessary
    ///
    /// # Errors
    ///
    /// Returns `Other` if a stream reports an error, and `EmptyResponse` if
    /// nothing but whitespace was produced.
    pub async fn into_text(self) -> Result<String, BackendError> {
        let text = match self {
            Self::Text(text) => text,
            Self::Stream(mut rx) => {
                let mut text = String::new();
                while let Some(token) = rx.recv().await {
                    match token {
                        StreamingToken::Token(piece) => text.push_str(&piece),
                        StreamingToken::Complete => break,
                        StreamingToken::Error(detail) => return Err(BackendError::Other(detail)),
                    }
                }
                text
            }
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            Err(BackendError::EmptyResponse)
        } else {
            Ok(trimmed.to_string())
        }
    }
}

/// LLM Backend trait
///
/// Implement this trait to add support for different LLM providers.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Get the backend name (e.g., "Ollama", "OpenAI")
    fn name(&self) -> &str;

    /// Check if the backend is healthy and reachable
    async fn health_check(&self) -> bool;

    /// Send a request and get a streaming response
    ///
    /// Resolves once the upstream has accepted the request. The returned
    /// channel yields tokens as they arrive and ends with exactly one
    /// `Complete` or `Error`. Dropping the receiver stops the producer.
    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError>;

    /// Send a request and wait for the complete response (non-streaming)
    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, BackendError>;

    /// List available models
    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>>;

    /// Run a request in the mode it asks for
    ///
    /// Non-streaming replies are trimmed; an empty reply is an error so the
    /// caller can move on to the next candidate.
    async fn complete(&self, request: &LlmRequest) -> Result<Completion, BackendError> {
        if request.stream {
            return Ok(Completion::Stream(self.send_streaming(request).await?));
        }

        let response = self.send(request).await?;
        let content = response.content.trim();
        if content.is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(Completion::Text(content.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_request_builder() {
        let request = LlmRequest::new("Hello", "llava:7b")
            .with_stream(true)
            .with_modality(Modality::Vision)
            .with_images(vec![ImageBlob::new("AAAA")])
            .with_system("You are helpful")
            .with_max_tokens(100)
            .with_timeout(Duration::from_secs(5));

        assert_eq!(request.prompt, "Hello");
        assert_eq!(request.model, "llava:7b");
        assert!(request.stream);
        assert_eq!(request.modality, Modality::Vision);
        assert_eq!(request.images.len(), 1);
        assert_eq!(request.system, Some("You are helpful".to_string()));
        assert_eq!(request.max_tokens, 100);
        assert_eq!(request.timeout, Duration::from_secs(5));

        let retargeted = request.for_model("llava:13b");
        assert_eq!(retargeted.model, "llava:13b");
        assert_eq!(retargeted.prompt, "Hello");
        assert!(retargeted.stream);
    }

    #[test]
    fn test_request_defaults() {
        let request = LlmRequest::default();
        assert!(!request.stream);
        assert_eq!(request.modality, Modality::Text);
        assert_eq!(request.timeout, DEFAULT_TEXT_TIMEOUT);
    }

    #[test]
    fn test_root_cause_unwraps_exhaustion() {
        let error = BackendError::AllBackendsExhausted {
            attempts: 2,
            last: Some(Box::new(BackendError::Timeout)),
        };
        assert_eq!(error.root_cause(), Some(&BackendError::Timeout));

        let empty = BackendError::AllBackendsExhausted {
            attempts: 0,
            last: None,
        };
        assert_eq!(empty.root_cause(), None);
    }

    #[tokio::test]
    async fn test_stream_into_text() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamingToken::Token(" Hel".into())).await.unwrap();
        tx.send(StreamingToken::Token("lo ".into())).await.unwrap();
        tx.send(StreamingToken::Complete).await.unwrap();

        let text = Completion::Stream(rx).into_text().await.unwrap();
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn test_stream_error_into_text() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamingToken::Token("partial".into())).await.unwrap();
        tx.send(StreamingToken::Error("reset".into())).await.unwrap();

        let result = Completion::Stream(rx).into_text().await;
        assert_eq!(result, Err(BackendError::Other("reset".into())));
    }

    #[tokio::test]
    async fn test_blank_text_is_empty_response() {
        let result = Completion::Text("  ".into()).into_text().await;
        assert_eq!(result, Err(BackendError::EmptyResponse));
    }
}
