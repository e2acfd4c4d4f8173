//! Completion Orchestrator
//!
//! Entry point for chat requests. Validates the request, picks the modality
//! (any image means vision), renders the prompt, walks the fallback chain and
//! shapes the outcome into either a whole reply or a sequence of events.
//!
//! # Streaming
//!
//! ```text
//! backend task --StreamingToken--> mpsc --> ChatEventStream --> SSE
//!   Token(t)   -> Chunk { chunk: t }
//!   Complete   -> Done { done: true }   (terminal)
//!   Error(e)   -> Error { error: .. }   (terminal)
//! ```
//!
//! Dropping the event stream drops the receiver, which stops the producer
//! task and releases the upstream connection.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{Completion, LlmRequest, StreamingToken};
use crate::config::{RelayConfig, TimeoutSettings};
use crate::error::RelayError;
use crate::messages::{HistoryEntry, ImageBlob, Message};
use crate::prompt::PromptBuilder;
use crate::routing::{chat_candidates, BackendDescriptor, BackendFactory, FallbackChain};

/// Message sent to the client when a started stream fails
const STREAM_FAILURE_MESSAGE: &str = "Failed to communicate with the AI model.";

/// Chat request body as sent by the web client
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatRequest {
    /// New user message
    #[serde(default)]
    pub message: Option<String>,
    /// Attached images (base64 or data URLs)
    #[serde(default)]
    pub images: Vec<ImageBlob>,
    /// Prior turns, oldest first
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
    /// Stream the reply as events
    #[serde(default)]
    pub stream: bool,
}

/// One event of a streamed reply
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatEvent {
    /// Incremental text
    Chunk {
        /// Text piece
        chunk: String,
    },
    /// Reply finished
    Done {
        /// Always `true`
        done: bool,
    },
    /// Reply failed after it had started
    Error {
        /// User-facing message
        error: String,
    },
}

impl ChatEvent {
    /// Incremental text event
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk { chunk: text.into() }
    }

    /// Completion event
    #[must_use]
    pub fn done() -> Self {
        Self::Done { done: true }
    }

    /// Terminal failure event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Whether no event follows this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }
}

/// Streamed reply
pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// Result of a successful chat request
pub enum ChatResponse {
    /// Whole reply
    Reply(String),
    /// Reply delivered as events
    Stream(ChatEventStream),
}

impl std::fmt::Debug for ChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reply(text) => f.debug_tuple("Reply").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Turn backend tokens into client events, ending after the first terminal one
fn into_events(rx: mpsc::Receiver<StreamingToken>, request_id: Uuid) -> ChatEventStream {
    Box::pin(futures::stream::unfold(Some(rx), move |state| async move {
        let mut rx = state?;
        let event = match rx.recv().await {
            Some(StreamingToken::Token(text)) => return Some((ChatEvent::chunk(text), Some(rx))),
            Some(StreamingToken::Complete) => ChatEvent::done(),
            Some(StreamingToken::Error(detail)) => {
                warn!(request_id = %request_id, error = %detail, "Stream failed after start");
                ChatEvent::error(STREAM_FAILURE_MESSAGE)
            }
            None => {
                warn!(request_id = %request_id, "Stream closed without completion");
                ChatEvent::error(STREAM_FAILURE_MESSAGE)
            }
        };
        Some((event, None))
    }))
}

/// Handles chat requests end to end
pub struct CompletionOrchestrator {
    builder: PromptBuilder,
    catalog: Vec<BackendDescriptor>,
    factory: Arc<dyn BackendFactory>,
    timeouts: TimeoutSettings,
}

impl CompletionOrchestrator {
    /// Create an orchestrator over an explicit candidate catalog
    #[must_use]
    pub fn new(
        builder: PromptBuilder,
        catalog: Vec<BackendDescriptor>,
        factory: Arc<dyn BackendFactory>,
        timeouts: TimeoutSettings,
    ) -> Self {
        Self {
            builder,
            catalog,
            factory,
            timeouts,
        }
    }

    /// Create an orchestrator from configuration
    #[must_use]
    pub fn from_config(config: &RelayConfig, factory: Arc<dyn BackendFactory>) -> Self {
        Self::new(
            PromptBuilder::new(config.prompt.clone()),
            chat_candidates(config),
            factory,
            config.timeouts,
        )
    }

    /// Candidate catalog across all modalities
    #[must_use]
    pub fn catalog(&self) -> &[BackendDescriptor] {
        &self.catalog
    }

    /// Handle one chat request
    ///
    /// # Errors
    ///
    /// `BadRequest` when neither text nor images are present; otherwise the
    /// modality-specific mapping of the chain failure (see
    /// [`RelayError::from_chat_failure`]).
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, RelayError> {
        let request_id = Uuid::new_v4();
        let text = request.message.unwrap_or_default();

        if text.trim().is_empty() && request.images.is_empty() {
            return Err(RelayError::BadRequest(
                "Message or images are required".to_string(),
            ));
        }

        let history: Vec<Message> = request
            .conversation_history
            .into_iter()
            .map(Message::from)
            .collect();
        let current = Message::user(text).with_attachments(request.images);

        let spec = self.builder.spec(&history, &current);
        let modality = spec.modality;

        info!(
            request_id = %request_id,
            modality = %modality,
            stream = request.stream,
            history = history.len(),
            window = spec.history_window.len(),
            images = spec.current_images.len(),
            "Handling chat request"
        );

        let llm_request = LlmRequest::new(self.builder.render(&spec), "")
            .with_system(self.builder.preamble(&spec))
            .with_modality(modality)
            .with_images(spec.current_images)
            .with_stream(request.stream)
            .with_timeout(self.timeouts.for_modality(modality));

        let chain = FallbackChain::for_modality(&self.catalog, modality);
        match chain.resolve(self.factory.as_ref(), &llm_request).await {
            Ok(Completion::Text(reply)) => Ok(ChatResponse::Reply(reply)),
            Ok(Completion::Stream(rx)) => Ok(ChatResponse::Stream(into_events(rx, request_id))),
            Err(e) => {
                warn!(request_id = %request_id, modality = %modality, error = %e, "Chat chain exhausted");
                Err(RelayError::from_chat_failure(modality, &e))
            }
        }
    }
}
