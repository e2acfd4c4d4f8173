//! Relay Core - Prompt building and LLM backend fallback for ConvoScribe
//!
//! This crate holds everything the ConvoScribe relay does apart from HTTP:
//! rendering conversation prompts, talking to Ollama and OpenAI-compatible
//! backends, failing over between them, and the YouTube summarize/explain
//! workflow. The daemon crate only wires these into routes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         relay-daemon                             │
//! │   POST /api/chat          POST /api/summarize, /api/explain      │
//! └──────────┬───────────────────────────────┬───────────────────────┘
//!            │ ChatRequest                   │ youtube_url
//! ┌──────────┴───────────────┐   ┌───────────┴──────────────────────┐
//! │ CompletionOrchestrator   │   │ TranscriptWorkflow               │
//! │  ┌────────────────────┐  │   │  ┌──────────────────┐            │
//! │  │   PromptBuilder    │  │   │  │ TranscriptSource │ (YouTube)  │
//! │  └────────────────────┘  │   │  └──────────────────┘            │
//! └──────────┬───────────────┘   └───────────┬──────────────────────┘
//!            └──────────────┬────────────────┘
//!                  ┌────────┴────────┐
//!                  │  FallbackChain  │  ordered BackendDescriptors
//!                  └────────┬────────┘
//!                  ┌────────┴────────┐
//!                  │ BackendFactory  │
//!                  └───┬─────────┬───┘
//!               ┌──────┴──┐  ┌───┴──────┐
//!               │ Ollama  │  │  OpenAI  │
//!               └─────────┘  └──────────┘
//! ```
//!
//! # Key Types
//!
//! - [`CompletionOrchestrator`]: chat entry point (reply or event stream)
//! - [`TranscriptWorkflow`]: summary / explanation of a YouTube video
//! - [`PromptBuilder`]: bounded conversation prompt rendering
//! - [`FallbackChain`]: sequential failover across backend candidates
//! - [`LlmBackend`]: uniform backend interface
//! - [`RelayConfig`]: configuration from file, environment and CLI
//! - [`RelayError`]: client-visible failures with HTTP status codes
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use relay_core::{ChatRequest, ChatResponse, CompletionOrchestrator, HttpBackendFactory};
//!
//! let config = relay_core::load_config()?;
//! let factory = Arc::new(HttpBackendFactory::new(reqwest::Client::new(), config.openai.api_key.clone()));
//! let orchestrator = CompletionOrchestrator::from_config(&config, factory);
//!
//! let request = ChatRequest { message: Some("Hello!".into()), ..Default::default() };
//! if let ChatResponse::Reply(reply) = orchestrator.handle(request).await? {
//!     println!("{reply}");
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod error;
pub mod messages;
pub mod orchestrator;
pub mod prompt;
pub mod routing;
pub mod transcript;
pub mod workflow;

// Re-export key types at crate root
pub use backend::{
    BackendError, Completion, LlmBackend, LlmRequest, LlmResponse, ModelInfo, OllamaBackend,
    OpenAiBackend, StreamingToken,
};
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ConfigError,
    ConfigOverrides, ConfigSource, RelayConfig,
};
pub use error::RelayError;
pub use messages::{HistoryEntry, ImageBlob, Message, MessageRole, Modality};
pub use orchestrator::{ChatEvent, ChatEventStream, ChatRequest, ChatResponse, CompletionOrchestrator};
pub use prompt::{PromptBuilder, PromptConfig, PromptSpec};
pub use routing::{BackendDescriptor, BackendFactory, BackendKind, FallbackChain, HttpBackendFactory};
pub use transcript::{
    extract_video_id, TranscriptError, TranscriptSegment, TranscriptSource, YouTubeTranscripts,
};
pub use workflow::{SummaryMode, TranscriptWorkflow};
