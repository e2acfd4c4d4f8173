//! LLM Backend Integration
//!
//! This module provides abstracted access to LLM backends (Ollama, OpenAI)
//! through a common trait interface.
//!
//! # Available Backends
//!
//! - **Ollama**: Local LLM server (default for text and vision)
//! - **OpenAI**: Cloud fallback, only used when an API key is configured
//!
//! # Usage
//!
//! ```ignore
//! use relay_core::backend::{OllamaBackend, LlmBackend, LlmRequest};
//!
//! let backend = OllamaBackend::default();
//! let request = LlmRequest::new("Hello!", "llama3.1:8b").with_stream(true);
//! let completion = backend.complete(&request).await?;
//! ```

mod lines;
mod ollama;
mod openai;
mod traits;

pub use ollama::{OllamaBackend, DEFAULT_OLLAMA_ENDPOINT};
pub use openai::{OpenAiBackend, DEFAULT_OPENAI_BASE_URL, MAX_IMAGES};
pub use traits::{
    BackendError, Completion, LlmBackend, LlmRequest, LlmResponse, ModelInfo, StreamingToken,
    DEFAULT_TEXT_TIMEOUT,
};
