//! Backend Routing
//!
//! Decides which backends a request may use and walks them in order.
//!
//! # Architecture
//!
//! ```text
//! +--------------------+
//! |   RelayConfig      |  <-- endpoints, model lists, API keys
//! +---------+----------+
//!           |
//!           v
//! +--------------------+
//! | BackendDescriptor  |  <-- static (kind, endpoint, model, modality, priority)
//! +---------+----------+
//!           |  filtered per modality
//!           v
//! +--------------------+
//! |   FallbackChain    |  <-- tries candidates in priority order
//! +---------+----------+
//!           |
//!           v
//! +--------------------+
//! |  BackendFactory    |  <-- descriptor -> dyn LlmBackend
//! +--------------------+
//! ```

pub mod config;
pub mod fallback;

pub use config::{chat_candidates, transcript_candidates, BackendDescriptor, BackendKind};
pub use fallback::{BackendFactory, FallbackChain, HttpBackendFactory};
