//! Routing Configuration
//!
//! Static descriptions of the backends a request may be routed to. The
//! descriptor list is built once from [`RelayConfig`] and filtered per
//! modality when a request arrives.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::RelayConfig;
use crate::messages::Modality;

// ============================================================================
// Backend Kinds
// ============================================================================

/// Wire protocol spoken by a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local Ollama server
    Ollama,
    /// OpenAI-compatible chat completions API
    OpenAi,
}

impl BackendKind {
    /// Name used in logs and health output
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// One routable (backend, model) pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Display name, e.g. `ollama/llava:13b`
    pub name: String,
    /// Protocol
    pub kind: BackendKind,
    /// Modalities this model can serve
    pub modality_support: HashSet<Modality>,
    /// Base URL of the backend
    pub endpoint: String,
    /// Model identifier sent to the backend
    pub model_id: String,
    /// Lower values are tried first
    pub priority: u32,
}

impl BackendDescriptor {
    /// Create a descriptor supporting a single modality
    pub fn new(
        kind: BackendKind,
        endpoint: impl Into<String>,
        model_id: impl Into<String>,
        modality: Modality,
        priority: u32,
    ) -> Self {
        let model_id = model_id.into();
        Self {
            name: format!("{}/{}", kind.as_str(), model_id),
            kind,
            modality_support: HashSet::from([modality]),
            endpoint: endpoint.into(),
            model_id,
            priority,
        }
    }

    /// Also serve another modality
    #[must_use]
    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality_support.insert(modality);
        self
    }

    /// Whether this candidate can serve the modality
    #[must_use]
    pub fn supports(&self, modality: Modality) -> bool {
        self.modality_support.contains(&modality)
    }
}

// ============================================================================
// Catalogs
// ============================================================================

/// Priority band for local text models
const LOCAL_TEXT_BAND: u32 = 0;
/// Priority band for local vision models
const LOCAL_VISION_BAND: u32 = 100;
/// Priority band for cloud models
const CLOUD_BAND: u32 = 200;

/// Candidates for interactive chat
///
/// Local text models, then local vision models in configured order, then one
/// cloud vision candidate when an OpenAI key is present.
#[must_use]
pub fn chat_candidates(config: &RelayConfig) -> Vec<BackendDescriptor> {
    let endpoint = &config.ollama.endpoint;
    let mut candidates = Vec::new();

    for (priority, model) in (LOCAL_TEXT_BAND..).zip(&config.ollama.text_models) {
        candidates.push(BackendDescriptor::new(
            BackendKind::Ollama,
            endpoint.as_str(),
            model.as_str(),
            Modality::Text,
            priority,
        ));
    }

    for (priority, model) in (LOCAL_VISION_BAND..).zip(&config.ollama.vision_models) {
        candidates.push(BackendDescriptor::new(
            BackendKind::Ollama,
            endpoint.as_str(),
            model.as_str(),
            Modality::Vision,
            priority,
        ));
    }

    if config.openai.api_key.is_some() {
        candidates.push(BackendDescriptor::new(
            BackendKind::OpenAi,
            config.openai.base_url.as_str(),
            config.openai.vision_model.as_str(),
            Modality::Vision,
            CLOUD_BAND,
        ));
    }

    candidates
}

/// Candidates for a transcript workflow run with the given local model
///
/// The local model first; the cloud text model only when a key is present.
#[must_use]
pub fn transcript_candidates(config: &RelayConfig, local_model: &str) -> Vec<BackendDescriptor> {
    let mut candidates = vec![BackendDescriptor::new(
        BackendKind::Ollama,
        config.ollama.endpoint.as_str(),
        local_model,
        Modality::Text,
        LOCAL_TEXT_BAND,
    )];

    if config.openai.api_key.is_some() {
        candidates.push(BackendDescriptor::new(
            BackendKind::OpenAi,
            config.openai.base_url.as_str(),
            config.openai.text_model.as_str(),
            Modality::Text,
            CLOUD_BAND,
        ));
    }

    candidates
}
