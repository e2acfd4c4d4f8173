//! Fallback Chain
//!
//! Sequential failover across backend candidates. Candidates are tried in
//! ascending priority; the first one that produces content (or establishes a
//! stream) wins and no later candidate is contacted. Every failure is logged
//! and swallowed until the list runs out.
//!
//! Once a stream has been handed back the chain is done with it: a failure
//! in the middle of a stream surfaces as a terminal stream event, never as a
//! retry on the next candidate.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::{BackendDescriptor, BackendKind};
use crate::backend::{BackendError, Completion, LlmBackend, LlmRequest, OllamaBackend, OpenAiBackend};
use crate::messages::Modality;

// ============================================================================
// Backend Factory
// ============================================================================

/// Turns a descriptor into a live client
pub trait BackendFactory: Send + Sync {
    /// Client for the descriptor, or `None` if it cannot be served
    fn client_for(&self, descriptor: &BackendDescriptor) -> Option<Arc<dyn LlmBackend>>;
}

/// Factory building HTTP clients that share one connection pool
#[derive(Clone)]
pub struct HttpBackendFactory {
    http_client: reqwest::Client,
    openai_api_key: Option<String>,
}

impl std::fmt::Debug for HttpBackendFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendFactory")
            .field("openai_configured", &self.openai_api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpBackendFactory {
    /// Create a factory; OpenAI descriptors are only served when a key is given
    #[must_use]
    pub fn new(http_client: reqwest::Client, openai_api_key: Option<String>) -> Self {
        Self {
            http_client,
            openai_api_key,
        }
    }
}

impl BackendFactory for HttpBackendFactory {
    fn client_for(&self, descriptor: &BackendDescriptor) -> Option<Arc<dyn LlmBackend>> {
        match descriptor.kind {
            BackendKind::Ollama => Some(Arc::new(OllamaBackend::with_client(
                descriptor.endpoint.as_str(),
                self.http_client.clone(),
            ))),
            BackendKind::OpenAi => {
                let api_key = self.openai_api_key.as_deref()?;
                Some(Arc::new(
                    OpenAiBackend::with_client(api_key, self.http_client.clone())
                        .with_base_url(descriptor.endpoint.as_str()),
                ))
            }
        }
    }
}

// ============================================================================
// Fallback Chain
// ============================================================================

/// Ordered candidates for one request
#[derive(Clone, Debug, Default)]
pub struct FallbackChain {
    candidates: Vec<BackendDescriptor>,
}

impl FallbackChain {
    /// Order candidates by ascending priority, keeping configured order for ties
    #[must_use]
    pub fn new(mut candidates: Vec<BackendDescriptor>) -> Self {
        candidates.sort_by_key(|c| c.priority);
        Self { candidates }
    }

    /// Chain of the catalog entries that can serve the modality
    #[must_use]
    pub fn for_modality(catalog: &[BackendDescriptor], modality: Modality) -> Self {
        Self::new(
            catalog
                .iter()
                .filter(|c| c.supports(modality))
                .cloned()
                .collect(),
        )
    }

    /// Candidates in the order they will be tried
    #[must_use]
    pub fn candidates(&self) -> &[BackendDescriptor] {
        &self.candidates
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether there is nothing to try
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Try each candidate in turn with `template` retargeted at its model
    ///
    /// # Errors
    ///
    /// Returns `AllBackendsExhausted` carrying the number of attempts and the
    /// last failure when no candidate succeeds.
    pub async fn resolve(
        &self,
        factory: &dyn BackendFactory,
        template: &LlmRequest,
    ) -> Result<Completion, BackendError> {
        let mut attempts = 0;
        let mut last = None;

        for candidate in &self.candidates {
            let Some(client) = factory.client_for(candidate) else {
                debug!(candidate = %candidate.name, "No client for candidate, skipping");
                continue;
            };

            attempts += 1;
            let request = template.for_model(candidate.model_id.as_str());

            match client.complete(&request).await {
                Ok(completion) => {
                    info!(
                        candidate = %candidate.name,
                        backend = client.name(),
                        attempt = attempts,
                        stream = request.stream,
                        "Candidate succeeded"
                    );
                    return Ok(completion);
                }
                Err(e) => {
                    warn!(
                        candidate = %candidate.name,
                        backend = client.name(),
                        attempt = attempts,
                        error = %e,
                        "Candidate failed, trying next"
                    );
                    last = Some(Box::new(e));
                }
            }
        }

        Err(BackendError::AllBackendsExhausted { attempts, last })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(kind: BackendKind, model: &str, priority: u32) -> BackendDescriptor {
        BackendDescriptor::new(kind, "http://localhost:11434", model, Modality::Vision, priority)
    }

    #[test]
    fn test_stable_priority_order() {
        let chain = FallbackChain::new(vec![
            descriptor(BackendKind::OpenAi, "gpt-4o", 200),
            descriptor(BackendKind::Ollama, "llava:13b", 100),
            descriptor(BackendKind::Ollama, "llava:7b", 100),
            descriptor(BackendKind::Ollama, "llava:latest", 50),
        ]);

        let order: Vec<_> = chain.candidates().iter().map(|c| c.model_id.as_str()).collect();
        assert_eq!(order, vec!["llava:latest", "llava:13b", "llava:7b", "gpt-4o"]);
    }

    #[test]
    fn test_for_modality_filters() {
        let catalog = vec![
            BackendDescriptor::new(BackendKind::Ollama, "e", "llama3.1:8b", Modality::Text, 0),
            BackendDescriptor::new(BackendKind::Ollama, "e", "llava:latest", Modality::Vision, 100),
        ];
        assert_eq!(FallbackChain::for_modality(&catalog, Modality::Text).len(), 1);
        assert_eq!(
            FallbackChain::for_modality(&catalog, Modality::Vision).candidates()[0].model_id,
            "llava:latest"
        );
        assert!(FallbackChain::new(Vec::new()).is_empty());
    }

    #[test]
    fn test_http_factory_requires_key_for_openai() {
        let without_key = HttpBackendFactory::new(reqwest::Client::new(), None);
        assert!(without_key
            .client_for(&descriptor(BackendKind::OpenAi, "gpt-4o", 0))
            .is_none());
        assert!(without_key
            .client_for(&descriptor(BackendKind::Ollama, "llava:7b", 0))
            .is_some());

        let with_key = HttpBackendFactory::new(reqwest::Client::new(), Some("sk".into()));
        let client = with_key
            .client_for(&descriptor(BackendKind::OpenAi, "gpt-4o", 0))
            .unwrap();
        assert_eq!(client.name(), "OpenAI");
    }

    #[test]
    fn test_empty_chain_is_exhausted_without_attempts() {
        let factory = HttpBackendFactory::new(reqwest::Client::new(), None);
        let chain = FallbackChain::default();
        let result = tokio_test::block_on(chain.resolve(&factory, &LlmRequest::new("hi", "")));

        assert!(matches!(
            result,
            Err(BackendError::AllBackendsExhausted {
                attempts: 0,
                last: None
            })
        ));
    }
}
