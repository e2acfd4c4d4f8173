//! Transcript Workflow
//!
//! Summarize or explain a YouTube video: fetch its transcript, wrap it in a
//! fixed instructional template and ask the local model, falling back to the
//! cloud model when one is configured. No conversation history applies.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::backend::LlmRequest;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::routing::{transcript_candidates, BackendDescriptor, BackendFactory, FallbackChain};
use crate::transcript::{extract_video_id, join_segments, TranscriptSource};

const SUMMARY_TEMPLATE: &str = include_str!("./prompts/summary.txt");
const EXPLANATION_TEMPLATE: &str = include_str!("./prompts/explanation.txt");

/// What to produce from a transcript
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SummaryMode {
    /// Short summary of the key points
    Summary,
    /// Long, sectioned teaching explanation
    Explanation,
}

impl SummaryMode {
    /// Noun used in responses and error messages (`summary` / `explanation`)
    #[must_use]
    pub fn action(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Explanation => "explanation",
        }
    }

    /// Full prompt for a transcript
    #[must_use]
    pub fn render_prompt(self, transcript: &str) -> String {
        let template = match self {
            Self::Summary => SUMMARY_TEMPLATE,
            Self::Explanation => EXPLANATION_TEMPLATE,
        };
        template.trim_end().replace("{transcript}", transcript)
    }
}

impl std::fmt::Display for SummaryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action())
    }
}

/// Runs summary and explanation requests
pub struct TranscriptWorkflow {
    source: Arc<dyn TranscriptSource>,
    factory: Arc<dyn BackendFactory>,
    summary_candidates: Vec<BackendDescriptor>,
    explanation_candidates: Vec<BackendDescriptor>,
    timeout: Duration,
}

impl TranscriptWorkflow {
    /// Create a workflow with explicit candidate lists per mode
    #[must_use]
    pub fn new(
        source: Arc<dyn TranscriptSource>,
        factory: Arc<dyn BackendFactory>,
        summary_candidates: Vec<BackendDescriptor>,
        explanation_candidates: Vec<BackendDescriptor>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            factory,
            summary_candidates,
            explanation_candidates,
            timeout,
        }
    }

    /// Create a workflow using the configured models and timeout
    #[must_use]
    pub fn from_config(
        config: &RelayConfig,
        source: Arc<dyn TranscriptSource>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        Self::new(
            source,
            factory,
            transcript_candidates(config, &config.ollama.summary_model),
            transcript_candidates(config, &config.ollama.explanation_model),
            config.timeouts.transcript,
        )
    }

    fn candidates(&self, mode: SummaryMode) -> &[BackendDescriptor] {
        match mode {
            SummaryMode::Summary => &self.summary_candidates,
            SummaryMode::Explanation => &self.explanation_candidates,
        }
    }

    /// Produce a summary or explanation for the video at `youtube_url`
    ///
    /// # Errors
    ///
    /// `BadRequest` for a missing or unrecognised URL, the transcript error
    /// kinds for retrieval failures, `EmptyTranscript` when the captions hold
    /// no text and `AllBackendsExhausted` when no model produced content.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, youtube_url: Option<&str>, mode: SummaryMode) -> Result<String, RelayError> {
        let url = youtube_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RelayError::BadRequest("YouTube URL is required".to_string()))?;

        let video_id = extract_video_id(url)
            .ok_or_else(|| RelayError::BadRequest("Invalid YouTube URL format".to_string()))?;

        info!(video_id = %video_id, "Fetching transcript");
        let segments = self.source.fetch(&video_id).await.map_err(|e| {
            warn!(video_id = %video_id, error = %e, "Transcript fetch failed");
            RelayError::from(e)
        })?;

        let transcript = join_segments(&segments);
        if transcript.trim().is_empty() {
            return Err(RelayError::EmptyTranscript);
        }

        let request = LlmRequest::new(mode.render_prompt(&transcript), "")
            .with_stream(false)
            .with_timeout(self.timeout);

        let chain = FallbackChain::new(self.candidates(mode).to_vec());
        let outcome = match chain.resolve(self.factory.as_ref(), &request).await {
            Ok(completion) => completion.into_text().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(text) => {
                info!(video_id = %video_id, chars = text.len(), "Transcript workflow complete");
                Ok(text)
            }
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "All backends failed");
                Err(RelayError::AllBackendsExhausted(mode.action().to_string()))
            }
        }
    }
}
