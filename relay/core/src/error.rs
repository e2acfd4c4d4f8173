//! Relay Errors
//!
//! Every failure a client can observe. Each variant carries a fixed HTTP
//! status and a user-facing message (its `Display` text); backend and
//! transport details are logged, not returned.

use thiserror::Error;

use crate::backend::BackendError;
use crate::messages::Modality;
use crate::transcript::TranscriptError;

/// Client-visible failure of a chat or transcript request
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Invalid or incomplete request body
    #[error("{0}")]
    BadRequest(String),

    /// The video has captions turned off
    #[error("Transcripts are disabled for this video.")]
    TranscriptsDisabled,

    /// No transcript in a supported language
    #[error("No transcript found for this video. It might be disabled or not available in English.")]
    TranscriptNotFound,

    /// The video cannot be played
    #[error("This video is unavailable or private.")]
    VideoUnavailable,

    /// Transcript body could not be parsed
    #[error("Failed to parse transcript data. The video transcript format may be corrupted.")]
    MalformedTranscript,

    /// Transcript parsed but had no text
    #[error("Fetched transcript is empty.")]
    EmptyTranscript,

    /// Any other transcript retrieval failure
    #[error("An unexpected error occurred: {0}")]
    TranscriptFetch(String),

    /// The model call timed out
    #[error("Request to AI model timed out.")]
    BackendTimeout,

    /// The model server could not be reached
    #[error("Could not connect to the AI model.")]
    BackendUnreachable,

    /// The model answered with nothing
    #[error("AI model did not provide a reply.")]
    BackendEmptyResponse,

    /// The model call failed for another reason; the detail is for logs only
    #[error("Failed to communicate with the AI model.")]
    BackendFailed(String),

    /// No vision-capable backend could serve the request
    #[error("Image analysis is not available. Please install LLaVA model in Ollama or configure OpenAI API key.")]
    VisionUnavailable,

    /// Every transcript workflow backend failed; carries the action name
    #[error("Failed to get {0} using all available methods.")]
    AllBackendsExhausted(String),
}

impl RelayError {
    /// HTTP status code for this error
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::TranscriptsDisabled => 403,
            Self::TranscriptNotFound | Self::VideoUnavailable => 404,
            Self::MalformedTranscript
            | Self::EmptyTranscript
            | Self::TranscriptFetch(_)
            | Self::BackendEmptyResponse
            | Self::AllBackendsExhausted(_) => 500,
            Self::BackendFailed(_) => 502,
            Self::BackendUnreachable | Self::VisionUnavailable => 503,
            Self::BackendTimeout => 504,
        }
    }

    /// Map a failed chat chain to the error the client sees
    ///
    /// Vision exhaustion always means no image model is available. Text
    /// failures are reported by the kind of the last attempt.
    #[must_use]
    pub fn from_chat_failure(modality: Modality, error: &BackendError) -> Self {
        if modality == Modality::Vision {
            return Self::VisionUnavailable;
        }

        match error.root_cause() {
            Some(BackendError::Timeout) => Self::BackendTimeout,
            Some(BackendError::Unreachable(_)) => Self::BackendUnreachable,
            Some(BackendError::EmptyResponse) => Self::BackendEmptyResponse,
            Some(BackendError::Other(detail)) => Self::BackendFailed(detail.clone()),
            Some(BackendError::AllBackendsExhausted { .. }) | None => Self::BackendUnreachable,
        }
    }
}

impl From<TranscriptError> for RelayError {
    fn from(error: TranscriptError) -> Self {
        match error {
            TranscriptError::TranscriptsDisabled => Self::TranscriptsDisabled,
            TranscriptError::NotFound => Self::TranscriptNotFound,
            TranscriptError::VideoUnavailable => Self::VideoUnavailable,
            TranscriptError::Malformed(_) => Self::MalformedTranscript,
            TranscriptError::Request(detail) => Self::TranscriptFetch(detail),
        }
    }
}
