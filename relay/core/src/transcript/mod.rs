//! Video Transcripts
//!
//! Retrieval of caption text for a YouTube video. The workflow only depends
//! on the [`TranscriptSource`] trait; [`YouTubeTranscripts`] is the HTTP
//! implementation used by the daemon.

mod youtube;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use youtube::{YouTubeTranscripts, DEFAULT_LANGUAGES};

/// One caption cue
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Caption text
    pub text: String,
    /// Offset from the start of the video, in seconds
    pub start: f64,
    /// Cue duration, in seconds
    pub duration: f64,
}

impl TranscriptSegment {
    /// Create a segment
    pub fn new(text: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            text: text.into(),
            start,
            duration,
        }
    }
}

/// Why a transcript could not be produced
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    /// Captions are turned off for the video
    #[error("transcripts are disabled for this video")]
    TranscriptsDisabled,

    /// No caption track in an accepted language
    #[error("no transcript in an accepted language")]
    NotFound,

    /// Video is private, removed or otherwise unplayable
    #[error("video unavailable")]
    VideoUnavailable,

    /// The caption body could not be parsed
    #[error("malformed transcript: {0}")]
    Malformed(String),

    /// Transport or unexpected upstream failure
    #[error("{0}")]
    Request(String),
}

impl From<reqwest::Error> for TranscriptError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

/// Anything that can produce a transcript for a video id
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch the caption cues for `video_id`, in playback order
    async fn fetch(&self, video_id: &str) -> Result<Vec<TranscriptSegment>, TranscriptError>;
}

/// Pull the video id out of a watch or short link
///
/// Accepts `...watch?v=<id>[&...]` and `https://youtu.be/<id>[?...]`.
#[must_use]
pub fn extract_video_id(url: &str) -> Option<String> {
    let id = if let Some((_, rest)) = url.split_once("v=") {
        rest.split('&').next()
    } else if let Some((_, rest)) = url.split_once("youtu.be/") {
        rest.split('?').next()
    } else {
        None
    };

    id.map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Join segment texts into one passage separated by single spaces
#[must_use]
pub fn join_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_watch_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=abc123&t=42s&list=x").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn test_extract_short_url() {
        assert_eq!(
            extract_video_id("https://youtu.be/xyz789").as_deref(),
            Some("xyz789")
        );
        assert_eq!(
            extract_video_id("https://youtu.be/xyz789?si=share").as_deref(),
            Some("xyz789")
        );
    }

    #[test]
    fn test_extract_invalid() {
        assert_eq!(extract_video_id("https://example.com/video"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v="), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn test_join_segments() {
        let segments = vec![
            TranscriptSegment::new("Hello", 0.0, 1.0),
            TranscriptSegment::new("  ", 1.0, 0.5),
            TranscriptSegment::new("world ", 1.5, 1.0),
        ];
        assert_eq!(join_segments(&segments), "Hello world");
        assert_eq!(join_segments(&[]), "");
    }
}
