//! YouTube caption retrieval
//!
//! The watch page embeds a `ytInitialPlayerResponse` JSON object that lists
//! the caption tracks. Each track has a `baseUrl` returning timed-text XML:
//!
//! ```text
//! <transcript>
//!   <text start="0.0" dur="1.5">Hello &amp;amp; welcome</text>
//!   ...
//! </transcript>
//! ```
//!
//! Cue text is entity-encoded twice (once for XML, once for HTML).

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use super::{TranscriptError, TranscriptSegment, TranscriptSource};

/// Caption languages accepted by default, in preference order
pub const DEFAULT_LANGUAGES: [&str; 3] = ["en", "en-US", "en-GB"];

const WATCH_URL: &str = "https://www.youtube.com/watch";

const PLAYER_RESPONSE_PATTERN: &str =
    r"(?s)ytInitialPlayerResponse\s*=\s*(\{.+?\})\s*;\s*(?:var\s+meta|</script>)";

static PLAYER_RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLAYER_RESPONSE_PATTERN).unwrap());

static TEXT_ELEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text([^>]*)>(.*?)</text>").unwrap());

static ATTRIBUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).unwrap());

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

// ============================================================================
// Player Response
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    #[serde(default)]
    playability_status: Option<PlayabilityStatus>,
    #[serde(default)]
    captions: Option<Captions>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Captions {
    #[serde(default)]
    player_captions_tracklist_renderer: Option<TrackList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackList {
    #[serde(default)]
    caption_tracks: Vec<CaptionTrack>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    language_code: String,
    /// `"asr"` for auto-generated tracks
    #[serde(default)]
    kind: Option<String>,
}

impl CaptionTrack {
    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

fn parse_player_response(html: &str) -> Result<PlayerResponse, TranscriptError> {
    let Some(captures) = PLAYER_RESPONSE_RE.captures(html) else {
        return Err(TranscriptError::VideoUnavailable);
    };
    serde_json::from_str(&captures[1])
        .map_err(|e| TranscriptError::Request(format!("unreadable player response: {e}")))
}

/// Pick the caption track to download
///
/// Languages are tried in order; within a language a manual track beats an
/// auto-generated one.
fn select_track(
    player: &PlayerResponse,
    languages: &[String],
) -> Result<CaptionTrack, TranscriptError> {
    let status = player
        .playability_status
        .as_ref()
        .map_or("", |p| p.status.as_str());
    if status != "OK" {
        return Err(TranscriptError::VideoUnavailable);
    }

    let tracks = player
        .captions
        .as_ref()
        .and_then(|c| c.player_captions_tracklist_renderer.as_ref())
        .map(|r| r.caption_tracks.as_slice())
        .unwrap_or_default();
    if tracks.is_empty() {
        return Err(TranscriptError::TranscriptsDisabled);
    }

    for language in languages {
        let mut matching = tracks.iter().filter(|t| &t.language_code == language);
        let manual = matching.clone().find(|t| !t.is_generated());
        if let Some(track) = manual.or_else(|| matching.next()) {
            return Ok(track.clone());
        }
    }

    Err(TranscriptError::NotFound)
}

// ============================================================================
// Timed Text
// ============================================================================

/// Decode the XML/HTML entities that appear in caption text
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Parse a timed-text document into segments
fn parse_timed_text(body: &str) -> Result<Vec<TranscriptSegment>, TranscriptError> {
    if !body.contains("<transcript") {
        return Err(TranscriptError::Malformed(
            "response is not a timed-text document".to_string(),
        ));
    }

    let segments = TEXT_ELEMENT_RE
        .captures_iter(body)
        .map(|captures| {
            let mut start = 0.0;
            let mut duration = 0.0;
            for attr in ATTRIBUTE_RE.captures_iter(&captures[1]) {
                match &attr[1] {
                    "start" => start = attr[2].parse().unwrap_or(0.0),
                    "dur" => duration = attr[2].parse().unwrap_or(0.0),
                    _ => {}
                }
            }

            // Once for the XML layer, once for the HTML inside it
            let text = decode_entities(&decode_entities(&captures[2]));
            let text = TAG_RE.replace_all(&text, "");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

            TranscriptSegment::new(text, start, duration)
        })
        .collect();

    Ok(segments)
}

// ============================================================================
// Source
// ============================================================================

/// Transcript source backed by youtube.com
#[derive(Clone, Debug)]
pub struct YouTubeTranscripts {
    http_client: reqwest::Client,
    languages: Vec<String>,
}

impl YouTubeTranscripts {
    /// Create a source accepting the given languages, in preference order
    #[must_use]
    pub fn new(http_client: reqwest::Client, languages: Vec<String>) -> Self {
        Self {
            http_client,
            languages,
        }
    }

    async fn watch_page(&self, video_id: &str) -> Result<String, TranscriptError> {
        let response = self
            .http_client
            .get(WATCH_URL)
            .query(&[("v", video_id)])
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TranscriptError::Request(format!(
                "watch page returned {}",
                response.status()
            )));
        }

        Ok(response.text().await?)
    }
}

impl Default for YouTubeTranscripts {
    fn default() -> Self {
        Self::new(
            reqwest::Client::new(),
            DEFAULT_LANGUAGES.iter().map(ToString::to_string).collect(),
        )
    }
}

#[async_trait]
impl TranscriptSource for YouTubeTranscripts {
    async fn fetch(&self, video_id: &str) -> Result<Vec<TranscriptSegment>, TranscriptError> {
        let html = self.watch_page(video_id).await?;
        let player = parse_player_response(&html)?;
        let track = select_track(&player, &self.languages)?;

        debug!(
            video_id,
            language = %track.language_code,
            generated = track.is_generated(),
            "Selected caption track"
        );

        let url = track.base_url.replace("&fmt=srv3", "");
        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TranscriptError::Request(format!(
                "timed text returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let segments = parse_timed_text(&body)?;
        info!(video_id, segments = segments.len(), "Fetched transcript");
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn languages() -> Vec<String> {
        DEFAULT_LANGUAGES.iter().map(ToString::to_string).collect()
    }

    fn watch_page(player_json: &str) -> String {
        format!(
            "<html><script>var ytInitialPlayerResponse = {player_json};var meta = document.createElement('meta');</script></html>"
        )
    }

    #[test]
    fn test_entity_decoding() {
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("it&#39;s &quot;fine&quot;"), "it's \"fine\"");
        assert_eq!(decode_entities("&#x41;&lt;b&gt;"), "A<b>");
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
        assert_eq!(decode_entities("&unknown; x"), "&unknown; x");
    }

    #[test]
    fn test_parse_timed_text() {
        let body = r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0.5" dur="2.1">Hello &amp;amp; welcome</text><text start="2.6" dur="1">it&amp;#39;s
a test</text></transcript>"#;

        let segments = parse_timed_text(body).unwrap();
        assert_eq!(
            segments,
            vec![
                TranscriptSegment::new("Hello & welcome", 0.5, 2.1),
                TranscriptSegment::new("it's a test", 2.6, 1.0),
            ]
        );
    }

    #[test]
    fn test_parse_timed_text_empty_and_malformed() {
        assert!(parse_timed_text("<transcript></transcript>")
            .unwrap()
            .is_empty());
        assert!(matches!(
            parse_timed_text(""),
            Err(TranscriptError::Malformed(_))
        ));
        assert!(matches!(
            parse_timed_text("<html>captcha</html>"),
            Err(TranscriptError::Malformed(_))
        ));
    }

    #[test]
    fn test_track_selection_prefers_manual() {
        let html = watch_page(
            r#"{"playabilityStatus":{"status":"OK"},"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[
                {"baseUrl":"https://example.test/asr","languageCode":"en","kind":"asr"},
                {"baseUrl":"https://example.test/manual","languageCode":"en"},
                {"baseUrl":"https://example.test/fr","languageCode":"fr"}]}}}"#,
        );
        let player = parse_player_response(&html).unwrap();
        let track = select_track(&player, &languages()).unwrap();
        assert_eq!(track.base_url, "https://example.test/manual");
    }

    #[test]
    fn test_track_selection_language_order() {
        let html = watch_page(
            r#"{"playabilityStatus":{"status":"OK"},"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[
                {"baseUrl":"https://example.test/gb","languageCode":"en-GB"},
                {"baseUrl":"https://example.test/us","languageCode":"en-US"}]}}}"#,
        );
        let player = parse_player_response(&html).unwrap();
        assert_eq!(
            select_track(&player, &languages()).unwrap().base_url,
            "https://example.test/us"
        );
    }

    #[test]
    fn test_track_selection_errors() {
        let no_english = watch_page(
            r#"{"playabilityStatus":{"status":"OK"},"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[
                {"baseUrl":"https://example.test/de","languageCode":"de"}]}}}"#,
        );
        let player = parse_player_response(&no_english).unwrap();
        assert_eq!(
            select_track(&player, &languages()).unwrap_err(),
            TranscriptError::NotFound
        );

        let disabled = watch_page(r#"{"playabilityStatus":{"status":"OK"}}"#);
        let player = parse_player_response(&disabled).unwrap();
        assert_eq!(
            select_track(&player, &languages()).unwrap_err(),
            TranscriptError::TranscriptsDisabled
        );

        let private = watch_page(r#"{"playabilityStatus":{"status":"LOGIN_REQUIRED"}}"#);
        let player = parse_player_response(&private).unwrap();
        assert_eq!(
            select_track(&player, &languages()).unwrap_err(),
            TranscriptError::VideoUnavailable
        );
    }

    #[test]
    fn test_missing_player_response() {
        assert_eq!(
            parse_player_response("<html></html>").unwrap_err(),
            TranscriptError::VideoUnavailable
        );
    }
}
