//! Chat Messages
//!
//! Typed conversation messages as they arrive from the web client. The relay
//! never stores or mutates them: a request carries its full history, the
//! history is windowed and rendered into a prompt, and the values are dropped
//! when the request completes.
//!
//! # Wire Format
//!
//! The client sends history entries as `{ "type": "user" | "ai", "content": "..." }`.
//! Anything other than `"user"` is treated as an assistant turn.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Prefix that marks inline image payloads (data URLs)
pub const IMAGE_DATA_MARKER: &str = "data:image";

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message typed by the user
    User,
    /// Message produced by the model
    Assistant,
}

impl MessageRole {
    /// Map the client's `type` field to a role
    #[must_use]
    pub fn from_wire(kind: &str) -> Self {
        if kind == "user" {
            Self::User
        } else {
            Self::Assistant
        }
    }

    /// Label used when replaying the message into a prompt
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// Request mode: plain text, or text plus images
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Text-only chat
    Text,
    /// Chat with one or more image attachments
    Vision,
}

impl Modality {
    /// Stable lowercase name, used in logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image exactly as the client sent it
///
/// Either a bare base64 payload or a full `data:image/...;base64,` URL.
/// Backends disagree on which form they want, so both are derivable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageBlob(String);

impl ImageBlob {
    /// Wrap a raw client payload
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The payload as received
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the payload carries a `data:image` header
    #[must_use]
    pub fn is_data_url(&self) -> bool {
        self.0.starts_with(IMAGE_DATA_MARKER)
    }

    /// Base64 body without any data URL header
    #[must_use]
    pub fn bare_base64(&self) -> &str {
        if self.is_data_url() {
            self.0
                .split_once(',')
                .map_or(self.0.as_str(), |(_, body)| body)
        } else {
            &self.0
        }
    }

    /// Full data URL; bare payloads are assumed to be JPEG
    #[must_use]
    pub fn data_url(&self) -> Cow<'_, str> {
        if self.is_data_url() {
            Cow::Borrowed(&self.0)
        } else {
            Cow::Owned(format!("data:image/jpeg;base64,{}", self.0))
        }
    }
}

/// A single conversation turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Who sent this message
    pub role: MessageRole,
    /// Message text (may be an inlined image payload for older clients)
    pub content: String,
    /// Images attached to this turn, in client order
    pub attachments: Vec<ImageBlob>,
}

impl Message {
    /// Create a message without attachments
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Attach images
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<ImageBlob>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Modality this message forces when it is the current turn
    #[must_use]
    pub fn modality(&self) -> Modality {
        if self.attachments.is_empty() {
            Modality::Text
        } else {
            Modality::Vision
        }
    }

    /// Whether the text body is itself an inlined image rather than prose
    #[must_use]
    pub fn is_inline_image(&self) -> bool {
        self.content.trim().starts_with(IMAGE_DATA_MARKER)
    }
}

/// History entry as serialized by the web client
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `"user"` for user turns, anything else for assistant turns
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Message text
    #[serde(default)]
    pub content: String,
}

impl From<HistoryEntry> for Message {
    fn from(entry: HistoryEntry) -> Self {
        Self::new(MessageRole::from_wire(&entry.kind), entry.content)
    }
}
