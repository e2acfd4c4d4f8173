//! Prompt Building
//!
//! Renders a bounded slice of the conversation plus the new user turn into a
//! single plain-text prompt. Text and vision prompts differ in their preamble,
//! history window, truncation and the way the final turn is written. The
//! preamble is sent as the request's system text; Ollama joins it to the
//! conversation with a blank line, giving:
//!
//! ```text
//! <preamble>
//!
//! User: earlier question
//! Assistant: earlier answer
//! User: new message
//! Assistant:
//! ```
//!
//! Vision prompts end at `User: <message>` so the image-capable model answers
//! about the attached images.

use std::borrow::Cow;

use crate::messages::{ImageBlob, Message, Modality};

/// Question used when an image arrives without any text
pub const DEFAULT_VISION_QUESTION: &str =
    "What do you see in this image? Please describe it in detail.";

const TEXT_PREAMBLE: &str = "You are ConvoScribe, a helpful AI assistant. You have context awareness and can reference previous parts of our conversation.";

const VISION_PREAMBLE: &str = "You are ConvoScribe, a helpful AI assistant with vision capabilities. You can see and analyze images. You have context awareness and can reference previous parts of our conversation.";

/// Tunables for prompt rendering
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptConfig {
    /// History messages kept for text prompts
    pub text_window: usize,
    /// History messages kept for vision prompts
    pub vision_window: usize,
    /// Characters kept per history message in vision prompts
    pub vision_max_chars: usize,
    /// Preamble for text prompts
    pub text_preamble: String,
    /// Preamble for vision prompts
    pub vision_preamble: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            text_window: 20,
            vision_window: 16,
            vision_max_chars: 200,
            text_preamble: TEXT_PREAMBLE.to_string(),
            vision_preamble: VISION_PREAMBLE.to_string(),
        }
    }
}

impl PromptConfig {
    /// History window for a modality
    #[must_use]
    pub fn window_for(&self, modality: Modality) -> usize {
        match modality {
            Modality::Text => self.text_window,
            Modality::Vision => self.vision_window,
        }
    }

    /// Preamble for a modality
    #[must_use]
    pub fn preamble_for(&self, modality: Modality) -> &str {
        match modality {
            Modality::Text => &self.text_preamble,
            Modality::Vision => &self.vision_preamble,
        }
    }
}

/// Everything needed to render one prompt; built per request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSpec {
    /// Rendering mode
    pub modality: Modality,
    /// Already-windowed history, oldest first
    pub history_window: Vec<Message>,
    /// Text of the new user turn
    pub current_text: String,
    /// Images of the new user turn
    pub current_images: Vec<ImageBlob>,
}

/// Renders conversation prompts
#[derive(Clone, Debug, Default)]
pub struct PromptBuilder {
    config: PromptConfig,
}

impl PromptBuilder {
    /// Create a builder with the given settings
    #[must_use]
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// Current settings
    #[must_use]
    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    /// Most recent messages that fit the modality's window
    #[must_use]
    pub fn window<'a>(&self, history: &'a [Message], modality: Modality) -> &'a [Message] {
        let cap = self.config.window_for(modality);
        &history[history.len().saturating_sub(cap)..]
    }

    /// Capture the history window and the current turn for later rendering
    ///
    /// The modality follows the current message: any attachment means vision.
    #[must_use]
    pub fn spec(&self, history: &[Message], current: &Message) -> PromptSpec {
        let modality = current.modality();
        PromptSpec {
            modality,
            history_window: self.window(history, modality).to_vec(),
            current_text: current.content.clone(),
            current_images: current.attachments.clone(),
        }
    }

    /// Render the full prompt, preamble included, from history and the current message text
    #[must_use]
    pub fn build(&self, history: &[Message], current_message: &str, modality: Modality) -> String {
        let conversation =
            self.render_parts(self.window(history, modality), current_message, modality);
        format!("{}\n\n{conversation}", self.config.preamble_for(modality))
    }

    /// System text for a captured [`PromptSpec`]
    #[must_use]
    pub fn preamble(&self, spec: &PromptSpec) -> &str {
        self.config.preamble_for(spec.modality)
    }

    /// Render the conversation of a captured [`PromptSpec`], without preamble
    #[must_use]
    pub fn render(&self, spec: &PromptSpec) -> String {
        self.render_parts(
            self.window(&spec.history_window, spec.modality),
            &spec.current_text,
            spec.modality,
        )
    }

    fn render_parts(&self, history: &[Message], current: &str, modality: Modality) -> String {
        let mut prompt = String::new();

        for message in history {
            let content = message.content.trim();
            if content.is_empty() {
                continue;
            }

            let content = match modality {
                Modality::Text => Cow::Borrowed(content),
                Modality::Vision => {
                    if message.is_inline_image() {
                        continue;
                    }
                    truncate_chars(content, self.config.vision_max_chars)
                }
            };

            prompt.push_str(&format!("{}: {}\n", message.role.label(), content));
        }

        match modality {
            Modality::Text => {
                prompt.push_str(&format!("User: {current}\nAssistant:"));
            }
            Modality::Vision => {
                let question = if current.trim().is_empty() {
                    DEFAULT_VISION_QUESTION
                } else {
                    current
                };
                prompt.push_str(&format!("User: {question}"));
            }
        }

        prompt
    }
}

/// Keep the first `max` characters, marking the cut with `...`
fn truncate_chars(content: &str, max: usize) -> Cow<'_, str> {
    match content.char_indices().nth(max) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &content[..cut])),
        None => Cow::Borrowed(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn numbered_history(count: usize) -> Vec<Message> {
        (0..count)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question {i}"))
                } else {
                    Message::assistant(format!("answer {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn test_text_prompt_layout() {
        let builder = PromptBuilder::default();
        let history = vec![Message::user("Hi"), Message::assistant("Hello!")];

        let prompt = builder.build(&history, "How are you?", Modality::Text);

        assert_eq!(
            prompt,
            format!("{TEXT_PREAMBLE}\n\nUser: Hi\nAssistant: Hello!\nUser: How are you?\nAssistant:")
        );
    }

    #[test]
    fn test_text_window_keeps_most_recent() {
        let builder = PromptBuilder::default();
        let history = numbered_history(25);

        let prompt = builder.build(&history, "next", Modality::Text);

        assert!(!prompt.contains("question 4\n"));
        assert!(prompt.contains("Assistant: answer 5\n"));
        assert!(prompt.contains("question 24\n"));
        assert_eq!(prompt.matches('\n').count(), 2 + 20 + 1);
    }

    #[test]
    fn test_window_applies_before_filtering() {
        let builder = PromptBuilder::default();
        let mut history = numbered_history(20);
        history.push(Message::user("   "));

        // The blank message occupies a window slot even though it is not rendered
        let prompt = builder.build(&history, "next", Modality::Text);
        assert!(!prompt.contains("question 0\n"));
        assert!(prompt.contains("answer 1\n"));
    }

    #[test]
    fn test_empty_history_messages_skipped() {
        let builder = PromptBuilder::default();
        let history = vec![Message::user(""), Message::assistant("  \n ")];

        let prompt = builder.build(&history, "hello", Modality::Text);
        assert_eq!(prompt, format!("{TEXT_PREAMBLE}\n\nUser: hello\nAssistant:"));
    }

    #[test]
    fn test_vision_prompt_layout() {
        let builder = PromptBuilder::default();
        let history = vec![
            Message::user("Look at this"),
            Message::user("data:image/png;base64,AAAA"),
            Message::assistant("Sure"),
        ];

        let prompt = builder.build(&history, "What colour is it?", Modality::Vision);

        assert_eq!(
            prompt,
            format!("{VISION_PREAMBLE}\n\nUser: Look at this\nAssistant: Sure\nUser: What colour is it?")
        );
    }

    #[test]
    fn test_vision_default_question() {
        let builder = PromptBuilder::default();
        let prompt = builder.build(&[], "", Modality::Vision);
        assert!(prompt.ends_with(&format!("User: {DEFAULT_VISION_QUESTION}")));
    }

    #[test]
    fn test_vision_truncation() {
        let builder = PromptBuilder::default();
        let long = "x".repeat(250);
        let prompt = builder.build(&[Message::assistant(long)], "q", Modality::Vision);

        let line = prompt
            .lines()
            .find(|l| l.starts_with("Assistant: "))
            .unwrap();
        let content = line.trim_start_matches("Assistant: ");
        assert_eq!(content.chars().count(), 203);
        assert!(content.ends_with("..."));
    }

    #[test]
    fn test_vision_truncation_counts_characters() {
        let builder = PromptBuilder::default();
        let long = "é".repeat(201);
        let prompt = builder.build(&[Message::user(long)], "q", Modality::Vision);

        let expected = format!("User: {}...\n", "é".repeat(200));
        assert!(prompt.contains(&expected));
    }

    #[test]
    fn test_text_mode_does_not_truncate_or_filter_images() {
        let builder = PromptBuilder::default();
        let long = "y".repeat(300);
        let history = vec![
            Message::user(long.clone()),
            Message::user("data:image/png;base64,AAAA"),
        ];

        let prompt = builder.build(&history, "q", Modality::Text);
        assert!(prompt.contains(&long));
        assert!(prompt.contains("User: data:image/png;base64,AAAA\n"));
    }

    #[test]
    fn test_vision_window_is_smaller() {
        let builder = PromptBuilder::default();
        let history = numbered_history(20);

        let prompt = builder.build(&history, "q", Modality::Vision);
        assert!(!prompt.contains("answer 3\n"));
        assert!(prompt.contains("question 4\n"));
    }

    #[test]
    fn test_spec_follows_attachments() {
        let builder = PromptBuilder::default();
        let history = numbered_history(30);
        let current = Message::user("what is this?").with_attachments(vec![ImageBlob::new("AAAA")]);

        let spec = builder.spec(&history, &current);
        assert_eq!(spec.modality, Modality::Vision);
        assert_eq!(spec.history_window.len(), 16);
        assert_eq!(spec.current_images.len(), 1);
        assert_eq!(builder.preamble(&spec), VISION_PREAMBLE);
        assert_eq!(
            format!("{VISION_PREAMBLE}\n\n{}", builder.render(&spec)),
            builder.build(&history, "what is this?", Modality::Vision)
        );
    }

    #[test]
    fn test_custom_config() {
        let builder = PromptBuilder::new(PromptConfig {
            text_window: 1,
            text_preamble: "Be brief.".to_string(),
            ..PromptConfig::default()
        });
        let history = vec![Message::user("old"), Message::assistant("recent")];

        let prompt = builder.build(&history, "now", Modality::Text);
        assert_eq!(prompt, "Be brief.\n\nAssistant: recent\nUser: now\nAssistant:");
    }
}
