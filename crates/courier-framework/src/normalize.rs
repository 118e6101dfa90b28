//! Message normalization.
//!
//! Runs once per message before any matching:
//!
//! 1. A leading `@botname` mention is stripped (one occurrence, then trimmed).
//! 2. If the mention was stripped and the rest is not a command yet, `/` is
//!    prepended so that `@bot start` reaches the `start` command.
//! 3. The text is lower-cased.
//!
//! Each step is controlled by [`DefaultOptions`]. Normalizing an already
//! normalized text is a no-op.

use courier_core::{DefaultOptions, Message};

/// Applies the normalization pass configured for one bot.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// `@username`, when mention stripping is enabled and the bot has one.
    mention: Option<String>,
    allow_without_slash: bool,
    lowercase: bool,
}

impl Normalizer {
    pub fn new(options: &DefaultOptions, username: Option<&str>) -> Self {
        let mention = username
            .filter(|name| options.strip_mention_prefix && !name.is_empty())
            .map(|name| format!("@{name}"));

        Self {
            mention,
            allow_without_slash: options.allow_command_without_slash,
            lowercase: options.lowercase_text,
        }
    }

    /// Normalizes the text of `message` in place. Non-text messages are untouched.
    pub fn normalize(&self, message: &mut Message) {
        if let Some(text) = message.text_mut() {
            *text = self.normalize_text(text);
        }
    }

    pub fn normalize_text(&self, text: &str) -> String {
        let mut out = match self.strip_mention(text) {
            Some(rest) if self.allow_without_slash && !rest.is_empty() && !rest.starts_with('/') => {
                format!("/{rest}")
            }
            Some(rest) => rest.to_string(),
            None => text.to_string(),
        };

        if self.lowercase {
            out = out.to_lowercase();
        }
        out
    }

    /// The trimmed text after a leading mention, if there is one.
    fn strip_mention<'t>(&self, text: &'t str) -> Option<&'t str> {
        let mention = self.mention.as_deref()?;
        let head = text.get(..mention.len())?;
        if !head.eq_ignore_ascii_case(mention) {
            return None;
        }

        let rest = &text[mention.len()..];
        // `@botname_fan` is a different user.
        if rest.chars().next().is_some_and(|c| !c.is_whitespace()) {
            return None;
        }
        Some(rest.trim())
    }
}
