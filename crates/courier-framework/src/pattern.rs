//! Text matchers.
//!
//! A [`Pattern`] wraps one compiled regular expression and a [`PatternSet`]
//! an ordered alternation of them. Both implement [`TextMatch`]: a cheap
//! `is_match` test and a `captures` call that extracts positional and named
//! groups into an owned [`Captures`] value.
//!
//! Command registrations go through [`command_pattern`], which anchors the
//! pattern to a leading `/`, anchors the end, and lets the command be
//! addressed as `/cmd@botname` in groups.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::error::{BuildError, BuildResult};

// ============================================================================
// Captures
// ============================================================================

/// Groups captured by a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captures {
    text: String,
    positional: Vec<String>,
    named: HashMap<String, String>,
}

impl Captures {
    fn from_regex(re: &Regex, caps: &regex::Captures<'_>, text: &str) -> Self {
        let positional = caps
            .iter()
            .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();

        let named = re
            .capture_names()
            .flatten()
            .map(|name| {
                let value = caps.name(name).map(|m| m.as_str()).unwrap_or_default();
                (name.to_string(), value.to_string())
            })
            .collect();

        Self {
            text: text.to_string(),
            positional,
            named,
        }
    }

    /// The whole input the pattern was run against.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consumes the captures, returning the matched input.
    pub fn into_text(self) -> String {
        self.text
    }

    /// Positional groups: index 0 is the whole match, then each group.
    ///
    /// Groups that did not participate are empty strings.
    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// Named groups by name. Unnamed groups are omitted.
    pub fn named(&self) -> &HashMap<String, String> {
        &self.named
    }

    /// Positional group `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    /// Named group `name`.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }
}

// ============================================================================
// Matchers
// ============================================================================

/// A predicate over text that can also extract captures.
pub trait TextMatch: Send + Sync + 'static {
    /// Returns `true` if the text matches.
    fn is_match(&self, text: &str) -> bool;

    /// Returns the captures of the first match, if any.
    fn captures(&self, text: &str) -> Option<Captures>;
}

/// A single compiled regular expression.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Compiles `pattern`.
    pub fn new(pattern: &str) -> BuildResult<Self> {
        Regex::new(pattern)
            .map(|regex| Self { regex })
            .map_err(|e| BuildError::invalid_pattern(pattern, e))
    }

    /// The source of the expression.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl TextMatch for Pattern {
    fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    fn captures(&self, text: &str) -> Option<Captures> {
        self.regex
            .captures(text)
            .map(|caps| Captures::from_regex(&self.regex, &caps, text))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered alternation of patterns.
///
/// The first pattern in list order that matches wins, regardless of match
/// length, and captures are always taken from that pattern.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Compiles every pattern, failing on the first invalid one.
    pub fn new<I, S>(patterns: I) -> BuildResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<BuildResult<Vec<_>>>()?;

        if patterns.is_empty() {
            return Err(BuildError::NoPatterns);
        }
        Ok(Self { patterns })
    }

    /// The first pattern that matches `text`.
    pub fn winner(&self, text: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl TextMatch for PatternSet {
    fn is_match(&self, text: &str) -> bool {
        self.winner(text).is_some()
    }

    fn captures(&self, text: &str) -> Option<Captures> {
        self.winner(text).and_then(|p| p.captures(text))
    }
}

impl fmt::Display for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<&str> = self.patterns.iter().map(Pattern::as_str).collect();
        write!(f, "[{}]", sources.join(", "))
    }
}

// ============================================================================
// Command helpers
// ============================================================================

/// Anchors a command pattern: `help (\w+)` becomes `^/help (\w+)$`.
///
/// A leading `/` or `^` already in the pattern is kept, as is a trailing `$`.
pub fn convert_to_command(pattern: &str) -> String {
    let body = pattern.strip_prefix('^').unwrap_or(pattern);
    let mut out = String::with_capacity(body.len() + 3);
    out.push('^');
    if !body.starts_with('/') {
        out.push('/');
    }
    out.push_str(body);
    if !out.ends_with('$') {
        out.push('$');
    }
    out
}

/// Lets the command token of `pattern` carry an optional `@username` suffix.
///
/// `^/help (\w+)$` becomes `^/help(?:@bot)? (\w+)$` and `^/start$` becomes
/// `^/start(?:@bot)?$`.
pub fn add_username_command(pattern: &str, username: &str) -> String {
    let suffix = format!("(?:@{})?", regex::escape(username));

    if let Some((head, rest)) = pattern.split_once(' ') {
        return format!("{head}{suffix} {rest}");
    }
    match pattern.strip_suffix('$') {
        Some(head) => format!("{head}{suffix}$"),
        None => format!("{pattern}{suffix}"),
    }
}

/// The full pattern a command registration compiles.
pub fn command_pattern(pattern: &str, username: Option<&str>) -> String {
    let anchored = convert_to_command(pattern);
    match username {
        Some(name) if !name.is_empty() => add_username_command(&anchored, name),
        _ => anchored,
    }
}
