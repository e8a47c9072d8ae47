//! Prompt classification for an unframed shell byte stream.

use regex::Regex;

/// What the tail of the read buffer says about the remote shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    /// Keep reading.
    Pending,

    /// The shell is ready for new input.
    Prompt,

    /// The pager is holding output back. `marker_len` bytes at the end of
    /// the buffer belong to the pager marker, not to the output.
    Pagination { marker_len: usize },
}

/// Trait for prompt classification - regex by default, extensible per shell dialect.
///
/// Implementations only ever see the tail of the buffer, so they must
/// anchor their rules at the end of the text they are given.
pub trait PromptClassifier: Send + Sync {
    /// Classify the tail of the accumulated output.
    fn classify(&self, tail: &str) -> PromptState;

    /// Check if the text ends with a terminating prompt.
    fn is_terminating_prompt(&self, tail: &str) -> bool {
        self.classify(tail) == PromptState::Prompt
    }

    /// Check if the text ends with a pagination marker.
    fn is_pagination_marker(&self, tail: &str) -> bool {
        matches!(self.classify(tail), PromptState::Pagination { .. })
    }
}

/// A prompt regex plus a fixed set of literal pager markers.
#[derive(Debug, Clone)]
pub struct PatternPrompt {
    /// Matches a terminating prompt at the end of the text.
    prompt: Regex,

    /// Literal suffixes the pager prints while holding output.
    pagination_markers: Vec<String>,
}

impl PatternPrompt {
    /// Create a classifier from a prompt pattern string.
    ///
    /// The pattern is anchored to the end of the text if it is not already.
    pub fn new(prompt: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            prompt: compile_prompt_pattern(prompt)?,
            pagination_markers: Vec::new(),
        })
    }

    /// Add a literal pagination marker.
    pub fn with_pagination_marker(mut self, marker: impl Into<String>) -> Self {
        self.pagination_markers.push(marker.into());
        self
    }

    /// Get a reference to the underlying regex.
    pub fn regex(&self) -> &Regex {
        &self.prompt
    }

    /// The configured pagination markers.
    pub fn pagination_markers(&self) -> &[String] {
        &self.pagination_markers
    }
}

impl PromptClassifier for PatternPrompt {
    fn classify(&self, tail: &str) -> PromptState {
        // Pager markers are checked first
        if let Some(marker) = self
            .pagination_markers
            .iter()
            .find(|marker| tail.ends_with(marker.as_str()))
        {
            return PromptState::Pagination {
                marker_len: marker.len(),
            };
        }

        if self.prompt.is_match(tail) {
            PromptState::Prompt
        } else {
            PromptState::Pending
        }
    }
}

/// Compile a prompt pattern string into a regex.
///
/// Anchors to end of string if no anchor is present, allowing trailing
/// horizontal whitespace.
pub fn compile_prompt_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let anchored = pattern.ends_with('$') && !pattern.ends_with("\\$");
    let pattern = if anchored {
        pattern.to_string()
    } else {
        format!("{}[ \\t]*$", pattern)
    };

    Regex::new(&pattern)
}
