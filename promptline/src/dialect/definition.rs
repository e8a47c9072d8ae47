//! Dialect definition: the rules one family of remote shells plays by.

use std::fmt;
use std::sync::Arc;

use crate::channel::PromptClassifier;

/// Order in which completion strategies are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStrategy {
    /// Type the fragment followed by the query character and parse the
    /// listing the shell prints.
    QueryMark,

    /// Run a help command that embeds the fragment.
    NamedQuery,
}

/// A help command used as the fallback completion source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedQuery {
    /// Command template; `{fragment}` is replaced with the fragment.
    pub template: String,

    /// Line introducing the candidate list in the command's output.
    pub header: String,
}

impl NamedQuery {
    /// Create a named query.
    pub fn new(template: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            header: header.into(),
        }
    }

    /// Render the command line for `fragment`.
    pub fn render(&self, fragment: &str) -> String {
        self.template.replace("{fragment}", fragment)
    }
}

/// Everything dialect-specific the session engine needs.
///
/// Prompt recognition, in-band error markers, session setup commands and
/// the completion protocol all vary between remote shells; the engine
/// itself only consults this value.
#[derive(Clone)]
pub struct Dialect {
    /// Dialect name (e.g. "junos").
    pub name: String,

    /// Prompt and pager recognizer.
    prompt: Arc<dyn PromptClassifier>,

    /// Lowercase substrings marking an output line as an error.
    pub error_markers: Vec<String>,

    /// Commands run once after login, each followed by a resync.
    pub setup_commands: Vec<String>,

    /// Character on the prompt line showing a nested configuration context.
    pub context_marker: Option<char>,

    /// Keywords that enter a sub-grammar while in the configuration context.
    pub context_keywords: Vec<String>,

    /// Character that asks the shell for possible completions.
    pub query_char: char,

    /// Header line introducing a query-mark completion listing.
    pub completion_header: String,

    /// Line prefixes of the status lines printed directly above a prompt.
    pub prompt_preambles: Vec<String>,

    /// Fallback completion command.
    pub named_query: Option<NamedQuery>,

    /// Completion strategies, in the order they are tried.
    pub completion_strategies: Vec<CompletionStrategy>,
}

impl Dialect {
    /// Create a dialect with a prompt classifier and no other rules.
    pub fn new(name: impl Into<String>, prompt: impl PromptClassifier + 'static) -> Self {
        Self {
            name: name.into(),
            prompt: Arc::new(prompt),
            error_markers: Vec::new(),
            setup_commands: Vec::new(),
            context_marker: None,
            context_keywords: Vec::new(),
            query_char: '?',
            completion_header: String::new(),
            prompt_preambles: Vec::new(),
            named_query: None,
            completion_strategies: vec![CompletionStrategy::QueryMark],
        }
    }

    /// Add an error marker. Matching is case-insensitive.
    pub fn with_error_marker(mut self, marker: impl Into<String>) -> Self {
        self.error_markers.push(marker.into().to_lowercase());
        self
    }

    /// Add a post-login setup command.
    pub fn with_setup_command(mut self, command: impl Into<String>) -> Self {
        self.setup_commands.push(command.into());
        self
    }

    /// Set the configuration-context marker.
    pub fn with_context_marker(mut self, marker: char) -> Self {
        self.context_marker = Some(marker);
        self
    }

    /// Add a context-entry keyword.
    pub fn with_context_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.context_keywords.push(keyword.into());
        self
    }

    /// Set the completion query character.
    pub fn with_query_char(mut self, query: char) -> Self {
        self.query_char = query;
        self
    }

    /// Set the query-mark listing header.
    pub fn with_completion_header(mut self, header: impl Into<String>) -> Self {
        self.completion_header = header.into();
        self
    }

    /// Add a prompt preamble prefix.
    pub fn with_prompt_preamble(mut self, prefix: impl Into<String>) -> Self {
        self.prompt_preambles.push(prefix.into());
        self
    }

    /// Set the fallback completion command.
    pub fn with_named_query(mut self, query: NamedQuery) -> Self {
        self.named_query = Some(query);
        self
    }

    /// Replace the completion strategy order.
    pub fn with_completion_strategies(mut self, strategies: Vec<CompletionStrategy>) -> Self {
        self.completion_strategies = strategies;
        self
    }

    /// Replace the prompt classifier.
    pub fn with_prompt(mut self, prompt: impl PromptClassifier + 'static) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    /// The prompt classifier.
    pub fn prompt(&self) -> &dyn PromptClassifier {
        self.prompt.as_ref()
    }

    /// The first error marker found in `line`, if any.
    pub fn detect_error(&self, line: &str) -> Option<&str> {
        let lowered = line.to_lowercase();
        self.error_markers
            .iter()
            .find(|marker| lowered.contains(marker.as_str()))
            .map(String::as_str)
    }

    /// Whether `line` is a status line printed above the prompt.
    pub fn is_prompt_preamble(&self, line: &str) -> bool {
        let line = line.trim_start();
        self.prompt_preambles
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()))
    }

    /// Whether a prompt line shows the configuration context.
    pub fn in_context(&self, prompt_line: &str) -> bool {
        self.context_marker
            .is_some_and(|marker| prompt_line.contains(marker))
    }
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialect")
            .field("name", &self.name)
            .field("prompt", &"<PromptClassifier>")
            .field("error_markers", &self.error_markers)
            .field("setup_commands", &self.setup_commands)
            .field("context_marker", &self.context_marker)
            .field("context_keywords", &self.context_keywords)
            .field("query_char", &self.query_char)
            .field("completion_header", &self.completion_header)
            .field("prompt_preambles", &self.prompt_preambles)
            .field("named_query", &self.named_query)
            .field("completion_strategies", &self.completion_strategies)
            .finish()
    }
}
