//! Juniper JUNOS CLI dialect.
//!
//! # Prompt Examples
//!
//! ```text
//! user@router>              # operational mode
//! user@router#              # configuration mode
//! user@router:RE:0%         # unix shell
//! {master:0}                # routing-engine indicator (separate line)
//! user@router>
//! {master:0}[edit]          # config with routing-engine indicator
//! user@router#
//! user@router> show v       # prompt redisplayed after a `?` listing
//! ```
//!
//! The pager prints `---(more)---`, or `---(more NN%)---` with a
//! percentage; the final page is marked `---(more 100%)---`.

use crate::channel::PatternPrompt;

use super::definition::{CompletionStrategy, Dialect, NamedQuery};

/// Dialect name for Juniper JUNOS.
pub const DIALECT_NAME: &str = "junos";

/// Terminating prompt grammar:
/// line start, `{mode}` `[hierarchy]` `ident@ident` `%|>|#` `annotation` whitespace, at end of text.
pub const PROMPT_PATTERN: &str = concat!(
    r"(?:^|\n)",
    r"(?:\{[^}\n]*\}[ \t]*\n?)?",
    r"(?:\[[^\]\n]*\][ \t]*\n?)?",
    r"[A-Za-z0-9_.\-]+@[A-Za-z0-9_.:\-]+",
    r"[%>#]",
    r"(?:[ \t][^\n]*)?",
    r"[ \t]*$",
);

/// Pager continuation markers.
pub const PAGINATION_MARKERS: [&str; 2] = ["---(more)---", "---(more 100%)---"];

impl Dialect {
    /// The Juniper JUNOS dialect.
    pub fn junos() -> Result<Self, regex::Error> {
        let mut prompt = PatternPrompt::new(PROMPT_PATTERN)?;
        for marker in PAGINATION_MARKERS {
            prompt = prompt.with_pagination_marker(marker);
        }

        Ok(Dialect::new(DIALECT_NAME, prompt)
            .with_error_marker("error:")
            .with_error_marker("unknown command.")
            .with_error_marker("syntax error.")
            .with_error_marker("invalid command.")
            .with_setup_command("set cli complete-on-space off")
            .with_setup_command("set cli screen-length 0")
            .with_context_marker('#')
            .with_context_keyword("set")
            .with_query_char('?')
            .with_completion_header("Possible completions:")
            .with_prompt_preamble("{")
            .with_prompt_preamble("[edit")
            .with_named_query(NamedQuery::new(
                "help apropos {fragment}",
                "Matching commands:",
            ))
            .with_completion_strategies(vec![
                CompletionStrategy::QueryMark,
                CompletionStrategy::NamedQuery,
            ]))
    }
}
