//! Channel layer: turning a raw shell byte stream into prompt-delimited text.
//!
//! This module handles output accumulation, terminal-control stripping,
//! prompt/pager classification and the read-until-prompt loop.

mod buffer;
mod patterns;
mod reader;

pub use buffer::SessionBuffer;
pub use patterns::{PatternPrompt, PromptClassifier, PromptState, compile_prompt_pattern};
pub use reader::{ReaderConfig, SessionReader};
