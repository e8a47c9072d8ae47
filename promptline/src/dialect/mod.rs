//! Remote shell dialects.
//!
//! A [`Dialect`] bundles the heuristics for one family of interactive
//! shells: how its prompt and pager look, which output lines signal an
//! error, how to put it into a scripting-friendly state after login, and
//! how to ask it for completions.

mod definition;
mod junos;

pub use definition::{CompletionStrategy, Dialect, NamedQuery};
pub use junos::{DIALECT_NAME as JUNOS, PAGINATION_MARKERS, PROMPT_PATTERN};
