//! Tab completion by querying the remote shell.
//!
//! Two strategies exist, tried in the dialect's order:
//!
//! - **Query mark**: type the fragment followed by the query character
//!   (JUNOS `?`), parse the listing the shell prints under its header,
//!   then clear the redisplayed line.
//! - **Named query**: run a help command embedding the fragment and parse
//!   its listing.
//!
//! The first strategy yielding candidates wins. Every result is filtered
//! down to strict extensions of the original fragment, sorted
//! case-insensitively and deduplicated.

use std::cmp::Ordering;

use log::{debug, warn};
use memchr::memmem;

use super::Session;
use crate::dialect::{CompletionStrategy, Dialect};
use crate::error::Result;
use crate::transport::Connector;

impl<C: Connector> Session<C> {
    /// Completion candidates for `fragment`.
    ///
    /// Never fails: any fault during a query is logged, the shell is
    /// resynchronized and an empty list is returned. Also empty when not
    /// connected.
    pub async fn completions(&mut self, fragment: &str) -> Vec<String> {
        if !self.is_connected() {
            return Vec::new();
        }

        let fragment = single_line(fragment);
        let fragment = fragment.as_str();

        for strategy in self.dialect.completion_strategies.clone() {
            let attempt = match strategy {
                CompletionStrategy::QueryMark => self.query_mark(fragment).await,
                CompletionStrategy::NamedQuery => self.named_query(fragment).await,
            };

            match attempt {
                Ok(Some(candidates)) => {
                    let candidates = finalize_candidates(fragment, candidates);
                    if !candidates.is_empty() {
                        debug!("{:?}: {} candidates for {:?}", strategy, candidates.len(), fragment);
                        return candidates;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("completion of {:?} on {} failed: {}", fragment, self.host, e);
                    if let Err(e) = self.resync().await {
                        warn!("resync after failed completion: {}", e);
                    }
                    return Vec::new();
                }
            }
        }

        Vec::new()
    }

    async fn query_mark(&mut self, fragment: &str) -> Result<Option<Vec<String>>> {
        let clean = self.resync().await?;
        let prompt_line = clean.rsplit('\n').next().unwrap_or_default();

        let (prefix, query) = if self.dialect.in_context(prompt_line) {
            strip_context_keywords(&self.dialect.context_keywords, fragment)
        } else {
            (String::new(), fragment)
        };

        let typed = format!("{}{}", query, self.dialect.query_char);
        self.write(typed.as_bytes()).await?;
        let response = self.read_until_prompt().await;
        let parsed = response
            .map(|raw| parse_query_listing(&raw, query, &self.dialect.completion_header, &self.dialect));

        // The shell redisplays the typed fragment; clear it twice over.
        self.resync().await?;
        self.resync().await?;

        let candidates: Vec<String> = parsed?
            .into_iter()
            .map(|candidate| format!("{prefix}{candidate}"))
            .collect();
        Ok((!candidates.is_empty()).then_some(candidates))
    }

    async fn named_query(&mut self, fragment: &str) -> Result<Option<Vec<String>>> {
        let Some(query) = self.dialect.named_query.clone() else {
            return Ok(None);
        };

        let command = query.render(fragment);
        self.write_line(&command).await?;
        let response = self.read_until_prompt().await;
        let parsed = response
            .map(|raw| parse_named_listing(&raw, &command, &query.header, fragment, &self.dialect));

        self.resync().await?;

        let candidates = parsed?;
        Ok((!candidates.is_empty()).then_some(candidates))
    }
}

/// Keep strict extensions of `fragment`, sorted case-insensitively, without duplicates.
pub fn finalize_candidates(fragment: &str, candidates: Vec<String>) -> Vec<String> {
    let mut candidates: Vec<String> = candidates
        .into_iter()
        .filter(|candidate| candidate.len() > fragment.len() && candidate.starts_with(fragment))
        .collect();
    candidates.sort_by(|a, b| caseless(a, b).then_with(|| a.cmp(b)));
    candidates.dedup();
    candidates
}

/// Replace control characters with spaces so the fragment cannot submit a line.
fn single_line(fragment: &str) -> String {
    fragment
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn caseless(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Strip leading context-entry keywords (`set set interfaces ge` -> `interfaces ge`).
///
/// Returns the stripped prefix, ready to prepend, and the remainder.
fn strip_context_keywords<'a>(keywords: &[String], fragment: &'a str) -> (String, &'a str) {
    let mut prefix = String::new();
    let mut rest = fragment;

    loop {
        let next = keywords.iter().find_map(|keyword| {
            rest.strip_prefix(keyword.as_str())
                .and_then(|after| after.strip_prefix(' '))
                .map(|after| (keyword, after))
        });
        match next {
            Some((keyword, after)) => {
                prefix.push_str(keyword);
                prefix.push(' ');
                rest = after;
            }
            None => return (prefix, rest),
        }
    }
}

/// Split a fragment into the words already typed and the word being completed.
fn split_fragment(fragment: &str) -> (&str, &str) {
    match fragment.rfind(' ') {
        Some(idx) => (&fragment[..idx], &fragment[idx + 1..]),
        None => ("", fragment),
    }
}

fn join(stem: &str, token: &str) -> String {
    if stem.is_empty() {
        token.to_string()
    } else {
        format!("{stem} {token}")
    }
}

/// First column of a listing line, or `None` for placeholders and blanks.
///
/// Listing lines look like `  version   Show version information`; the
/// token ends at the first run of two spaces.
fn candidate_token(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let trimmed = trimmed
        .strip_prefix(['+', '>', '*', '-'])
        .map(str::trim_start)
        .unwrap_or(trimmed);

    let token = match memmem::find(trimmed.as_bytes(), b"  ") {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };
    let token = token.trim();

    if token.is_empty() || (token.starts_with('<') && token.ends_with('>')) {
        None
    } else {
        Some(token)
    }
}

fn is_header(line: &str, header: &str) -> bool {
    !header.is_empty()
        && line
            .trim()
            .to_lowercase()
            .starts_with(&header.to_lowercase())
}

fn ends_listing(line: &str, dialect: &Dialect) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('{')
        || trimmed.starts_with('[')
        || dialect.detect_error(line).is_some()
}

/// Response body without the echoed line and the trailing prompt line.
fn body(raw: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = raw.split('\n').collect();
    lines.pop();
    if !lines.is_empty() {
        lines.remove(0);
    }
    lines
}

/// Parse a query-mark listing for `query` (the fragment as typed).
fn parse_query_listing(raw: &str, query: &str, header: &str, dialect: &Dialect) -> Vec<String> {
    let lines = body(raw);
    let Some(start) = lines.iter().position(|line| is_header(line, header)) else {
        return Vec::new();
    };

    let (stem, word) = split_fragment(query);
    let mut candidates = Vec::new();

    for line in &lines[start + 1..] {
        if ends_listing(line, dialect) {
            break;
        }
        if let Some(token) = candidate_token(line) {
            if token.starts_with(word) {
                candidates.push(join(stem, token));
            }
        }
    }

    candidates
}

/// Parse the output of a named help query.
///
/// Entries are whole command paths; only those extending the fragment are kept.
fn parse_named_listing(
    raw: &str,
    command: &str,
    header: &str,
    fragment: &str,
    dialect: &Dialect,
) -> Vec<String> {
    let mut lines: Vec<&str> = raw.split('\n').collect();
    if lines.first().is_some_and(|first| first.trim() == command) {
        lines.remove(0);
    }
    if lines
        .last()
        .is_some_and(|last| dialect.prompt().is_terminating_prompt(last))
    {
        lines.pop();
    }

    let Some(start) = lines.iter().position(|line| is_header(line, header)) else {
        return Vec::new();
    };

    let mut candidates = Vec::new();

    for line in &lines[start + 1..] {
        if ends_listing(line, dialect) {
            break;
        }
        let Some(token) = candidate_token(line) else {
            continue;
        };
        if token.starts_with(fragment) {
            candidates.push(token.to_string());
        }
    }

    candidates
}
