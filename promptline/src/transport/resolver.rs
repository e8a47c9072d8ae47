//! Host token resolution against OpenSSH client configuration.
//!
//! A session is addressed by a host token such as `router1` or
//! `admin@router1`. The resolver turns the bare host part into the
//! parameters needed to dial it; an embedded `user@` always wins over
//! whatever the configuration says.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Connection parameters resolved for a host token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostParams {
    /// Network hostname to dial.
    pub hostname: String,

    /// Login user.
    pub user: String,

    /// SSH port.
    pub port: u16,

    /// First configured identity file, if any.
    pub identity_file: Option<PathBuf>,
}

impl HostParams {
    /// Defaults for a host with no configuration entry.
    pub fn defaults_for(host: &str) -> Self {
        Self {
            hostname: host.to_string(),
            user: whoami(),
            port: 22,
            identity_file: None,
        }
    }
}

/// Resolves a bare host token into connection parameters.
///
/// Consulted once per `connect`.
pub trait HostResolver: Send + Sync {
    /// Resolve `host` (never contains a `user@` prefix).
    fn resolve(&self, host: &str) -> HostParams;
}

impl<F> HostResolver for F
where
    F: Fn(&str) -> HostParams + Send + Sync,
{
    fn resolve(&self, host: &str) -> HostParams {
        self(host)
    }
}

/// Split a `user@host` token. The user part is `None` when absent or empty.
pub fn split_host_token(token: &str) -> (Option<&str>, &str) {
    match token.split_once('@') {
        Some((user, host)) if !user.is_empty() => (Some(user), host),
        Some((_, host)) => (None, host),
        None => (None, token),
    }
}

/// Resolver backed by an OpenSSH `ssh_config` file (default `~/.ssh/config`).
///
/// Supports the `Host`, `HostName`, `User`, `Port` and `IdentityFile`
/// directives. The first obtained value for each parameter is used,
/// matching OpenSSH, so `Host *` blocks act as defaults only when they
/// come last.
#[derive(Debug, Clone)]
pub struct SshConfigResolver {
    path: Option<PathBuf>,
}

impl SshConfigResolver {
    /// Resolver for the current user's `~/.ssh/config`.
    pub fn new() -> Self {
        Self {
            path: dirs::home_dir().map(|home| home.join(".ssh").join("config")),
        }
    }

    /// Resolver for an explicit config file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// The config file this resolver reads.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

impl Default for SshConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HostResolver for SshConfigResolver {
    fn resolve(&self, host: &str) -> HostParams {
        let defaults = HostParams::defaults_for(host);

        let Some(path) = &self.path else {
            return defaults;
        };

        if !path.exists() {
            debug!("no SSH config at {}", path.display());
            return defaults;
        }

        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("failed to open SSH config {}: {}", path.display(), e);
                return defaults;
            }
        };

        let params = resolve_from_reader(BufReader::new(file), host);
        debug!(
            "resolved {} -> {}@{}:{} (identity: {:?})",
            host, params.user, params.hostname, params.port, params.identity_file
        );
        params
    }
}

/// Directives collected from matching Host blocks.
#[derive(Default, Debug)]
struct ParsedHost {
    hostname: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    identity_file: Option<PathBuf>,
}

/// Parse ssh_config text and resolve `host` against it.
pub fn resolve_from_reader(reader: impl BufRead, host: &str) -> HostParams {
    let parsed = parse_ssh_config(reader, host);
    let defaults = HostParams::defaults_for(host);

    HostParams {
        hostname: parsed.hostname.unwrap_or(defaults.hostname),
        user: parsed.user.unwrap_or(defaults.user),
        port: parsed.port.unwrap_or(defaults.port),
        identity_file: parsed.identity_file,
    }
}

fn parse_ssh_config(reader: impl BufRead, target_host: &str) -> ParsedHost {
    let mut result = ParsedHost::default();
    // Directives before the first Host line apply to every host.
    let mut in_matching_block = true;

    for line in reader.lines() {
        let Ok(line) = line else { continue };
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((keyword, argument)) = split_directive(trimmed) else {
            continue;
        };

        if keyword.eq_ignore_ascii_case("host") {
            in_matching_block = host_line_matches(argument, target_host);
            continue;
        }

        if keyword.eq_ignore_ascii_case("match") {
            // Match criteria are not evaluated; skip the block.
            in_matching_block = false;
            continue;
        }

        if !in_matching_block {
            continue;
        }

        match keyword.to_ascii_lowercase().as_str() {
            "hostname" => {
                result.hostname.get_or_insert_with(|| argument.to_string());
            }
            "port" => {
                if result.port.is_none() {
                    result.port = argument.parse().ok();
                }
            }
            "user" => {
                result.user.get_or_insert_with(|| argument.to_string());
            }
            "identityfile" => {
                result
                    .identity_file
                    .get_or_insert_with(|| PathBuf::from(expand_tilde(unquote(argument))));
            }
            _ => {}
        }
    }

    result
}

/// Split a config line into (keyword, argument). Accepts `Key value` and `Key=value`.
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let keyword = &line[..end];
    let argument = line[end..]
        .trim_start_matches(|c: char| c.is_whitespace())
        .strip_prefix('=')
        .unwrap_or_else(|| line[end..].trim_start())
        .trim();

    if keyword.is_empty() || argument.is_empty() {
        return None;
    }
    Some((keyword, argument))
}

/// A Host line matches if any positive pattern matches and no negated one does.
fn host_line_matches(patterns: &str, target: &str) -> bool {
    let mut matched = false;
    for pattern in patterns.split_whitespace() {
        if let Some(negated) = pattern.strip_prefix('!') {
            if glob_match(negated.as_bytes(), target.as_bytes()) {
                return false;
            }
        } else if glob_match(pattern.as_bytes(), target.as_bytes()) {
            matched = true;
        }
    }
    matched
}

/// `*` and `?` glob matching.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == b'?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    pattern[pi..].iter().all(|&b| b == b'*')
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "\
# lab devices
Host mx1 mx1.lab
    HostName 10.0.0.1
    User netops
    Port 2222
    IdentityFile /keys/lab_ed25519
    IdentityFile /keys/second

Host *.lab !bad.lab
    User labuser

Host *
    User fallback
    Port 22
";

    #[test]
    fn test_split_host_token() {
        assert_eq!(split_host_token("admin@router"), (Some("admin"), "router"));
        assert_eq!(split_host_token("router"), (None, "router"));
        assert_eq!(split_host_token("@router"), (None, "router"));
    }

    #[test]
    fn test_specific_block_wins() {
        let params = resolve_from_reader(CONFIG.as_bytes(), "mx1");
        assert_eq!(params.hostname, "10.0.0.1");
        assert_eq!(params.user, "netops");
        assert_eq!(params.port, 2222);
        assert_eq!(params.identity_file, Some(PathBuf::from("/keys/lab_ed25519")));
    }

    #[test]
    fn test_wildcard_and_negation() {
        let params = resolve_from_reader(CONFIG.as_bytes(), "ex4.lab");
        assert_eq!(params.hostname, "ex4.lab");
        assert_eq!(params.user, "labuser");

        let params = resolve_from_reader(CONFIG.as_bytes(), "bad.lab");
        assert_eq!(params.user, "fallback");
    }

    #[test]
    fn test_unknown_host_defaults() {
        let params = resolve_from_reader("".as_bytes(), "edge9");
        assert_eq!(params.hostname, "edge9");
        assert_eq!(params.port, 22);
        assert!(params.identity_file.is_none());
        assert!(!params.user.is_empty());
    }

    #[test]
    fn test_equals_syntax() {
        let config = "Host r1\n  Port=830\n  HostName = r1.example.net\n";
        let params = resolve_from_reader(config.as_bytes(), "r1");
        assert_eq!(params.port, 830);
        assert_eq!(params.hostname, "r1.example.net");
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"mx?", b"mx1"));
        assert!(glob_match(b"*.lab", b"a.b.lab"));
        assert!(!glob_match(b"*.lab", b"lab"));
        assert!(!glob_match(b"mx?", b"mx10"));
    }

    #[test]
    fn test_missing_file_defaults() {
        let resolver = SshConfigResolver::with_path("/nonexistent/ssh_config");
        let params = resolver.resolve("core1");
        assert_eq!(params, HostParams::defaults_for("core1"));
    }
}
