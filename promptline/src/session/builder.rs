//! Builder and options for sessions.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::Session;
use crate::channel::ReaderConfig;
use crate::dialect::Dialect;
use crate::error::{Result, SessionError};
use crate::transport::{Connector, HostResolver, SshConfig, SshConfigResolver, SshConnector};

/// Timing and read-loop settings for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Deadline for each wait on a prompt.
    pub timeout: Duration,

    /// Pause after the shell opens, before the login banner is read.
    pub settle_delay: Duration,

    /// Pause between sending Ctrl-C and reading what it printed.
    pub interrupt_pause: Duration,

    /// Read loop tuning.
    #[serde(flatten)]
    pub reader: ReaderConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(500),
            interrupt_pause: Duration::from_millis(200),
            reader: ReaderConfig::default(),
        }
    }
}

impl SessionOptions {
    fn validate(&self) -> Result<()> {
        let invalid = |message: &str| SessionError::InvalidConfig {
            message: message.to_string(),
        };

        if self.timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero").into());
        }
        if self.reader.poll_interval.is_zero() {
            return Err(invalid("poll_interval must be greater than zero").into());
        }
        if self.reader.search_depth == 0 {
            return Err(invalid("search_depth must be greater than zero").into());
        }
        if self.reader.read_chunk == 0 {
            return Err(invalid("read_chunk must be greater than zero").into());
        }
        Ok(())
    }
}

/// Builder for constructing sessions.
///
/// Building does not connect. Call [`Session::connect`] on the result.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use promptline::SessionBuilder;
///
/// # fn example() -> Result<(), promptline::Error> {
/// let session = SessionBuilder::new()
///     .password("secret")
///     .timeout(Duration::from_secs(10))
///     .env("LANG", "C")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder<C: Connector = SshConnector> {
    connector: C,
    resolver: Option<Arc<dyn HostResolver>>,
    dialect: Option<Dialect>,
    options: SessionOptions,
    env: IndexMap<String, String>,
}

impl SessionBuilder<SshConnector> {
    /// Create a builder using the SSH transport and `~/.ssh/config`.
    pub fn new() -> Self {
        Self {
            connector: SshConnector::default(),
            resolver: None,
            dialect: None,
            options: SessionOptions::default(),
            env: IndexMap::new(),
        }
    }

    /// Set the SSH transport settings.
    pub fn ssh_config(mut self, config: SshConfig) -> Self {
        self.connector = self.connector.with_config(config);
        self
    }

    /// Set password authentication for hosts without a configured identity.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.connector = self
            .connector
            .with_password(SecretString::from(password.into()));
        self
    }
}

impl Default for SessionBuilder<SshConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> SessionBuilder<C> {
    /// Use a different transport.
    pub fn connector<D: Connector>(self, connector: D) -> SessionBuilder<D> {
        SessionBuilder {
            connector,
            resolver: self.resolver,
            dialect: self.dialect,
            options: self.options,
            env: self.env,
        }
    }

    /// Set the host resolver (default: `~/.ssh/config`).
    pub fn resolver(mut self, resolver: impl HostResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Set the shell dialect (default: JUNOS).
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Replace all timing and read-loop settings.
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the per-read prompt deadline (default: 30s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Set the banner settle delay (default: 500ms).
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.options.settle_delay = delay;
        self
    }

    /// Set the read loop poll interval (default: 100ms).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.reader.poll_interval = interval;
        self
    }

    /// Add an environment variable for every shell.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables.
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Build the session.
    pub fn build(self) -> Result<Session<C>> {
        self.options.validate()?;

        let dialect = match self.dialect {
            Some(dialect) => dialect,
            None => Dialect::junos().map_err(|e| SessionError::InvalidConfig {
                message: format!("built-in dialect: {}", e),
            })?,
        };

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(SshConfigResolver::new()));

        Ok(Session::from_parts(
            self.connector,
            resolver,
            dialect,
            self.options,
            self.env,
        ))
    }
}
