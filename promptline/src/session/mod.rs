//! Line-oriented command sessions over an interactive remote shell.
//!
//! A [`Session`] owns at most one live shell channel. Every operation
//! takes `&mut self`, so commands, completion queries and interrupts on
//! one session are serialized by construction.

mod builder;
mod completion;
mod execute;
mod response;

pub use builder::{SessionBuilder, SessionOptions};
pub use completion::finalize_candidates;
pub use response::{CommandResult, LineCollector, OutputSink, STATUS_FAILED, STATUS_OK};

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::channel::SessionReader;
use crate::dialect::Dialect;
use crate::error::{Result, SessionError};
use crate::transport::resolver::split_host_token;
use crate::transport::{
    Connection, Connector, ConnectTarget, HostResolver, ShellChannel, SshConnector,
};

/// Ctrl-U: discard whatever is on the current input line.
const CANCEL_LINE: &[u8] = b"\x15";

/// Ctrl-C: abort the running command.
const INTERRUPT: &[u8] = b"\x03";

/// Environment variable forced on every shell so output is never paged.
const PAGER_VAR: (&str, &str) = ("PAGER", "cat");

/// The live half of a session: the connection and its one shell.
struct Live<K: Connection> {
    connection: K,
    shell: K::Shell,
}

/// Session with one remote interactive shell.
///
/// # Example
///
/// ```rust,no_run
/// use promptline::{LineCollector, SessionBuilder};
///
/// # async fn example() -> Result<(), promptline::Error> {
/// let mut session = SessionBuilder::new().build()?;
/// session.connect("admin@router1").await?;
///
/// let mut output = LineCollector::new();
/// let result = session.execute("show version", &mut output).await?;
/// println!("status {}: {}", result.status, result.text());
///
/// let candidates = session.completions("show v").await;
/// println!("{:?}", candidates);
///
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Session<C: Connector = SshConnector> {
    connector: C,
    resolver: Arc<dyn HostResolver>,
    dialect: Dialect,
    options: SessionOptions,

    /// Injected environment, merged into every shell's environment.
    env_defaults: IndexMap<String, String>,

    /// Host token of the live shell (empty when disconnected).
    host: String,

    live: Option<Live<C::Connection>>,
    reader: SessionReader,
}

impl<C: Connector> Session<C> {
    pub(crate) fn from_parts(
        connector: C,
        resolver: Arc<dyn HostResolver>,
        dialect: Dialect,
        options: SessionOptions,
        env_defaults: IndexMap<String, String>,
    ) -> Self {
        Self {
            connector,
            resolver,
            dialect,
            reader: SessionReader::new(options.reader.clone()),
            options,
            env_defaults,
            host: String::new(),
            live: None,
        }
    }

    /// Connect to `host` (`host` or `user@host`) and prepare the shell.
    ///
    /// An existing connection is closed first. On success the login banner
    /// has been consumed, the dialect's setup commands have run and the
    /// shell is parked at a clean prompt.
    pub async fn connect(&mut self, host: &str) -> Result<()> {
        if self.is_connected() {
            debug!("replacing connection to {}", self.host);
            self.close().await;
        }

        let target = self.resolve_target(host);
        info!(
            "connecting to {} ({}@{})",
            target.host,
            target.username,
            target.socket_addr()
        );

        let mut connection = self.connector.connect(&target).await?;

        let env = self.shell_env();
        let shell = match connection.open_shell(&env).await {
            Ok(shell) => shell,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    debug!("close after failed shell request: {}", close_err);
                }
                return Err(e);
            }
        };

        self.live = Some(Live { connection, shell });
        self.host = target.host;

        if let Err(e) = self.prepare_shell().await {
            warn!("shell setup on {} failed: {}", self.host, e);
            self.close().await;
            return Err(e);
        }

        info!("connected to {}", self.host);
        Ok(())
    }

    /// Release the shell and the connection. Never fails; safe to repeat.
    pub async fn close(&mut self) {
        if let Some(Live {
            connection,
            mut shell,
        }) = self.live.take()
        {
            if let Err(e) = shell.close().await {
                debug!("shell close on {}: {}", self.host, e);
            }
            if let Err(e) = connection.close().await {
                debug!("connection close on {}: {}", self.host, e);
            }
            info!("closed session to {}", self.host);
        }
        self.host.clear();
    }

    /// Send Ctrl-C and absorb whatever the cancellation printed.
    ///
    /// A no-op when not connected. A missing prompt afterwards is logged,
    /// not returned; transport faults are returned.
    pub async fn interrupt(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }

        debug!("interrupting {}", self.host);
        self.write(INTERRUPT).await?;
        tokio::time::sleep(self.options.interrupt_pause).await;

        match self.read_until_prompt().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_timeout() => {
                warn!("no prompt after interrupt on {}", self.host);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Check whether a shell is live.
    pub fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    /// Host token of the live shell, if connected.
    pub fn host(&self) -> Option<&str> {
        self.live.as_ref().map(|_| self.host.as_str())
    }

    /// The dialect in use.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// The session options.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Set the per-read prompt deadline.
    pub fn set_timeout(&mut self, timeout: std::time::Duration) {
        self.options.timeout = timeout;
    }

    fn resolve_target(&self, token: &str) -> ConnectTarget {
        let (user, host) = split_host_token(token.trim());
        let params = self.resolver.resolve(host);

        ConnectTarget {
            host: host.to_string(),
            hostname: params.hostname,
            port: params.port,
            username: user.map(str::to_string).unwrap_or(params.user),
            identity: params.identity_file,
        }
    }

    fn shell_env(&self) -> IndexMap<String, String> {
        let mut env = self.env_defaults.clone();
        env.insert(PAGER_VAR.0.to_string(), PAGER_VAR.1.to_string());
        env
    }

    /// Wait for the banner to settle, consume it, then run setup commands.
    async fn prepare_shell(&mut self) -> Result<()> {
        tokio::time::sleep(self.options.settle_delay).await;

        let banner = self.read_until_prompt().await?;
        debug!("login banner on {}: {} bytes", self.host, banner.len());

        for command in self.dialect.setup_commands.clone() {
            debug!("setup on {}: {}", self.host, command);
            self.write_line(&command).await?;
            self.read_until_prompt().await?;
            self.resync().await?;
        }

        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let live = self.live.as_mut().ok_or(SessionError::NotConnected)?;
        live.shell.write(data).await
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.write(&data).await
    }

    async fn read_until_prompt(&mut self) -> Result<String> {
        let live = self.live.as_mut().ok_or(SessionError::NotConnected)?;
        self.reader
            .read_until_prompt(&mut live.shell, self.dialect.prompt(), self.options.timeout)
            .await
    }

    /// Clear the input line, send a blank line and wait for a clean prompt.
    async fn resync(&mut self) -> Result<String> {
        self.write(CANCEL_LINE).await?;
        self.write(b"\n").await?;
        self.read_until_prompt().await
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        if self.live.is_some() {
            warn!("session to {} dropped without close()", self.host);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::error::{Error, TransportError};
    use crate::transport::HostParams;
    use crate::transport::mock::{FakeShell, MockConnector};

    pub(super) fn resolver(host: &str) -> HostParams {
        HostParams {
            hostname: format!("{host}.example.net"),
            user: "user".to_string(),
            port: 22,
            identity_file: None,
        }
    }

    pub(super) fn session(connector: MockConnector) -> Session<MockConnector> {
        SessionBuilder::new()
            .connector(connector)
            .resolver(resolver)
            .settle_delay(Duration::ZERO)
            .timeout(Duration::from_secs(2))
            .env("LANG", "C")
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_prepares_shell() {
        let connector = MockConnector::fake(FakeShell::new());
        let state = connector.state.clone();
        let mut session = session(connector);

        assert_ok!(session.connect("host").await);
        assert!(session.is_connected());
        assert_eq!(session.host(), Some("host"));

        let state = state.lock().unwrap();
        let target = &state.connects[0];
        assert_eq!(target.hostname, "host.example.net");
        assert_eq!(target.username, "user");
        assert_eq!(target.port, 22);

        let env = state.env.as_ref().unwrap();
        assert_eq!(env.get("LANG").map(String::as_str), Some("C"));
        assert_eq!(env.get("PAGER").map(String::as_str), Some("cat"));

        let written = state.written_text();
        assert!(written.contains("set cli complete-on-space off\n"));
        assert!(written.contains("set cli screen-length 0\n"));
        assert!(written.contains("\x15\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pager_always_forced() {
        let connector = MockConnector::fake(FakeShell::new());
        let state = connector.state.clone();
        let mut session = SessionBuilder::new()
            .connector(connector)
            .resolver(resolver)
            .env("PAGER", "less")
            .build()
            .unwrap();

        session.connect("host").await.unwrap();
        let state = state.lock().unwrap();
        assert_eq!(
            state.env.as_ref().unwrap().get("PAGER").map(String::as_str),
            Some("cat")
        );
        drop(state);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_in_token_overrides_config() {
        let connector = MockConnector::fake(FakeShell::new());
        let state = connector.state.clone();
        let mut session = session(connector);

        session.connect("ops@r1").await.unwrap();
        let state = state.lock().unwrap();
        assert_eq!(state.connects[0].username, "ops");
        assert_eq!(state.connects[0].host, "r1");
        assert_eq!(state.connects[0].hostname, "r1.example.net");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let connector = MockConnector::fake(FakeShell::new());
        let state = connector.state.clone();
        let mut session = session(connector);
        session.connect("host").await.unwrap();

        session.close().await;
        assert!(!session.is_connected());
        session.close().await;
        assert!(!session.is_connected());
        assert_eq!(session.host(), None);

        let state = state.lock().unwrap();
        assert_eq!(state.live_shells, 0);
        assert_eq!(state.connections_closed, 1);
    }

    #[tokio::test]
    async fn test_close_before_connect() {
        let mut session = session(MockConnector::fake(FakeShell::new()));
        session.close().await;
        session.close().await;
        assert!(!session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_does_not_leak() {
        let connector = MockConnector::fake(FakeShell::new());
        let state = connector.state.clone();
        let mut session = session(connector);

        session.connect("host-a").await.unwrap();
        session.connect("host-b").await.unwrap();

        {
            let state = state.lock().unwrap();
            assert_eq!(state.live_shells, 1);
            assert_eq!(state.connections_closed, 1);
            assert_eq!(state.connects.len(), 2);
            assert_eq!(state.connects[1].host, "host-b");
        }
        assert_eq!(session.host(), Some("host-b"));
        session.close().await;
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces() {
        let mut session = session(MockConnector::refusing());

        let err = assert_err!(session.connect("host").await);
        assert!(matches!(
            err,
            Error::Transport(TransportError::AuthenticationFailed { .. })
        ));
        assert!(!session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_prompt_cleans_up() {
        let connector = MockConnector::with_factory(|_| {
            ("Welcome\nno prompt".to_string(), Box::new(|_: &[u8]| Vec::new()))
        });
        let state = connector.state.clone();
        let mut session = session(connector);

        let err = assert_err!(session.connect("host").await);
        assert!(err.is_timeout());
        assert!(!session.is_connected());
        assert_eq!(state.lock().unwrap().live_shells, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt() {
        let connector = MockConnector::fake(FakeShell::new());
        let state = connector.state.clone();
        let mut session = session(connector);
        session.connect("host").await.unwrap();

        assert_ok!(session.interrupt().await);
        assert_eq!(
            state.lock().unwrap().written.last().map(Vec::as_slice),
            Some(INTERRUPT)
        );

        // The ^C output was absorbed; the next command starts clean.
        let mut sink = LineCollector::new();
        let result = session.execute("", &mut sink).await.unwrap();
        assert!(result.lines.is_empty());
        session.close().await;
    }

    #[tokio::test]
    async fn test_interrupt_not_connected() {
        let mut session = session(MockConnector::fake(FakeShell::new()));
        assert_ok!(session.interrupt().await);
    }
}
