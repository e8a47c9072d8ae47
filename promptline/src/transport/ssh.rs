//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use indexmap::IndexMap;
use log::{debug, trace, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, oneshot};

use super::config::{AuthMethod, ConnectTarget, HostKeyVerification, SshConfig};
use super::{Connection, Connector, ShellChannel};
use crate::error::{ChannelError, Result, TransportError};

/// Key files tried, in order, when neither configuration nor a password applies.
const DEFAULT_IDENTITIES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

/// Opens russh client connections.
pub struct SshConnector {
    config: SshConfig,
    password: Option<SecretString>,
}

impl SshConnector {
    /// Create a connector with the given transport settings.
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            password: None,
        }
    }

    /// Use password authentication for hosts without a configured identity.
    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    /// Replace the transport settings, keeping any password.
    pub fn with_config(mut self, config: SshConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the transport settings.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Pick the authentication method for a target.
    fn auth_for(&self, target: &ConnectTarget) -> AuthMethod {
        if let Some(path) = &target.identity {
            return AuthMethod::PrivateKey {
                path: path.clone(),
                passphrase: None,
            };
        }

        if let Some(password) = &self.password {
            return AuthMethod::Password(SecretString::from(password.expose_secret().to_string()));
        }

        match default_identity() {
            Some(path) => AuthMethod::PrivateKey {
                path,
                passphrase: None,
            },
            None => AuthMethod::None,
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(SshConfig::default())
    }
}

impl Connector for SshConnector {
    type Connection = SshConnection;

    async fn connect(&self, target: &ConnectTarget) -> Result<SshConnection> {
        let ssh_config = Arc::new(client::Config {
            // Idle sessions stay open; keepalives detect dead peers.
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: target.hostname.clone(),
            port: target.port,
            host_key_verification: self.config.host_key_verification.clone(),
            known_hosts_path: self.config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("connecting to {} as {}", target.socket_addr(), target.username);

        let mut session = tokio::time::timeout(
            self.config.timeout,
            client::connect(ssh_config, (target.hostname.as_str(), target.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.config.timeout))?
        .map_err(|e| {
            // Prefer the detailed host-key error recorded by the handler
            // over russh's generic UnknownKey.
            let recorded = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            recorded.unwrap_or_else(|| match e {
                russh::Error::IO(source) => TransportError::ConnectionFailed {
                    host: target.hostname.clone(),
                    port: target.port,
                    source,
                },
                other => TransportError::Ssh(other),
            })
        })?;

        let auth = self.auth_for(target);
        authenticate(&mut session, &target.username, &auth).await?;

        debug!("authenticated to {}", target.socket_addr());

        Ok(SshConnection {
            session,
            terminal_width: self.config.terminal_width,
            terminal_height: self.config.terminal_height,
        })
    }
}

/// Authenticate with the server.
async fn authenticate(
    session: &mut Handle<SshHandler>,
    username: &str,
    auth: &AuthMethod,
) -> Result<()> {
    let success = match auth {
        AuthMethod::None => session
            .authenticate_none(username)
            .await
            .map_err(TransportError::Ssh)?
            .success(),
        AuthMethod::Password(password) => session
            .authenticate_password(username, password.expose_secret())
            .await
            .map_err(TransportError::Ssh)?
            .success(),
        AuthMethod::PrivateKey { path, passphrase } => {
            let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                .map_err(|e| TransportError::Key(format!("{}: {}", path.display(), e)))?;

            // Get the best RSA hash algorithm supported by the server
            let hash_alg = session
                .best_supported_rsa_hash()
                .await
                .map_err(TransportError::Ssh)?
                .flatten();

            session
                .authenticate_publickey(
                    username,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map_err(TransportError::Ssh)?
                .success()
        }
    };

    if !success {
        return Err(TransportError::AuthenticationFailed {
            user: username.to_string(),
        }
        .into());
    }

    Ok(())
}

fn default_identity() -> Option<PathBuf> {
    let ssh_dir = dirs::home_dir()?.join(".ssh");
    DEFAULT_IDENTITIES
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.exists())
}

/// An authenticated russh session.
pub struct SshConnection {
    session: Handle<SshHandler>,
    terminal_width: u32,
    terminal_height: u32,
}

impl Connection for SshConnection {
    type Shell = SshShell;

    async fn open_shell(&mut self, env: &IndexMap<String, String>) -> Result<SshShell> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.terminal_width,
                self.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|_| ChannelError::ShellRequestFailed)?;

        // Servers reject variables not in AcceptEnv; that is not fatal.
        for (name, value) in env {
            if let Err(e) = channel.set_env(false, name.as_str(), value.as_str()).await {
                warn!("failed to set {} on shell channel: {}", name, e);
            }
        }

        channel
            .request_shell(true)
            .await
            .map_err(|_| ChannelError::ShellRequestFailed)?;

        Ok(SshShell::spawn(channel))
    }

    async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

enum ShellRequest {
    Data(Vec<u8>, oneshot::Sender<std::result::Result<(), russh::Error>>),
    Close,
}

/// Interactive shell channel.
///
/// A pump task owns the russh channel, queues incoming stdout and stderr
/// chunks, and applies writes in order. Readiness checks drain those
/// queues without waiting.
pub struct SshShell {
    requests: mpsc::UnboundedSender<ShellRequest>,
    stdout: mpsc::UnboundedReceiver<Vec<u8>>,
    stderr: mpsc::UnboundedReceiver<Vec<u8>>,
    stdout_backlog: BytesMut,
    stderr_backlog: BytesMut,
    closed: bool,
}

impl SshShell {
    fn spawn(channel: Channel<Msg>) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump(channel, requests_rx, stdout_tx, stderr_tx));

        Self {
            requests: requests_tx,
            stdout: stdout_rx,
            stderr: stderr_rx,
            stdout_backlog: BytesMut::with_capacity(4096),
            stderr_backlog: BytesMut::new(),
            closed: false,
        }
    }
}

/// Move every queued chunk into the backlog. Returns false once the pump is gone.
fn drain(queue: &mut mpsc::UnboundedReceiver<Vec<u8>>, backlog: &mut BytesMut) -> bool {
    loop {
        match queue.try_recv() {
            Ok(chunk) => backlog.extend_from_slice(&chunk),
            Err(mpsc::error::TryRecvError::Empty) => return true,
            Err(mpsc::error::TryRecvError::Disconnected) => return false,
        }
    }
}

fn take_up_to(backlog: &mut BytesMut, max: usize) -> Vec<u8> {
    let n = backlog.len().min(max);
    let out = backlog[..n].to_vec();
    backlog.advance(n);
    out
}

impl ShellChannel for SshShell {
    fn data_available(&mut self) -> bool {
        if !drain(&mut self.stdout, &mut self.stdout_backlog) {
            self.closed = true;
        }
        !self.stdout_backlog.is_empty()
    }

    fn error_data_available(&mut self) -> bool {
        drain(&mut self.stderr, &mut self.stderr_backlog);
        !self.stderr_backlog.is_empty()
    }

    fn read(&mut self, max: usize) -> Vec<u8> {
        take_up_to(&mut self.stdout_backlog, max)
    }

    fn read_error(&mut self, max: usize) -> Vec<u8> {
        take_up_to(&mut self.stderr_backlog, max)
    }

    fn is_closed(&self) -> bool {
        self.closed && self.stdout_backlog.is_empty() && self.stderr_backlog.is_empty()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.requests
            .send(ShellRequest::Data(data.to_vec(), ack_tx))
            .map_err(|_| ChannelError::Closed)?;

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Ssh(e).into()),
            Err(_) => Err(ChannelError::Closed.into()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        // The pump may already be gone; closing is best-effort.
        let _ = self.requests.send(ShellRequest::Close);
        self.closed = true;
        Ok(())
    }
}

async fn pump(
    mut channel: Channel<Msg>,
    mut requests: mpsc::UnboundedReceiver<ShellRequest>,
    stdout: mpsc::UnboundedSender<Vec<u8>>,
    stderr: mpsc::UnboundedSender<Vec<u8>>,
) {
    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(ShellRequest::Data(bytes, ack)) => {
                    trace!("shell write: {:?}", String::from_utf8_lossy(&bytes));
                    let _ = ack.send(channel.data(&bytes[..]).await);
                }
                Some(ShellRequest::Close) | None => {
                    if let Err(e) = channel.close().await {
                        debug!("shell channel close: {}", e);
                    }
                    break;
                }
            },
            message = channel.wait() => match message {
                Some(ChannelMsg::Data { data }) => {
                    trace!("shell read: {} bytes", data.len());
                    let _ = stdout.send(data.to_vec());
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    let _ = stderr.send(data.to_vec());
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("shell channel closed by remote");
                    break;
                }
                Some(other) => trace!("shell channel message: {:?}", other),
            },
        }
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn record(&self, error: TransportError) {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    warn!("learning new host key for {}:{}", self.host, self.port);
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    Ok(true)
                }
                Err(e) => {
                    self.record(e);
                    Ok(false)
                }
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    self.record(TransportError::HostKeyUnknown {
                        host: self.host.clone(),
                        port: self.port,
                    });
                    Ok(false)
                }
                Err(e) => {
                    self.record(e);
                    Ok(false)
                }
            },
        }
    }
}
