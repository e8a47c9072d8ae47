//! Error types for promptline.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for promptline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors (connect, authenticate, host keys).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Shell channel errors (read deadline, closed channel).
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session-level errors.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// The server presented a key that differs from the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Strict verification found no known_hosts entry for the server
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Shell channel errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// No terminating prompt arrived before the deadline.
    ///
    /// `partial` holds whatever was accumulated, for diagnostics.
    #[error("Prompt not found within {timeout:?}")]
    Timeout { timeout: Duration, partial: String },

    /// Channel closed by the remote end
    #[error("Channel closed")]
    Closed,

    /// The server refused the PTY or shell request
    #[error("Failed to request interactive shell")]
    ShellRequestFailed,
}

/// Session-level errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// An operation needing a live shell ran before `connect()`
    #[error("Session not connected - call connect() first")]
    NotConnected,

    /// Invalid configuration in the session builder or dialect
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl Error {
    /// Whether this is a read deadline expiry, which leaves the session usable.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Channel(ChannelError::Timeout { .. }))
    }
}

/// Result type alias using promptline's Error.
pub type Result<T> = std::result::Result<T, Error>;
