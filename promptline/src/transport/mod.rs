//! Transport boundary: connection setup and the interactive shell byte channel.
//!
//! The session engine never touches SSH directly. It drives a
//! [`Connector`] to obtain a [`Connection`], asks that for a
//! [`ShellChannel`], and from then on only polls for bytes and writes
//! bytes. [`SshConnector`] is the russh-backed implementation.

pub mod config;
pub mod resolver;
mod ssh;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;

use indexmap::IndexMap;

use crate::error::Result;

pub use config::{AuthMethod, ConnectTarget, HostKeyVerification, SshConfig};
pub use resolver::{HostParams, HostResolver, SshConfigResolver};
pub use ssh::{SshConnection, SshConnector, SshShell};

/// Opens authenticated connections.
pub trait Connector: Send + Sync {
    /// The live connection type.
    type Connection: Connection;

    /// Connect and authenticate. Failures surface unmodified as
    /// transport errors and are never retried here.
    fn connect(
        &self,
        target: &ConnectTarget,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// An authenticated connection able to host one interactive shell.
pub trait Connection: Send {
    /// The shell channel type.
    type Shell: ShellChannel;

    /// Open an interactive shell sub-channel with the given environment.
    fn open_shell(
        &mut self,
        env: &IndexMap<String, String>,
    ) -> impl Future<Output = Result<Self::Shell>> + Send;

    /// Release the connection.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Duplex byte channel to an interactive shell with non-blocking readiness checks.
pub trait ShellChannel: Send {
    /// Check whether stdout bytes are ready to read without waiting.
    fn data_available(&mut self) -> bool;

    /// Check whether stderr bytes are ready to read without waiting.
    fn error_data_available(&mut self) -> bool;

    /// Read up to `max` ready stdout bytes. Never waits.
    fn read(&mut self, max: usize) -> Vec<u8>;

    /// Read up to `max` ready stderr bytes. Never waits.
    fn read_error(&mut self, max: usize) -> Vec<u8>;

    /// Whether the remote end has closed and nothing is left to read.
    fn is_closed(&self) -> bool {
        false
    }

    /// Write bytes to the shell.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Close the shell channel.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
