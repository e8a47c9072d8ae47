//! # Promptline
//!
//! Async line-oriented command sessions over interactive SSH shells.
//!
//! Promptline keeps one interactive shell open on a remote host and turns
//! its unframed byte stream into discrete command results. It recognizes
//! the shell's prompt, answers its pager, flags in-band error messages and
//! asks the shell itself for tab completions.
//!
//! ## Features
//!
//! - Async SSH connections via russh
//! - Host resolution from `~/.ssh/config` with `user@host` overrides
//! - Tail-window prompt matching with transparent pagination
//! - Pluggable shell dialects (JUNOS built in)
//! - Completion by `?` query with a help-command fallback
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use promptline::{LineCollector, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), promptline::Error> {
//!     let mut session = SessionBuilder::new().build()?;
//!     session.connect("admin@router1").await?;
//!
//!     let mut output = LineCollector::new();
//!     let result = session.execute("show version", &mut output).await?;
//!     println!("{}", result.text());
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod dialect;
pub mod error;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use dialect::Dialect;
pub use error::Error;
pub use session::{CommandResult, LineCollector, OutputSink, Session, SessionBuilder, SessionOptions};
pub use transport::{HostKeyVerification, SshConfig, SshConfigResolver};
