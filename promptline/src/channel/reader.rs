//! Read-until-prompt polling loop.

use std::time::Duration;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::buffer::SessionBuffer;
use super::patterns::{PromptClassifier, PromptState};
use crate::error::{ChannelError, Result};
use crate::transport::ShellChannel;

/// Byte the pager consumes to show the next page.
const NEXT_PAGE: &[u8] = b" ";

/// Tuning for the read loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Sleep between readiness checks when nothing is ready.
    pub poll_interval: Duration,

    /// Bytes from the end of the buffer handed to the classifier.
    pub search_depth: usize,

    /// Maximum bytes taken from the channel per read.
    pub read_chunk: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            search_depth: 1000,
            read_chunk: 4096,
        }
    }
}

/// Accumulates shell output until the classifier reports a prompt.
///
/// One reader belongs to one shell; it is not meant to be shared between
/// concurrent callers, since pager and partial-line state live in the
/// remote shell and cannot be split.
#[derive(Debug)]
pub struct SessionReader {
    config: ReaderConfig,
    buffer: SessionBuffer,
}

impl SessionReader {
    /// Create a reader with the given configuration.
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            buffer: SessionBuffer::new(config.search_depth),
            config,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Read until `prompt` recognises a terminating prompt, or fail with
    /// [`ChannelError::Timeout`] carrying whatever arrived.
    ///
    /// Pagination markers are stripped from the buffer and answered with a
    /// single space, so a paged response comes back as one logical buffer.
    pub async fn read_until_prompt<S: ShellChannel>(
        &mut self,
        shell: &mut S,
        prompt: &dyn PromptClassifier,
        timeout: Duration,
    ) -> Result<String> {
        self.buffer.clear();
        let start = Instant::now();

        loop {
            let mut received = false;

            if shell.data_available() {
                let chunk = shell.read(self.config.read_chunk);
                trace!("read {} bytes: {:?}", chunk.len(), String::from_utf8_lossy(&chunk));
                self.buffer.extend(&chunk);
                received = true;
            }

            if shell.error_data_available() {
                let chunk = shell.read_error(self.config.read_chunk);
                trace!("read {} stderr bytes", chunk.len());
                self.buffer.extend(&chunk);
                received = true;
            }

            if received {
                match prompt.classify(self.buffer.tail()) {
                    PromptState::Pagination { marker_len } => {
                        debug!("pagination marker, requesting next page");
                        self.buffer.truncate_tail(marker_len);
                        shell.write(NEXT_PAGE).await?;
                    }
                    PromptState::Prompt => {
                        trace!("prompt matched after {:?}", start.elapsed());
                        return Ok(self.buffer.take());
                    }
                    PromptState::Pending => {}
                }
            } else if shell.is_closed() {
                return Err(ChannelError::Closed.into());
            }

            // The deadline holds even while output keeps streaming.
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                debug!(
                    "no prompt after {:?}; {} bytes buffered",
                    elapsed,
                    self.buffer.len()
                );
                return Err(ChannelError::Timeout {
                    timeout,
                    partial: self.buffer.take(),
                }
                .into());
            }

            if !received {
                tokio::time::sleep(self.config.poll_interval.min(timeout - elapsed)).await;
            }
        }
    }
}

impl Default for SessionReader {
    fn default() -> Self {
        Self::new(ReaderConfig::default())
    }
}
