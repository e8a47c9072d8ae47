//! Command results and output sinks.

use std::time::Duration;

/// Status reported for a command that completed cleanly.
pub const STATUS_OK: i32 = 0;

/// Status reported for an error marker or a read timeout.
pub const STATUS_FAILED: i32 = 1;

/// Result of one command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// The command that was executed (trimmed).
    pub command: String,

    /// Output lines, with the command echo and trailing prompt removed.
    pub lines: Vec<String>,

    /// 0 on success; 1 on an error marker or timeout.
    pub status: i32,

    /// The marker that flagged the output as an error, if any.
    pub error_marker: Option<String>,

    /// Whether the prompt did not come back in time.
    pub timed_out: bool,

    /// Time taken to execute the command.
    pub elapsed: Duration,
}

impl CommandResult {
    /// Check if the result indicates success.
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }

    /// The output joined with newlines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Receives output lines as a command produces them.
pub trait OutputSink {
    /// Accept one line of output or one session notice.
    fn line(&mut self, line: &str);
}

impl<F: FnMut(&str)> OutputSink for F {
    fn line(&mut self, line: &str) {
        self(line)
    }
}

/// A sink that keeps every line.
#[derive(Debug, Default, Clone)]
pub struct LineCollector {
    pub lines: Vec<String>,
}

impl LineCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for LineCollector {
    fn line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}
