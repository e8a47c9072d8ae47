//! Command execution.

use log::{debug, warn};
use tokio::time::Instant;

use super::response::{CommandResult, OutputSink, STATUS_FAILED, STATUS_OK};
use super::Session;
use crate::channel::PromptClassifier;
use crate::dialect::Dialect;
use crate::error::{ChannelError, Error, Result, SessionError};
use crate::transport::Connector;

impl<C: Connector> Session<C> {
    /// Run one command and stream its output to `sink`.
    ///
    /// The sink first receives a `[ssh] host = <host>` notice, then every
    /// output line. A line containing a dialect error marker, or a prompt
    /// that never returns, yields status 1; in both cases the output seen
    /// so far is still delivered. The shell is resynchronized afterwards
    /// either way. Only transport faults are returned as errors.
    pub async fn execute(
        &mut self,
        command: &str,
        sink: &mut impl OutputSink,
    ) -> Result<CommandResult> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected.into());
        }

        let command = command.trim();
        let start = Instant::now();
        debug!("executing on {}: {}", self.host, command);

        self.write_line(command).await?;
        sink.line(&format!("[ssh] host = {}", self.host));

        let (lines, timed_out) = match self.read_until_prompt().await {
            Ok(raw) => (output_lines(&raw, command, &self.dialect), false),
            Err(Error::Channel(ChannelError::Timeout { timeout, partial })) => {
                warn!(
                    "no prompt from {} within {:?} for: {}",
                    self.host, timeout, command
                );
                (partial_lines(&partial, command), true)
            }
            Err(e) => return Err(e),
        };

        let mut error_marker = None;
        for line in &lines {
            if error_marker.is_none() {
                error_marker = self.dialect.detect_error(line).map(str::to_string);
            }
            sink.line(line);
        }

        match self.resync().await {
            Ok(_) => {}
            Err(e) if e.is_timeout() => warn!("resync after command on {} timed out", self.host),
            Err(e) => return Err(e),
        }

        let status = if timed_out || error_marker.is_some() {
            STATUS_FAILED
        } else {
            STATUS_OK
        };

        Ok(CommandResult {
            command: command.to_string(),
            lines,
            status,
            error_marker,
            timed_out,
            elapsed: start.elapsed(),
        })
    }
}

/// Split a completed response into output lines.
///
/// The echoed command line and the terminating prompt (with any status
/// lines printed directly above it) are removed.
pub(crate) fn output_lines(raw: &str, command: &str, dialect: &Dialect) -> Vec<String> {
    let mut lines: Vec<&str> = raw.split('\n').collect();
    strip_echo(&mut lines, command);

    if lines
        .last()
        .is_some_and(|last| dialect.prompt().is_terminating_prompt(last))
    {
        lines.pop();
        while lines
            .last()
            .is_some_and(|last| dialect.is_prompt_preamble(last))
        {
            lines.pop();
        }
    }

    lines.into_iter().map(str::to_string).collect()
}

/// Split the partial output of a timed-out read.
fn partial_lines(partial: &str, command: &str) -> Vec<String> {
    let mut lines: Vec<&str> = partial.split('\n').collect();
    strip_echo(&mut lines, command);
    if lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }
    lines.into_iter().map(str::to_string).collect()
}

fn strip_echo(lines: &mut Vec<&str>, command: &str) {
    if lines.first().is_some_and(|first| first.trim() == command) {
        lines.remove(0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio_test::assert_err;

    use super::*;
    use crate::session::tests::session;
    use crate::session::LineCollector;
    use crate::transport::mock::{FakeShell, MockConnector, Responder};

    fn junos() -> Dialect {
        Dialect::junos().unwrap()
    }

    #[test]
    fn test_output_lines_strips_echo_and_prompt() {
        let lines = output_lines(
            "show version\nline1\nline2\nuser@host> ",
            "show version",
            &junos(),
        );
        assert_eq!(lines, vec!["line1", "line2"]);
    }

    #[test]
    fn test_output_lines_keeps_unmatched_echo() {
        let lines = output_lines("other\nline1\nuser@host> ", "show version", &junos());
        assert_eq!(lines, vec!["other", "line1"]);
    }

    #[test]
    fn test_output_lines_drops_prompt_preamble() {
        let lines = output_lines(
            "show route\n10.0.0.0/8\n\n{master:0}\nuser@host> ",
            "show route",
            &junos(),
        );
        assert_eq!(lines, vec!["10.0.0.0/8", ""]);

        let lines = output_lines(
            "set system host-name r1\n\n[edit]\nuser@host# ",
            "set system host-name r1",
            &junos(),
        );
        assert_eq!(lines, vec![""]);
    }

    #[test]
    fn test_output_lines_without_prompt() {
        let lines = output_lines("show version\nline1", "show version", &junos());
        assert_eq!(lines, vec!["line1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_round_trip() {
        let shell = FakeShell::new().command("show version", &["line1\nline2\n"]);
        let mut session = session(MockConnector::fake(shell));
        session.connect("host").await.unwrap();

        let mut sink = LineCollector::new();
        let result = session.execute("  show version ", &mut sink).await.unwrap();

        assert_eq!(result.command, "show version");
        assert_eq!(result.lines, vec!["line1", "line2"]);
        assert_eq!(result.status, 0);
        assert!(result.is_success());
        assert!(!result.timed_out);
        assert_eq!(sink.lines, vec!["[ssh] host = host", "line1", "line2"]);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_pages_through_pager() {
        let shell = FakeShell::new().command(
            "show log messages",
            &["first\nsecond\n", "third\n", "fourth\n"],
        );
        let connector = MockConnector::fake(shell);
        let state = connector.state.clone();
        let mut session = session(connector);
        session.connect("host").await.unwrap();

        let mut sink = LineCollector::new();
        let result = session
            .execute("show log messages", &mut sink)
            .await
            .unwrap();

        assert_eq!(result.lines, vec!["first", "second", "third", "fourth"]);
        assert_eq!(result.status, 0);

        let spaces = state
            .lock()
            .unwrap()
            .written
            .iter()
            .filter(|w| w.as_slice() == b" ")
            .count();
        assert_eq!(spaces, 2);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_error_marker() {
        let mut session = session(MockConnector::fake(FakeShell::new()));
        session.connect("host").await.unwrap();

        let mut seen = Vec::new();
        let mut sink = |line: &str| seen.push(line.to_string());
        let result = session.execute("show bogus", &mut sink).await.unwrap();

        assert_eq!(result.status, 1);
        assert_eq!(result.error_marker.as_deref(), Some("unknown command."));
        assert!(!result.timed_out);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], "unknown command.");
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_timeout_keeps_session_usable() {
        let connector = MockConnector::with_factory(|target| {
            let prompt = format!("{}@{}> ", target.username, target.host);
            let banner = prompt.clone();
            let responder: Responder = Box::new(move |data: &[u8]| match data {
                b"\n" => format!("\n{prompt}").into_bytes(),
                d if d.starts_with(b"set cli") => format!("\n{prompt}").into_bytes(),
                b"show version\n" => format!("show version\nJunos: 23.4\n{prompt}").into_bytes(),
                b"request system reboot\n" => b"request system reboot\nReboot the system ? ".to_vec(),
                _ => Vec::new(),
            });
            (banner, responder)
        });
        let mut session = session(connector);
        session.connect("host").await.unwrap();

        let start = Instant::now();
        let mut sink = LineCollector::new();
        let result = session
            .execute("request system reboot", &mut sink)
            .await
            .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.status, 1);
        assert_eq!(result.lines, vec!["Reboot the system ? "]);
        assert_eq!(sink.lines[1], "Reboot the system ? ");
        assert!(start.elapsed() >= Duration::from_secs(2));

        let mut sink = LineCollector::new();
        let result = session.execute("show version", &mut sink).await.unwrap();
        assert_eq!(result.status, 0);
        assert_eq!(result.lines, vec!["Junos: 23.4"]);
        session.close().await;
    }

    #[tokio::test]
    async fn test_execute_not_connected() {
        let mut session = session(MockConnector::fake(FakeShell::new()));
        let mut sink = LineCollector::new();

        let err = assert_err!(session.execute("show version", &mut sink).await);
        assert!(matches!(err, Error::Session(SessionError::NotConnected)));
        assert!(sink.lines.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_writes_command_line() {
        let connector = MockConnector::fake(FakeShell::new().command("show version", &["ok\n"]));
        let state: Arc<Mutex<_>> = connector.state.clone();
        let mut session = session(connector);
        session.connect("host").await.unwrap();

        let mut sink = LineCollector::new();
        session.execute("show version", &mut sink).await.unwrap();

        let state = state.lock().unwrap();
        let idx = state
            .written
            .iter()
            .position(|w| w.as_slice() == b"show version\n")
            .unwrap();
        // Followed by the resync pair.
        assert_eq!(state.written[idx + 1], b"\x15");
        assert_eq!(state.written[idx + 2], b"\n");
    }
}
