//! Scripted in-memory transport for tests.
//!
//! [`FakeShell`] is a tiny JUNOS-flavoured line editor: it echoes typed
//! lines, answers `?` with a canned completion listing, pages multi-page
//! output behind `---(more)---`, and honours Ctrl-U and Ctrl-C.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use super::config::ConnectTarget;
use super::{Connection, Connector, ShellChannel};
use crate::error::{Result, TransportError};

pub(crate) type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

type ResponderFactory = Arc<dyn Fn(&ConnectTarget) -> (String, Responder) + Send + Sync>;

/// Everything the tests want to observe about the transport.
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub connects: Vec<ConnectTarget>,
    pub connections_closed: usize,
    pub live_shells: usize,
    pub written: Vec<Vec<u8>>,
    pub env: Option<IndexMap<String, String>>,
}

impl MockState {
    /// All writes, concatenated and lossily decoded.
    pub fn written_text(&self) -> String {
        self.written
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }
}

#[derive(Clone)]
pub(crate) struct MockConnector {
    pub state: Arc<Mutex<MockState>>,
    factory: ResponderFactory,
    refuse: bool,
}

impl MockConnector {
    /// Every connection runs a fresh copy of `shell`, prompting as `user@<host>`.
    pub fn fake(shell: FakeShell) -> Self {
        Self::with_factory(move |target| {
            let mut shell = shell.clone();
            shell.prompt = format!("{}@{}> ", target.username, target.host);
            let banner = format!("--- JUNOS 23.4R1 built 2024\n{}", shell.prompt);
            (banner, shell.into_responder())
        })
    }

    pub fn with_factory(
        factory: impl Fn(&ConnectTarget) -> (String, Responder) + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            factory: Arc::new(factory),
            refuse: false,
        }
    }

    /// A connector whose every connect fails authentication.
    pub fn refusing() -> Self {
        let mut connector = Self::with_factory(|_| (String::new(), Box::new(|_| Vec::new())));
        connector.refuse = true;
        connector
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, target: &ConnectTarget) -> Result<MockConnection> {
        if self.refuse {
            return Err(TransportError::AuthenticationFailed {
                user: target.username.clone(),
            }
            .into());
        }
        self.state.lock().unwrap().connects.push(target.clone());
        Ok(MockConnection {
            state: self.state.clone(),
            factory: self.factory.clone(),
            target: target.clone(),
        })
    }
}

pub(crate) struct MockConnection {
    state: Arc<Mutex<MockState>>,
    factory: ResponderFactory,
    target: ConnectTarget,
}

impl Connection for MockConnection {
    type Shell = MockShell;

    async fn open_shell(&mut self, env: &IndexMap<String, String>) -> Result<MockShell> {
        let (banner, responder) = (self.factory)(&self.target);
        {
            let mut state = self.state.lock().unwrap();
            state.live_shells += 1;
            state.env = Some(env.clone());
        }
        let mut shell = MockShell::new(self.state.clone(), responder);
        if !banner.is_empty() {
            shell.stdout.push_back(banner.into_bytes());
        }
        Ok(shell)
    }

    async fn close(self) -> Result<()> {
        self.state.lock().unwrap().connections_closed += 1;
        Ok(())
    }
}

pub(crate) struct MockShell {
    state: Arc<Mutex<MockState>>,
    responder: Responder,
    stdout: VecDeque<Vec<u8>>,
    stderr: VecDeque<Vec<u8>>,
    open: bool,
}

impl MockShell {
    pub fn new(state: Arc<Mutex<MockState>>, responder: Responder) -> Self {
        Self {
            state,
            responder,
            stdout: VecDeque::new(),
            stderr: VecDeque::new(),
            open: true,
        }
    }

    /// A standalone shell with some output already queued.
    pub fn scripted(initial: &[&str], responder: Responder) -> Self {
        let mut shell = Self::new(Arc::new(Mutex::new(MockState::default())), responder);
        shell.stdout.extend(initial.iter().map(|s| s.as_bytes().to_vec()));
        shell
    }

    pub fn push_stderr(&mut self, data: &str) {
        self.stderr.push_back(data.as_bytes().to_vec());
    }

    pub fn state(&self) -> Arc<Mutex<MockState>> {
        self.state.clone()
    }
}

fn take_front(queue: &mut VecDeque<Vec<u8>>, max: usize) -> Vec<u8> {
    let Some(mut chunk) = queue.pop_front() else {
        return Vec::new();
    };
    if chunk.len() > max {
        let rest = chunk.split_off(max);
        queue.push_front(rest);
    }
    chunk
}

impl ShellChannel for MockShell {
    fn data_available(&mut self) -> bool {
        !self.stdout.is_empty()
    }

    fn error_data_available(&mut self) -> bool {
        !self.stderr.is_empty()
    }

    fn read(&mut self, max: usize) -> Vec<u8> {
        take_front(&mut self.stdout, max)
    }

    fn read_error(&mut self, max: usize) -> Vec<u8> {
        take_front(&mut self.stderr, max)
    }

    fn is_closed(&self) -> bool {
        !self.open && self.stdout.is_empty()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.state.lock().unwrap().written.push(data.to_vec());
        let reply = (self.responder)(data);
        if !reply.is_empty() {
            self.stdout.push_back(reply);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.state.lock().unwrap().live_shells -= 1;
        }
        Ok(())
    }
}

pub(crate) const MORE: &str = "---(more)---";

/// Minimal interactive shell model driven byte by byte.
#[derive(Clone, Default)]
pub(crate) struct FakeShell {
    pub prompt: String,
    /// Command line -> output pages. Each page carries its own newlines.
    pub commands: HashMap<String, Vec<String>>,
    /// Line typed before `?` -> completion listing lines.
    pub completions: HashMap<String, String>,
    /// Context line printed above the prompt, e.g. `[edit]`.
    pub context: Option<String>,
    line: String,
    pages: VecDeque<String>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(mut self, line: &str, pages: &[&str]) -> Self {
        self.commands
            .insert(line.to_string(), pages.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn completion(mut self, typed: &str, listing: &str) -> Self {
        self.completions.insert(typed.to_string(), listing.to_string());
        self
    }

    pub fn in_context(mut self, context: &str) -> Self {
        self.context = Some(context.to_string());
        self
    }

    pub fn into_responder(mut self) -> Responder {
        Box::new(move |data| self.feed(data).into_bytes())
    }

    fn prompt_block(&self) -> String {
        match &self.context {
            Some(context) => format!("\n{}\n{}", context, self.prompt.replace('>', "#")),
            None => format!("\n{}", self.prompt),
        }
    }

    pub fn feed(&mut self, data: &[u8]) -> String {
        let mut out = String::new();
        for &byte in data {
            if !self.pages.is_empty() {
                if byte == b' ' {
                    if let Some(page) = self.pages.pop_front() {
                        out.push_str(&page);
                    }
                    if self.pages.is_empty() {
                        out.push_str(&self.prompt_block()[1..]);
                    } else {
                        out.push_str(MORE);
                    }
                }
                continue;
            }

            match byte {
                0x15 => self.line.clear(),
                0x03 => {
                    self.line.clear();
                    out.push_str("^C");
                    out.push_str(&self.prompt_block());
                }
                b'\n' => {
                    let line = std::mem::take(&mut self.line);
                    out.push_str(&line);
                    out.push('\n');
                    self.run(line.trim(), &mut out);
                }
                b'?' => {
                    out.push_str(&self.line);
                    out.push_str("?\n");
                    match self.completions.get(&self.line) {
                        Some(listing) => {
                            out.push_str("Possible completions:\n");
                            out.push_str(listing);
                        }
                        None => out.push_str("                ^\nsyntax error."),
                    }
                    out.push_str(&self.prompt_block());
                    out.push_str(&self.line);
                }
                _ => self.line.push(byte as char),
            }
        }
        out
    }

    fn run(&mut self, line: &str, out: &mut String) {
        if line.is_empty() {
            out.push_str(&self.prompt_block()[1..]);
            return;
        }
        match self.commands.get(line) {
            Some(pages) => {
                let mut pages: VecDeque<String> = pages.iter().cloned().collect();
                if let Some(first) = pages.pop_front() {
                    out.push_str(&first);
                }
                if pages.is_empty() {
                    out.push_str(&self.prompt_block()[1..]);
                } else {
                    out.push_str(MORE);
                    self.pages = pages;
                }
            }
            None => {
                out.push_str("                ^\nunknown command.\n");
                out.push_str(&self.prompt_block()[1..]);
            }
        }
    }
}
