//! Scripted in-memory transport
//!
//! Every exec spawns a caller supplied *program* that plays the remote
//! command: it reads what the local side writes to stdin and answers with
//! [`ChannelEvent`]s. Everything the local side does is recorded in a
//! [`MockLog`] for assertions.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::transport::{ChannelEvent, CommandChannel, Connection, ExitStatus, StdinPipe, Transport};
use crate::{AuthMethod, AuthMode, Endpoint, PtyRequest, TransportError};

type Program = Arc<dyn Fn(RemoteProcess) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Step at which the mock should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Dialing fails
    Connect,
    /// Server rejects the credentials
    Authenticate,
    /// Session channel cannot be opened
    OpenChannel,
    /// Pty request is refused
    RequestPty,
    /// Exec request is refused
    Exec,
    /// Writes to stdin fail
    StdinWrite,
}

/// One connection attempt that reached the transport
#[derive(Debug, Clone)]
pub struct ConnectRecord {
    /// Dialed endpoint
    pub endpoint: Endpoint,
    /// User name
    pub user: String,
    /// Authentication mode presented
    pub mode: AuthMode,
    /// Whether the attempt produced a connection
    pub established: bool,
    /// Whether the connection was closed
    pub closed: bool,
}

/// Everything done on one channel
#[derive(Debug, Clone, Default)]
pub struct ChannelRecord {
    /// Index into [`MockLog::connects`]
    pub connection: usize,
    /// Pty request, if any
    pub pty: Option<PtyRequest>,
    /// Executed command
    pub command: Option<String>,
    /// Bytes written to stdin
    pub stdin: Vec<u8>,
    /// Whether EOF was sent
    pub stdin_closed: bool,
    /// Whether the channel was closed
    pub closed: bool,
}

/// Recorded interactions
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    /// Connection attempts in order
    pub connects: Vec<ConnectRecord>,
    /// Channels in order of opening
    pub channels: Vec<ChannelRecord>,
}

struct Shared {
    program: Program,
    failures: Vec<MockFailure>,
    log: Mutex<MockLog>,
}

impl Shared {
    fn log(&self) -> MutexGuard<'_, MockLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fails(&self, failure: MockFailure) -> bool {
        self.failures.contains(&failure)
    }
}

/// In-memory [`Transport`]
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Run `program` for every executed command
    pub fn new<F, Fut>(program: F) -> Self
    where
        F: Fn(RemoteProcess) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let program: Program =
            Arc::new(move |process| -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(program(process)) });
        Self {
            shared: Arc::new(Shared {
                program,
                failures: Vec::new(),
                log: Mutex::new(MockLog::default()),
            }),
        }
    }

    /// Answer every command with the same events
    pub fn replying(events: Vec<ChannelEvent>) -> Self {
        Self::new(move |process| {
            let events = events.clone();
            async move {
                for event in events {
                    process.send(event);
                }
            }
        })
    }

    /// Fail at `failure`. Must be called before the transport is shared.
    pub fn failing(mut self, failure: MockFailure) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.failures.push(failure);
        }
        self
    }

    /// Snapshot of recorded interactions
    pub fn log(&self) -> MockLog {
        self.shared.log().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        user: &str,
        auth: &AuthMethod,
    ) -> Result<MockConnection, TransportError> {
        let established = !self.shared.fails(MockFailure::Connect) && !self.shared.fails(MockFailure::Authenticate);
        let index = {
            let mut log = self.shared.log();
            log.connects.push(ConnectRecord {
                endpoint: endpoint.clone(),
                user: user.to_string(),
                mode: auth.mode(),
                established,
                closed: false,
            });
            log.connects.len() - 1
        };

        if self.shared.fails(MockFailure::Connect) {
            return Err(TransportError::Connection(format!("{}: connection refused", endpoint)));
        }
        if self.shared.fails(MockFailure::Authenticate) {
            return Err(TransportError::Authentication(format!(
                "server rejected {} authentication for {}",
                auth.mode(),
                user
            )));
        }

        Ok(MockConnection {
            shared: Arc::clone(&self.shared),
            index,
        })
    }
}

/// Connection produced by [`MockTransport`]
pub struct MockConnection {
    shared: Arc<Shared>,
    index: usize,
}

#[async_trait]
impl Connection for MockConnection {
    type Channel = MockChannel;

    async fn open_channel(&self) -> Result<MockChannel, TransportError> {
        if self.shared.fails(MockFailure::OpenChannel) {
            return Err(TransportError::Channel("session channel refused".to_string()));
        }

        let index = {
            let mut log = self.shared.log();
            log.channels.push(ChannelRecord {
                connection: self.index,
                ..Default::default()
            });
            log.channels.len() - 1
        };
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(MockChannel {
            shared: Arc::clone(&self.shared),
            index,
            pty: None,
            stdin_tx,
            pending: Some((stdin_rx, events_tx)),
            events_rx: Some(events_rx),
            exit_reported: false,
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(record) = self.shared.log().connects.get_mut(self.index) {
            record.closed = true;
        }
        Ok(())
    }
}

enum StdinMsg {
    Data(Bytes),
    Eof,
}

/// Channel produced by [`MockConnection`]
pub struct MockChannel {
    shared: Arc<Shared>,
    index: usize,
    pty: Option<PtyRequest>,
    stdin_tx: mpsc::UnboundedSender<StdinMsg>,
    pending: Option<(mpsc::UnboundedReceiver<StdinMsg>, mpsc::UnboundedSender<ChannelEvent>)>,
    events_rx: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    exit_reported: bool,
}

impl MockChannel {
    fn record(&self, update: impl FnOnce(&mut ChannelRecord)) {
        if let Some(record) = self.shared.log().channels.get_mut(self.index) {
            update(record);
        }
    }
}

#[async_trait]
impl CommandChannel for MockChannel {
    async fn request_pty(&mut self, pty: &PtyRequest) -> Result<(), TransportError> {
        if self.shared.fails(MockFailure::RequestPty) {
            return Err(TransportError::Channel("pty request failed".to_string()));
        }
        self.pty = Some(pty.clone());
        self.record(|record| record.pty = Some(pty.clone()));
        Ok(())
    }

    fn stdin_pipe(&self) -> StdinPipe {
        Box::pin(MockStdin {
            tx: self.stdin_tx.clone(),
            shared: Arc::clone(&self.shared),
            index: self.index,
        })
    }

    async fn exec(&mut self, command: &str) -> Result<(), TransportError> {
        if self.shared.fails(MockFailure::Exec) {
            return Err(TransportError::Channel("exec failed".to_string()));
        }
        let (stdin, events) = self
            .pending
            .take()
            .ok_or_else(|| TransportError::Channel("command already started".to_string()))?;
        self.record(|record| record.command = Some(command.to_string()));

        let process = RemoteProcess {
            command: command.to_string(),
            pty: self.pty.clone(),
            stdin,
            buffered: BytesMut::new(),
            eof: false,
            events,
        };
        tokio::spawn((self.shared.program)(process));
        Ok(())
    }

    async fn close_stdin(&mut self) -> Result<(), TransportError> {
        self.record(|record| record.stdin_closed = true);
        let _ = self.stdin_tx.send(StdinMsg::Eof);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        let events = self.events_rx.as_mut()?;
        match events.recv().await {
            Some(event) => {
                if matches!(event, ChannelEvent::Exit(_)) {
                    self.exit_reported = true;
                }
                Some(event)
            }
            None => {
                self.events_rx = None;
                if self.exit_reported {
                    None
                } else {
                    self.exit_reported = true;
                    Some(ChannelEvent::Exit(ExitStatus::Missing))
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.record(|record| record.closed = true);
        let _ = self.stdin_tx.send(StdinMsg::Eof);
        self.pending = None;
        self.events_rx = None;
        Ok(())
    }
}

struct MockStdin {
    tx: mpsc::UnboundedSender<StdinMsg>,
    shared: Arc<Shared>,
    index: usize,
}

impl AsyncWrite for MockStdin {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if self.shared.fails(MockFailure::StdinWrite) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin write failed")));
        }
        if self.tx.send(StdinMsg::Data(Bytes::copy_from_slice(buf))).is_err() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "remote closed stdin")));
        }
        if let Some(record) = self.shared.log().channels.get_mut(self.index) {
            record.stdin.extend_from_slice(buf);
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// The remote side of one executed command
pub struct RemoteProcess {
    /// Command line as executed
    pub command: String,
    /// Pty requested before exec
    pub pty: Option<PtyRequest>,
    stdin: mpsc::UnboundedReceiver<StdinMsg>,
    buffered: BytesMut,
    eof: bool,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl RemoteProcess {
    /// Emit an event. Ignored once the local side closed the channel.
    pub fn send(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    /// Write to stdout
    pub fn stdout(&self, data: impl Into<Bytes>) {
        self.send(ChannelEvent::Stdout(data.into()));
    }

    /// Write to stderr
    pub fn stderr(&self, data: impl Into<Bytes>) {
        self.send(ChannelEvent::Stderr(data.into()));
    }

    /// Report an exit code and end the process
    pub fn exit(self, code: u32) {
        self.send(ChannelEvent::Exit(ExitStatus::Code(code)));
    }

    async fn fill(&mut self) -> bool {
        if self.eof {
            return false;
        }
        match self.stdin.recv().await {
            Some(StdinMsg::Data(data)) => {
                self.buffered.extend_from_slice(&data);
                true
            }
            Some(StdinMsg::Eof) | None => {
                self.eof = true;
                false
            }
        }
    }

    /// Read exactly `n` bytes, `None` if input ends first
    pub async fn read_exact(&mut self, n: usize) -> Option<Bytes> {
        while self.buffered.len() < n {
            if !self.fill().await {
                return None;
            }
        }
        Some(self.buffered.split_to(n).freeze())
    }

    /// Read through the next `\n`, `None` if input ends first
    pub async fn read_line(&mut self) -> Option<Bytes> {
        loop {
            if let Some(pos) = self.buffered.iter().position(|b| *b == b'\n') {
                return Some(self.buffered.split_to(pos + 1).freeze());
            }
            if !self.fill().await {
                return None;
            }
        }
    }

    /// Read until EOF
    pub async fn read_to_end(&mut self) -> Bytes {
        while self.fill().await {}
        self.buffered.split().freeze()
    }
}
