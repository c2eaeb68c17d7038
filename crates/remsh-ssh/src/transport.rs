//! Transport, connection and channel abstractions
//!
//! The session layer only talks to these traits. [`crate::RusshTransport`]
//! implements them over a real SSH connection, the `mock` module over
//! in-memory queues.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWrite;

use crate::{AuthMethod, Endpoint, TransportError};

/// Owned writer feeding a channel's standard input
pub type StdinPipe = Pin<Box<dyn AsyncWrite + Send>>;

/// Dials and authenticates connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connection type produced by this transport
    type Connection: Connection;

    /// Dial `endpoint`, verify the host key and authenticate as `user`
    async fn connect(
        &self,
        endpoint: &Endpoint,
        user: &str,
        auth: &AuthMethod,
    ) -> Result<Self::Connection, TransportError>;
}

/// An authenticated connection able to open command channels
#[async_trait]
pub trait Connection: Send + Sync {
    /// Channel type produced by this connection
    type Channel: CommandChannel;

    /// Open a session channel
    async fn open_channel(&self) -> Result<Self::Channel, TransportError>;

    /// Disconnect
    async fn close(&self) -> Result<(), TransportError>;
}

/// A session channel that runs exactly one command
#[async_trait]
pub trait CommandChannel: Send {
    /// Ask the server for a pseudo-terminal. Must precede [`exec`](Self::exec).
    async fn request_pty(&mut self, pty: &PtyRequest) -> Result<(), TransportError>;

    /// Writer for the remote command's standard input.
    ///
    /// The pipe is independent of `self` so it can be moved into another task.
    fn stdin_pipe(&self) -> StdinPipe;

    /// Start `command` on the remote side
    async fn exec(&mut self, command: &str) -> Result<(), TransportError>;

    /// Signal end of input
    async fn close_stdin(&mut self) -> Result<(), TransportError>;

    /// Next output or exit event, `None` once the channel is closed.
    ///
    /// Cancel safe: dropping the future before it completes loses no event.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Close the channel
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Output and completion events of a running command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Bytes written to standard output
    Stdout(Bytes),
    /// Bytes written to standard error
    Stderr(Bytes),
    /// Command finished
    Exit(ExitStatus),
}

/// How a remote command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited with a status code
    Code(u32),
    /// Killed by a signal
    Signal {
        /// Signal name as reported by the server
        name: String,
        /// Whether a core was dumped
        core_dumped: bool,
        /// Server supplied message, possibly empty
        message: String,
    },
    /// Channel closed without reporting a status
    Missing,
}

impl ExitStatus {
    /// Exited with status 0
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }

    /// Status code, if the command exited normally
    pub fn code(&self) -> Option<u32> {
        match self {
            ExitStatus::Code(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "Process exited with status {}", code),
            ExitStatus::Signal { name, message, .. } if message.is_empty() => {
                write!(f, "Process exited with signal {}", name)
            }
            ExitStatus::Signal { name, message, .. } => {
                write!(f, "Process exited with signal {}: {}", name, message)
            }
            ExitStatus::Missing => write!(f, "Process exited without reporting an exit status"),
        }
    }
}

/// Terminal mode opcodes sent with a pty request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalMode {
    /// Echo input characters
    Echo,
    /// Input baud rate
    InputSpeed,
    /// Output baud rate
    OutputSpeed,
}

impl TerminalMode {
    /// Opcode from RFC 4254 section 8
    pub fn opcode(self) -> u8 {
        match self {
            TerminalMode::Echo => 53,
            TerminalMode::InputSpeed => 128,
            TerminalMode::OutputSpeed => 129,
        }
    }
}

/// Ordered terminal mode settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TerminalModes(Vec<(TerminalMode, u32)>);

impl TerminalModes {
    /// Echo on, 14400 baud in both directions
    pub fn standard() -> Self {
        Self(vec![
            (TerminalMode::Echo, 1),
            (TerminalMode::InputSpeed, 14400),
            (TerminalMode::OutputSpeed, 14400),
        ])
    }

    /// Append a setting
    pub fn with(mut self, mode: TerminalMode, value: u32) -> Self {
        self.0.push((mode, value));
        self
    }

    /// Settings in request order
    pub fn iter(&self) -> impl Iterator<Item = (TerminalMode, u32)> + '_ {
        self.0.iter().copied()
    }

    /// Value set for `mode`
    pub fn get(&self, mode: TerminalMode) -> Option<u32> {
        self.0.iter().find(|(m, _)| *m == mode).map(|(_, v)| *v)
    }
}

/// Pseudo-terminal request parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// Terminal type
    pub term: String,
    /// Width in columns
    pub cols: u32,
    /// Height in rows
    pub rows: u32,
    /// Mode settings
    pub modes: TerminalModes,
}

impl PtyRequest {
    /// Terminal type used when attached to a local terminal
    pub const INTERACTIVE_TERM: &'static str = "xterm-256color";
    /// Terminal type used when input is redirected
    pub const REDIRECTED_TERM: &'static str = "vt100";
    /// Width used when input is redirected
    pub const DEFAULT_COLS: u32 = 80;
    /// Height used when input is redirected
    pub const DEFAULT_ROWS: u32 = 24;

    /// Request sized to the local terminal
    pub fn interactive(cols: u32, rows: u32) -> Self {
        Self {
            term: Self::INTERACTIVE_TERM.to_string(),
            cols,
            rows,
            modes: TerminalModes::standard(),
        }
    }

    /// Fixed 80x24 request for redirected input
    pub fn redirected() -> Self {
        Self {
            term: Self::REDIRECTED_TERM.to_string(),
            cols: Self::DEFAULT_COLS,
            rows: Self::DEFAULT_ROWS,
            modes: TerminalModes::standard(),
        }
    }
}
