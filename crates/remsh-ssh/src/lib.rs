//! # remsh SSH Transport
//!
//! SSH capability layer for remsh: the traits the session layer drives,
//! credential resolution, endpoint and host-key configuration, and the
//! `russh` backed implementation.

#![warn(missing_docs)]

/// Transport, connection and channel abstractions
pub mod transport;

/// Endpoint and client configuration
pub mod config;

/// Credential resolution
pub mod auth;

/// `russh` backed transport
pub mod client;

/// Scripted in-memory transport
#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// SSH-specific error types
pub mod error;

pub use auth::{AuthMethod, AuthMode};
pub use client::{RusshChannel, RusshConnection, RusshTransport};
pub use config::{Endpoint, HostKeyPolicy, SshConfig, DEFAULT_PORT};
pub use error::TransportError;
pub use transport::{
    ChannelEvent, CommandChannel, Connection, ExitStatus, PtyRequest, StdinPipe, TerminalMode,
    TerminalModes, Transport,
};
