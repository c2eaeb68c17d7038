//! Error types for remsh operations

use std::convert::Infallible;
use std::io;

use remsh_proto::ProtocolError;
use remsh_ssh::{ExitStatus, TransportError};
use thiserror::Error;

/// Main error type for remsh operations
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// File stream could not be written
    #[error("Transfer failed: {0}")]
    Transfer(#[from] ProtocolError),

    /// Transfer descriptor names neither a path nor in-memory content
    #[error("No source for {destination}: set a local path or in-memory content")]
    MissingSource {
        /// Remote destination of the descriptor
        destination: String,
    },

    /// A session handle runs a single command
    #[error("Session already ran a command")]
    SessionUsed,

    /// Remote command ended unsuccessfully
    #[error("{status}{}", detail_suffix(.detail))]
    Remote {
        /// How the command ended
        status: ExitStatus,
        /// Error text reported by the remote side
        detail: Option<String>,
    },

    /// Command failed after producing output
    #[error("{source}")]
    Command {
        /// Combined stdout and stderr captured before the failure
        output: Vec<u8>,
        /// Failure
        #[source]
        source: Box<Error>,
    },

    /// Local terminal could not be configured
    #[error("Terminal error: {0}")]
    Terminal(#[source] io::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error annotated with the step that produced it
    #[error("{context}: {source}")]
    Context {
        /// Step description
        context: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) if !detail.is_empty() => format!(": {}", detail),
        _ => String::new(),
    }
}

impl Error {
    /// Wrap with a step description
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error below any context wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Output captured by a failed command, if any
    pub fn output(&self) -> Option<&[u8]> {
        match self.root() {
            Error::Command { output, .. } => Some(output.as_slice()),
            _ => None,
        }
    }

    /// Remote exit status behind this error, if any
    pub fn exit_status(&self) -> Option<&ExitStatus> {
        match self.root() {
            Error::Remote { status, .. } => Some(status),
            Error::Command { source, .. } => source.exit_status(),
            _ => None,
        }
    }
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Attach step descriptions to fallible results
pub trait ResultExt<T> {
    /// Wrap the error with `context`
    fn context(self, context: impl Into<String>) -> crate::Result<T>;

    /// Wrap the error with a lazily built context
    fn with_context<F>(self, f: F) -> crate::Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, context: impl Into<String>) -> crate::Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F>(self, f: F) -> crate::Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().context(f()))
    }
}
