//! SSH-specific error types

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Transport-specific errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Authentication mode tag not recognised
    #[error("Unsupported authentication mode: {0}")]
    UnsupportedAuthMode(String),

    /// Private key file could not be read
    #[error("Failed to read private key {}: {source}", .path.display())]
    KeyRead {
        /// Key file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Private key file is not a usable key
    #[error("Failed to parse private key {}: {reason}", .path.display())]
    KeyParse {
        /// Key file path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Address is not `host[:port]`
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// SSH connection error
    #[error("SSH connection error: {0}")]
    Connection(String),

    /// Connection attempt exceeded the configured bound
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Server host key failed verification
    #[error("Host key rejected for {0}")]
    HostKeyRejected(String),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Session channel error
    #[error("Channel error: {0}")]
    Channel(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error raised by the SSH client library
    #[error("SSH protocol error: {0}")]
    Ssh(#[from] russh::Error),
}
