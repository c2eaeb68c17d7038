//! Error types for protocol operations

use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Header line could not be parsed
    #[error("Invalid file header: {0}")]
    InvalidHeader(String),

    /// Target name the receiver would refuse
    #[error("Invalid target name: {0:?}")]
    InvalidName(String),

    /// Permission bits outside of `0o7777`
    #[error("Invalid file mode: {0:o}")]
    InvalidMode(u32),

    /// Source ended before the announced size was sent
    #[error("Source ended early: announced {expected} bytes, read {actual}")]
    ShortSource {
        /// Size written into the header
        expected: u64,
        /// Bytes actually copied
        actual: u64,
    },

    /// Leading byte is not a known acknowledgement code
    #[error("Invalid acknowledgement byte: {0:#04x}")]
    InvalidAck(u8),

    /// I/O failure on the receiver stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
