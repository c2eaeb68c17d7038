//! # remsh Protocol
//!
//! Framing for the `scp` sink protocol used to push single files onto a
//! remote host: the `C` header line, the payload and terminator, and the
//! acknowledgement bytes the receiver writes back.

#![warn(missing_docs)]

/// File header framing
pub mod header;

/// Receiver acknowledgement decoding
pub mod ack;

/// Streaming a file into a receiver
pub mod codec;

/// Remote path helpers and receiver command lines
pub mod path;

/// Error types for protocol operations
pub mod error;

pub use ack::{Ack, AckDecoder};
pub use codec::{send_file, END_OF_FILE};
pub use error::ProtocolError;
pub use header::{FileHeader, DEFAULT_MODE};
pub use path::{receiver_command, remote_base_name, remote_dir};
