//! # remsh
//!
//! Remote command execution and file delivery over SSH.
//!
//! A [`SessionHandle`] bundles one authenticated connection with one command
//! channel. Commands run either collecting their combined output or attached
//! to local streams through a pseudo-terminal, and files are pushed with the
//! `scp` sink protocol. [`Client`] and the free functions in [`ops`] wrap the
//! whole connect, run and close cycle.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use remsh_proto as proto;
pub use remsh_ssh as ssh;

/// Error types for remsh operations
pub mod error;

/// Session management and connection handling
pub mod session;

/// Command execution
pub mod exec;

/// Local terminal control
pub mod terminal;

/// File push pipeline
pub mod push;

/// One-shot operations
pub mod ops;

/// Local exit-code convention
pub mod process;

pub use error::{Error, ResultExt};
pub use exec::{BoxedReader, BoxedWriter, Input, Output, Stdio};
pub use ops::{push_files, remote_attach_and_run, remote_run, Client};
pub use process::{exit_code, STATUS_UNAVAILABLE};
pub use push::{push, Completion, FileTransfer, PushConfig, Pusher, TransferSource, DEFAULT_RECEIVER};
pub use session::{Credentials, SessionHandle};
pub use terminal::{LocalTerminal, RawModeGuard, Terminal};

/// Result type alias for remsh operations
pub type Result<T> = std::result::Result<T, Error>;
