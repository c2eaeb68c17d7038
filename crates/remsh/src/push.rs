//! File push over the `scp` sink protocol
//!
//! Each file gets its own session: the receiver is started with
//! `<receiver> -qt <dir>` and a writer task streams the header, the payload
//! and the terminator into its stdin while the control flow collects the
//! receiver's acknowledgements and exit status.
//!
//! The terminator makes a standard sink complain about an unexpected newline
//! and exit with status 1 after the file has been stored. That exit is a
//! *soft* failure: it is accepted once the receiver has acknowledged the
//! payload, or when the receiver said nothing at all. A status 1 that follows
//! an unacknowledged payload or error text on stderr is fatal.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use remsh_proto::{receiver_command, remote_base_name, remote_dir, send_file, Ack, AckDecoder, FileHeader, ProtocolError, DEFAULT_MODE};
use remsh_ssh::{AuthMode, ChannelEvent, CommandChannel, ExitStatus, Transport};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::error::ResultExt;
use crate::exec::BoxedReader;
use crate::{Credentials, Error, Result, SessionHandle};

/// Receiver started on the remote host
pub const DEFAULT_RECEIVER: &str = "/usr/bin/scp";

/// Successful acknowledgements a sink sends up to and including the one
/// confirming the payload: ready, header accepted, data stored.
const PAYLOAD_CONFIRMED: usize = 3;

/// How long the writer may lag behind the receiver's exit
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Push configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Receiver program on the remote host
    pub receiver: String,
    /// Permission bits announced for every file
    pub mode: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            receiver: DEFAULT_RECEIVER.to_string(),
            mode: DEFAULT_MODE,
        }
    }
}

/// Content of a file to push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferSource {
    /// Local file, streamed
    Path(PathBuf),
    /// In-memory content
    Bytes(Bytes),
}

impl TransferSource {
    async fn open(&self) -> io::Result<(BoxedReader, u64)> {
        match self {
            TransferSource::Path(path) => {
                let file = tokio::fs::File::open(path).await?;
                let metadata = file.metadata().await?;
                if !metadata.is_file() {
                    return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
                }
                Ok((Box::new(file), metadata.len()))
            }
            TransferSource::Bytes(content) => Ok((Box::new(io::Cursor::new(content.clone())), content.len() as u64)),
        }
    }
}

impl fmt::Display for TransferSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferSource::Path(path) => write!(f, "{}", path.display()),
            TransferSource::Bytes(content) => write!(f, "<{} bytes in memory>", content.len()),
        }
    }
}

/// One file to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    /// Content
    pub source: TransferSource,
    /// Full remote path
    pub destination: String,
}

impl FileTransfer {
    /// Push the local file at `path`
    pub fn from_path(path: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: TransferSource::Path(path.into()),
            destination: destination.into(),
        }
    }

    /// Push in-memory content
    pub fn from_bytes(content: impl Into<Bytes>, destination: impl Into<String>) -> Self {
        Self {
            source: TransferSource::Bytes(content.into()),
            destination: destination.into(),
        }
    }

    /// Build from two optional sources. The path wins when both are set.
    pub fn from_parts(path: Option<PathBuf>, content: Option<Bytes>, destination: impl Into<String>) -> Result<Self> {
        let destination = destination.into();
        match (path, content) {
            (Some(path), _) => Ok(Self::from_path(path, destination)),
            (None, Some(content)) => Ok(Self::from_bytes(content, destination)),
            (None, None) => Err(Error::MissingSource { destination }),
        }
    }
}

/// How a file transfer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Receiver exited with status 0
    Clean,
    /// Receiver exited with status 1 after accepting the file, or without
    /// any output at all
    SoftExit,
}

#[derive(Debug)]
enum WriterOutcome {
    Finished(u64),
    Failed(ProtocolError),
    Interrupted,
}

impl From<std::result::Result<std::result::Result<u64, ProtocolError>, JoinError>> for WriterOutcome {
    fn from(joined: std::result::Result<std::result::Result<u64, ProtocolError>, JoinError>) -> Self {
        match joined {
            Ok(Ok(written)) => WriterOutcome::Finished(written),
            Ok(Err(e)) => WriterOutcome::Failed(e),
            Err(e) => WriterOutcome::Failed(ProtocolError::Io(io::Error::other(e))),
        }
    }
}

/// What the receiver said while the file was streamed
#[derive(Debug, Default)]
struct ReceiverReport {
    decoder: AckDecoder,
    confirmed: usize,
    early_failure: Option<String>,
    last_message: Option<String>,
    stderr: Vec<u8>,
    saw_output: bool,
}

impl ReceiverReport {
    fn feed(&mut self, data: &[u8]) {
        self.saw_output |= !data.is_empty();
        self.decoder.push(data);
        loop {
            match self.decoder.next_ack() {
                Ok(Some(Ack::Ok)) => self.confirmed += 1,
                Ok(Some(ack)) => {
                    let message = ack.message().unwrap_or_default().to_string();
                    if self.confirmed < PAYLOAD_CONFIRMED && self.early_failure.is_none() {
                        debug!(confirmed = self.confirmed, %message, "receiver rejected the transfer");
                        self.early_failure = Some(message.clone());
                    } else {
                        debug!(confirmed = self.confirmed, %message, "receiver message after payload");
                    }
                    self.last_message = Some(message);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "undecodable receiver output");
                    break;
                }
            }
        }
    }

    fn detail(&self) -> Option<String> {
        if let Some(message) = &self.early_failure {
            return Some(message.clone());
        }
        let stderr = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if !stderr.is_empty() {
            return Some(stderr);
        }
        self.last_message.clone()
    }

    /// Whether a status 1 exit still means the file was delivered
    fn soft_exit(&self) -> bool {
        if self.confirmed >= PAYLOAD_CONFIRMED {
            return true;
        }
        !self.saw_output && String::from_utf8_lossy(&self.stderr).trim().is_empty()
    }
}

fn classify(status: ExitStatus, report: &ReceiverReport, writer: WriterOutcome) -> Result<Completion> {
    if let Some(message) = &report.early_failure {
        return Err(Error::Remote {
            status,
            detail: Some(message.clone()),
        });
    }

    match writer {
        WriterOutcome::Failed(e) => return Err(Error::Transfer(e).context("write file stream")),
        WriterOutcome::Interrupted if report.confirmed < PAYLOAD_CONFIRMED => {
            return Err(Error::Remote {
                status,
                detail: Some(
                    report
                        .detail()
                        .unwrap_or_else(|| "receiver exited before acknowledging the file".to_string()),
                ),
            });
        }
        WriterOutcome::Interrupted | WriterOutcome::Finished(_) => {}
    }

    match status {
        ExitStatus::Code(0) => Ok(Completion::Clean),
        ExitStatus::Code(1) if report.soft_exit() => Ok(Completion::SoftExit),
        status => Err(Error::Remote {
            status,
            detail: report.detail(),
        }),
    }
}

fn file_header(size: u64, destination: &str, config: &PushConfig) -> Result<FileHeader> {
    let header = FileHeader::new(size, remote_base_name(destination)).with_mode(config.mode);
    header.validate()?;
    Ok(header)
}

impl<T: Transport> SessionHandle<T> {
    /// Stream `size` bytes from `reader` to `destination` through the
    /// receiver configured in `config`.
    pub async fn push_file<R>(
        &mut self,
        reader: R,
        size: u64,
        destination: &str,
        config: &PushConfig,
    ) -> Result<Completion>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.begin_command()?;
        let header = file_header(size, destination, config)?;
        let command = receiver_command(&config.receiver, &remote_dir(destination));
        debug!(session = %self.id(), %command, %header, "starting receiver");

        let mut pipe = self.channel.stdin_pipe();
        self.channel.exec(&command).await.context("exec receiver")?;
        let mut writer = tokio::spawn(async move { send_file(&mut pipe, &header, reader).await });

        let mut report = ReceiverReport::default();
        let mut status = None;
        let mut outcome = None;

        loop {
            tokio::select! {
                joined = &mut writer, if outcome.is_none() => {
                    let finished = WriterOutcome::from(joined);
                    match &finished {
                        WriterOutcome::Finished(written) => {
                            debug!(session = %self.id(), written, "file stream written");
                            if let Err(e) = self.channel.close_stdin().await {
                                debug!(session = %self.id(), error = %e, "closing receiver stdin");
                            }
                        }
                        other => {
                            warn!(session = %self.id(), outcome = ?other, "file stream failed");
                            if let Err(e) = self.channel.close().await {
                                debug!(session = %self.id(), error = %e, "closing channel");
                            }
                        }
                    }
                    outcome = Some(finished);
                }
                event = self.channel.next_event() => match event {
                    Some(ChannelEvent::Stdout(data)) => report.feed(&data),
                    Some(ChannelEvent::Stderr(data)) => report.stderr.extend_from_slice(&data),
                    Some(ChannelEvent::Exit(exit)) => status = Some(exit),
                    None => break,
                },
            }
        }

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => match tokio::time::timeout(WRITER_GRACE, &mut writer).await {
                Ok(joined) => WriterOutcome::from(joined),
                Err(_) => {
                    writer.abort();
                    WriterOutcome::Interrupted
                }
            },
        };

        let status = status.unwrap_or(ExitStatus::Missing);
        debug!(session = %self.id(), %status, confirmed = report.confirmed, "receiver finished");
        classify(status, &report, outcome)
    }
}

/// Pushes files one session at a time
pub struct Pusher<'a, T: Transport> {
    transport: &'a T,
    credentials: &'a Credentials,
    mode: AuthMode,
    config: &'a PushConfig,
}

impl<'a, T: Transport> Pusher<'a, T> {
    /// Create a pusher
    pub fn new(transport: &'a T, credentials: &'a Credentials, mode: AuthMode, config: &'a PushConfig) -> Self {
        Self {
            transport,
            credentials,
            mode,
            config,
        }
    }

    /// Push `files` in order, stopping at the first failure.
    ///
    /// Files already delivered stay on the remote host.
    pub async fn push(&self, files: &[FileTransfer]) -> Result<()> {
        for file in files {
            self.push_one(file)
                .await
                .with_context(|| format!("push {}", file.destination))?;
        }
        Ok(())
    }

    /// Push a single file over a fresh session
    pub async fn push_one(&self, file: &FileTransfer) -> Result<Completion> {
        let (reader, size) = file
            .source
            .open()
            .await
            .with_context(|| format!("open {}", file.source))?;
        file_header(size, &file.destination, self.config)?;

        let mut session = SessionHandle::connect(self.transport, self.credentials, self.mode)
            .await
            .context("remote session")?;
        let result = session.push_file(reader, size, &file.destination, self.config).await;
        if let Err(e) = session.close().await {
            warn!(destination = %file.destination, error = %e, "failed to close session");
        }

        match &result {
            Ok(Completion::Clean) => info!(destination = %file.destination, size, "pushed file"),
            Ok(Completion::SoftExit) => {
                info!(destination = %file.destination, size, "pushed file");
                debug!(destination = %file.destination, "receiver exited with status 1 after accepting the file");
            }
            Err(e) => warn!(destination = %file.destination, error = %e, "push failed"),
        }
        result
    }
}

/// Push `files` with key-file authentication and the default receiver
pub async fn push<T: Transport>(transport: &T, credentials: &Credentials, files: &[FileTransfer]) -> Result<()> {
    let config = PushConfig::default();
    Pusher::new(transport, credentials, AuthMode::PublicKeyFile, &config)
        .push(files)
        .await
}
