//! Command execution on a session handle
//!
//! [`SessionHandle::run`] collects combined output; [`SessionHandle::run_attached`]
//! wires the remote command to local streams through a pseudo-terminal.

use std::fmt;
use std::io;
use std::sync::Arc;

use remsh_ssh::{ChannelEvent, CommandChannel, ExitStatus, PtyRequest, Transport};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ResultExt;
use crate::terminal::{LocalTerminal, RawModeGuard, Terminal};
use crate::{Error, Result, SessionHandle};

/// Boxed input stream
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed output stream
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where the remote command's input comes from
pub enum Input {
    /// The process's standard input
    Inherit,
    /// A caller supplied reader, never treated as a terminal
    Reader(BoxedReader),
}

/// Where remote output goes
pub enum Output {
    /// The process's own stdout or stderr
    Inherit,
    /// A caller supplied writer
    Writer(BoxedWriter),
}

/// Local stream bindings for an attached run
pub struct Stdio {
    stdin: Input,
    stdout: Output,
    stderr: Output,
    terminal: Arc<dyn Terminal>,
}

impl Stdio {
    /// Bind all three streams to the process's own.
    ///
    /// Inherited input is read by a thread that blocks on stdin and outlives
    /// the run: after [`SessionHandle::run_attached`] returns, the next chunk
    /// typed is consumed by that thread and dropped. A second attached run in
    /// the same process therefore loses its first chunk of input. Pass
    /// [`Stdio::stdin`] when commands are run back to back.
    pub fn inherit() -> Self {
        Self {
            stdin: Input::Inherit,
            stdout: Output::Inherit,
            stderr: Output::Inherit,
            terminal: Arc::new(LocalTerminal),
        }
    }

    /// Read input from `reader`
    pub fn stdin<R>(mut self, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.stdin = Input::Reader(Box::new(reader));
        self
    }

    /// Write remote stdout to `writer`
    pub fn stdout<W>(mut self, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.stdout = Output::Writer(Box::new(writer));
        self
    }

    /// Write remote stderr to `writer`
    pub fn stderr<W>(mut self, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.stderr = Output::Writer(Box::new(writer));
        self
    }

    /// Use `terminal` for raw mode, size and inherited input
    pub fn terminal(mut self, terminal: Arc<dyn Terminal>) -> Self {
        self.terminal = terminal;
        self
    }
}

impl Default for Stdio {
    fn default() -> Self {
        Self::inherit()
    }
}

impl fmt::Debug for Stdio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input = match self.stdin {
            Input::Inherit => "inherit",
            Input::Reader(_) => "reader",
        };
        let output = |o: &Output| match o {
            Output::Inherit => "inherit",
            Output::Writer(_) => "writer",
        };
        f.debug_struct("Stdio")
            .field("stdin", &input)
            .field("stdout", &output(&self.stdout))
            .field("stderr", &output(&self.stderr))
            .finish()
    }
}

fn exit_result(status: Option<ExitStatus>) -> std::result::Result<(), ExitStatus> {
    match status.unwrap_or(ExitStatus::Missing) {
        status if status.success() => Ok(()),
        status => Err(status),
    }
}

impl<T: Transport> SessionHandle<T> {
    /// Run `command` and return stdout and stderr interleaved in arrival order.
    ///
    /// On a non-zero exit, a signal or a missing exit status the captured
    /// output travels with the error, see [`Error::output`].
    pub async fn run(&mut self, command: &str) -> Result<Vec<u8>> {
        self.begin_command()?;
        debug!(session = %self.id(), command, "run");

        self.channel.exec(command).await.context("exec")?;
        if let Err(e) = self.channel.close_stdin().await {
            debug!(session = %self.id(), error = %e, "closing stdin");
        }

        let mut output = Vec::new();
        let mut status = None;
        while let Some(event) = self.channel.next_event().await {
            match event {
                ChannelEvent::Stdout(data) | ChannelEvent::Stderr(data) => output.extend_from_slice(&data),
                ChannelEvent::Exit(exit) => status = Some(exit),
            }
        }

        match exit_result(status) {
            Ok(()) => Ok(output),
            Err(status) => {
                debug!(session = %self.id(), %status, bytes = output.len(), "command failed");
                Err(Error::Command {
                    output,
                    source: Box::new(Error::Remote { status, detail: None }),
                })
            }
        }
    }

    /// Run `command` attached to local streams.
    ///
    /// When input is inherited and is a terminal, the terminal is put in raw
    /// mode for the duration of the run and a pty of the same size is
    /// requested. Otherwise an 80x24 `vt100` pty is requested.
    pub async fn run_attached(&mut self, command: &str, stdio: Stdio) -> Result<()> {
        self.begin_command()?;
        let Stdio {
            stdin,
            stdout,
            stderr,
            terminal,
        } = stdio;
        let interactive = matches!(stdin, Input::Inherit) && terminal.is_terminal();

        let guard = if interactive {
            let guard = RawModeGuard::acquire(terminal.as_ref())
                .map_err(Error::Terminal)
                .context("enable raw mode")?;
            Some(guard)
        } else {
            None
        };
        let pty = if interactive {
            let (cols, rows) = terminal
                .size()
                .map_err(Error::Terminal)
                .context("query terminal size")?;
            PtyRequest::interactive(cols.into(), rows.into())
        } else {
            PtyRequest::redirected()
        };

        debug!(session = %self.id(), command, term = %pty.term, cols = pty.cols, rows = pty.rows, "run attached");
        self.channel.request_pty(&pty).await.context("request pty")?;
        self.channel.exec(command).await.context("exec")?;

        let mut input = match stdin {
            Input::Inherit => terminal.input(),
            Input::Reader(reader) => reader,
        };
        let mut pipe = self.channel.stdin_pipe();
        let mut forwarder = tokio::spawn(async move {
            let copied = tokio::io::copy(&mut input, &mut pipe).await?;
            pipe.flush().await?;
            Ok::<u64, io::Error>(copied)
        });

        let mut stdout = match stdout {
            Output::Inherit => Box::new(tokio::io::stdout()) as BoxedWriter,
            Output::Writer(writer) => writer,
        };
        let mut stderr = match stderr {
            Output::Inherit => Box::new(tokio::io::stderr()) as BoxedWriter,
            Output::Writer(writer) => writer,
        };

        let result = self.pump(&mut forwarder, &mut stdout, &mut stderr).await;
        if !forwarder.is_finished() {
            forwarder.abort();
        }
        if let Some(guard) = guard {
            if let Err(e) = guard.restore() {
                warn!(session = %self.id(), error = %e, "failed to restore terminal mode");
            }
        }
        result.context("run")
    }

    async fn pump(
        &mut self,
        forwarder: &mut JoinHandle<io::Result<u64>>,
        stdout: &mut BoxedWriter,
        stderr: &mut BoxedWriter,
    ) -> Result<()> {
        let mut forwarding = true;
        let mut status = None;

        loop {
            tokio::select! {
                joined = &mut *forwarder, if forwarding => {
                    forwarding = false;
                    match joined {
                        Ok(Ok(copied)) => debug!(session = %self.id(), copied, "local input finished"),
                        Ok(Err(e)) => warn!(session = %self.id(), error = %e, "forwarding local input failed"),
                        Err(e) => warn!(session = %self.id(), error = %e, "input forwarder stopped"),
                    }
                    if let Err(e) = self.channel.close_stdin().await {
                        debug!(session = %self.id(), error = %e, "closing stdin");
                    }
                }
                event = self.channel.next_event() => match event {
                    Some(ChannelEvent::Stdout(data)) => {
                        stdout.write_all(&data).await?;
                        stdout.flush().await?;
                    }
                    Some(ChannelEvent::Stderr(data)) => {
                        stderr.write_all(&data).await?;
                        stderr.flush().await?;
                    }
                    Some(ChannelEvent::Exit(exit)) => status = Some(exit),
                    None => break,
                },
            }
        }

        exit_result(status).map_err(|status| Error::Remote { status, detail: None })
    }
}
