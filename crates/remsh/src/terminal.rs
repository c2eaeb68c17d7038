//! Local terminal control for attached runs
//!
//! Raw mode is process-global state. [`RawModeGuard`] turns it on and
//! guarantees it is turned off again exactly once, whether the run finishes,
//! fails or unwinds.

use std::io::{self, IsTerminal, Read};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::exec::BoxedReader;

/// Access to the terminal the process is attached to
pub trait Terminal: Send + Sync {
    /// Whether standard input is an interactive terminal
    fn is_terminal(&self) -> bool;

    /// Switch the terminal to raw mode
    fn enable_raw_mode(&self) -> io::Result<()>;

    /// Return the terminal to cooked mode
    fn disable_raw_mode(&self) -> io::Result<()>;

    /// Current size as `(columns, rows)`
    fn size(&self) -> io::Result<(u16, u16)>;

    /// Reader over the process's standard input
    fn input(&self) -> BoxedReader;
}

/// The controlling terminal of this process
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTerminal;

impl Terminal for LocalTerminal {
    fn is_terminal(&self) -> bool {
        io::stdin().is_terminal()
    }

    fn enable_raw_mode(&self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()
    }

    fn disable_raw_mode(&self) -> io::Result<()> {
        crossterm::terminal::disable_raw_mode()
    }

    fn size(&self) -> io::Result<(u16, u16)> {
        crossterm::terminal::size()
    }

    /// Standard input is read on a detached thread, since a blocking read
    /// cannot be interrupted. Once the reader is dropped the thread exits
    /// after its next read returns, discarding what that read produced.
    fn input(&self) -> BoxedReader {
        let (tx, rx) = mpsc::channel(16);
        let spawned = std::thread::Builder::new()
            .name("remsh-stdin".to_string())
            .spawn(move || read_stdin(tx));
        if let Err(e) = spawned {
            error!(error = %e, "failed to start stdin reader");
        }
        Box::new(ChunkReader {
            rx,
            pending: Bytes::new(),
        })
    }
}

fn read_stdin(tx: mpsc::Sender<io::Result<Bytes>>) {
    let mut stdin = io::stdin();
    let mut buf = [0u8; 8192];
    loop {
        let chunk = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };
        let failed = chunk.is_err();
        if tx.blocking_send(chunk).is_err() || failed {
            break;
        }
    }
    debug!("stdin reader finished");
}

struct ChunkReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    pending: Bytes,
}

impl AsyncRead for ChunkReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending[..n]);
                this.pending.advance(n);
                return Poll::Ready(Ok(()));
            }
            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => this.pending = chunk,
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

/// Keeps a terminal in raw mode while alive
pub struct RawModeGuard<'a> {
    terminal: &'a dyn Terminal,
    active: bool,
}

impl<'a> RawModeGuard<'a> {
    /// Enable raw mode on `terminal`
    pub fn acquire(terminal: &'a dyn Terminal) -> io::Result<Self> {
        terminal.enable_raw_mode()?;
        debug!("raw mode enabled");
        Ok(Self { terminal, active: true })
    }

    /// Restore the terminal now and report the outcome
    pub fn restore(mut self) -> io::Result<()> {
        self.active = false;
        let result = self.terminal.disable_raw_mode();
        debug!("raw mode disabled");
        result
    }
}

impl Drop for RawModeGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            if let Err(e) = self.terminal.disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::Terminal;
    use crate::exec::BoxedReader;

    /// Terminal double counting mode switches
    #[derive(Default)]
    pub struct FakeTerminal {
        pub interactive: bool,
        pub size: (u16, u16),
        pub fail_raw_mode: bool,
        pub fail_size: bool,
        pub typed: Vec<u8>,
        pub raw: AtomicBool,
        pub enabled: AtomicUsize,
        pub restored: AtomicUsize,
        pub inputs: Mutex<usize>,
    }

    impl FakeTerminal {
        pub fn interactive(cols: u16, rows: u16) -> Self {
            Self {
                interactive: true,
                size: (cols, rows),
                ..Default::default()
            }
        }

        pub fn enabled(&self) -> usize {
            self.enabled.load(Ordering::SeqCst)
        }

        pub fn restored(&self) -> usize {
            self.restored.load(Ordering::SeqCst)
        }
    }

    impl Terminal for FakeTerminal {
        fn is_terminal(&self) -> bool {
            self.interactive
        }

        fn enable_raw_mode(&self) -> io::Result<()> {
            if self.fail_raw_mode {
                return Err(io::Error::new(io::ErrorKind::Unsupported, "raw mode unavailable"));
            }
            self.raw.store(true, Ordering::SeqCst);
            self.enabled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn disable_raw_mode(&self) -> io::Result<()> {
            self.raw.store(false, Ordering::SeqCst);
            self.restored.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn size(&self) -> io::Result<(u16, u16)> {
            if self.fail_size {
                return Err(io::Error::new(io::ErrorKind::Other, "no size"));
            }
            Ok(self.size)
        }

        fn input(&self) -> BoxedReader {
            *self.inputs.lock().unwrap() += 1;
            Box::new(io::Cursor::new(self.typed.clone()))
        }
    }
}
