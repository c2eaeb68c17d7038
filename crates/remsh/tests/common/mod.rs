//! Shared helpers for remsh integration tests
//!
//! [`FakeSink`] plays an `scp -t` receiver on top of the mock transport and
//! checks the stream byte for byte, the way OpenSSH's sink does.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use remsh::proto::{Ack, FileHeader};
use remsh::ssh::mock::{MockTransport, RemoteProcess};
use remsh::Credentials;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Credentials accepted by the mock transport in password mode
pub fn credentials() -> Credentials {
    Credentials::new("mock.example:2222", "deploy", "hunter2")
}

/// How the fake receiver ends a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBehavior {
    /// Complains about the trailing newline and exits with 1, like OpenSSH
    Standard,
    /// Exits with 0 after the terminator
    Clean,
    /// Refuses the header with a fatal error
    RejectHeader,
    /// Stores the file, then exits with 2
    CrashAfterStore,
    /// Sends the ready ack, then drains stdin and exits with 1 without
    /// storing anything
    ReadOnly,
}

/// One file the sink stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Receiver command line
    pub command: String,
    /// Parsed header
    pub header: FileHeader,
    /// Payload bytes
    pub content: Vec<u8>,
}

/// Scripted `scp -t` receiver
#[derive(Clone)]
pub struct FakeSink {
    behavior: SinkBehavior,
    received: Arc<Mutex<Vec<ReceivedFile>>>,
}

impl FakeSink {
    pub fn new(behavior: SinkBehavior) -> Self {
        Self {
            behavior,
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Transport running this sink for every command
    pub fn transport(&self) -> MockTransport {
        let sink = self.clone();
        MockTransport::new(move |process: RemoteProcess| {
            let sink = sink.clone();
            async move { sink.serve(process).await }
        })
    }

    /// Files stored so far, in arrival order
    pub fn received(&self) -> Vec<ReceivedFile> {
        self.received.lock().unwrap().clone()
    }

    async fn serve(&self, mut process: RemoteProcess) {
        process.stdout(Ack::Ok.to_bytes());

        if self.behavior == SinkBehavior::ReadOnly {
            let stream = process.read_to_end().await;
            let name = stream[..]
                .split(|b| *b == b'\n')
                .next()
                .and_then(|line| FileHeader::parse(line).ok())
                .map(|header| header.name)
                .unwrap_or_default();
            let dir = process.command.rsplit(' ').next().unwrap_or(".").to_string();
            process.stderr(format!("scp: {}/{}: Read-only file system\n", dir, name));
            process.exit(1);
            return;
        }

        let Some(line) = process.read_line().await else {
            process.exit(1);
            return;
        };
        let header = match FileHeader::parse(&line) {
            Ok(header) => header,
            Err(e) => {
                process.stdout(Ack::Error(format!("scp: {}", e)).to_bytes());
                process.exit(1);
                return;
            }
        };
        if self.behavior == SinkBehavior::RejectHeader {
            process.stdout(Ack::Error(format!("scp: {}: Permission denied", header.name)).to_bytes());
            process.exit(1);
            return;
        }
        process.stdout(Ack::Ok.to_bytes());

        let Some(content) = process.read_exact(header.size as usize).await else {
            process.exit(1);
            return;
        };
        match process.read_exact(1).await {
            Some(status) if &status[..] == b"\x00" => {}
            _ => {
                process.stdout(Ack::Error("scp: lost connection".to_string()).to_bytes());
                process.exit(1);
                return;
            }
        }
        self.received.lock().unwrap().push(ReceivedFile {
            command: process.command.clone(),
            header,
            content: content.to_vec(),
        });
        process.stdout(Ack::Ok.to_bytes());

        match self.behavior {
            SinkBehavior::CrashAfterStore => {
                process.stderr("scp: out of memory\n");
                process.exit(2);
            }
            SinkBehavior::Clean => {
                process.read_to_end().await;
                process.exit(0);
            }
            _ => match process.read_line().await {
                Some(line) if line[..] == b"\n"[..] => {
                    process.stdout(Ack::Warning("scp: protocol error: unexpected <newline>".to_string()).to_bytes());
                    process.exit(1);
                }
                Some(_) => {
                    process.stdout(Ack::Error("scp: unexpected record".to_string()).to_bytes());
                    process.exit(1);
                }
                None => process.exit(0),
            },
        }
    }
}
