//! One-shot operations
//!
//! Each operation opens a session, delegates to the executor or the push
//! pipeline, and closes the session before returning, whatever the outcome.

use remsh_ssh::{AuthMode, RusshTransport, Transport};
use tracing::warn;

use crate::error::ResultExt;
use crate::{Credentials, FileTransfer, PushConfig, Pusher, Result, SessionHandle, Stdio};

/// Entry point for remote operations over a transport
#[derive(Debug, Clone)]
pub struct Client<T: Transport> {
    transport: T,
    mode: AuthMode,
    push: PushConfig,
}

impl<T: Transport> Client<T> {
    /// Create a client authenticating with key files
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            mode: AuthMode::PublicKeyFile,
            push: PushConfig::default(),
        }
    }

    /// Interpret credential secrets according to `mode`
    pub fn with_auth_mode(mut self, mode: AuthMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use `config` for file pushes
    pub fn with_push_config(mut self, config: PushConfig) -> Self {
        self.push = config;
        self
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run `command` and return its combined output
    pub async fn run(&self, credentials: &Credentials, command: &str) -> Result<Vec<u8>> {
        let mut session = self.connect(credentials).await.context("run command")?;
        let result = session.run(command).await;
        finish(session, result).await.context("run command")
    }

    /// Run `command` attached to `stdio`
    pub async fn run_attached(&self, credentials: &Credentials, command: &str, stdio: Stdio) -> Result<()> {
        let mut session = self.connect(credentials).await.context("run attached")?;
        let result = session.run_attached(command, stdio).await;
        finish(session, result).await.context("run attached")
    }

    /// Push `files` in order, one session per file
    pub async fn push(&self, credentials: &Credentials, files: &[FileTransfer]) -> Result<()> {
        Pusher::new(&self.transport, credentials, self.mode, &self.push)
            .push(files)
            .await
            .context("push files")
    }

    async fn connect(&self, credentials: &Credentials) -> Result<SessionHandle<T>> {
        SessionHandle::connect(&self.transport, credentials, self.mode)
            .await
            .context("connect")
    }
}

impl Default for Client<RusshTransport> {
    fn default() -> Self {
        Self::new(RusshTransport::default())
    }
}

async fn finish<T: Transport, R>(session: SessionHandle<T>, result: Result<R>) -> Result<R> {
    let id = session.id();
    if let Err(e) = session.close().await {
        warn!(session = %id, error = %e, "failed to close session");
    }
    result
}

/// Run `command` on `address` as `user`, authenticating with the key at `key_path`.
///
/// On failure the output captured so far is available through
/// [`Error::output`](crate::Error::output).
pub async fn remote_run(user: &str, address: &str, key_path: &str, command: &str) -> Result<Vec<u8>> {
    let credentials = Credentials::new(address, user, key_path);
    Client::default().run(&credentials, command).await
}

/// Run `command` on `address` attached to `stdio`
pub async fn remote_attach_and_run(
    user: &str,
    address: &str,
    key_path: &str,
    command: &str,
    stdio: Stdio,
) -> Result<()> {
    let credentials = Credentials::new(address, user, key_path);
    Client::default().run_attached(&credentials, command, stdio).await
}

/// Push `files` to `address` with `/usr/bin/scp` as the receiver
pub async fn push_files(user: &str, address: &str, key_path: &str, files: &[FileTransfer]) -> Result<()> {
    let credentials = Credentials::new(address, user, key_path);
    Client::default().push(&credentials, files).await
}
