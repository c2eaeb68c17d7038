//! `russh` backed transport

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, ChannelMsg, Disconnect, Pty};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::transport::{ChannelEvent, CommandChannel, Connection, ExitStatus, StdinPipe, Transport};
use crate::{AuthMethod, Endpoint, HostKeyPolicy, PtyRequest, SshConfig, TerminalMode, TransportError};

/// Transport dialing real SSH servers
#[derive(Debug, Clone, Default)]
pub struct RusshTransport {
    config: SshConfig,
}

impl RusshTransport {
    /// Create a transport with the given configuration
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    fn client_config(&self) -> Arc<client::Config> {
        Arc::new(client::Config {
            inactivity_timeout: self.config.inactivity_timeout,
            ..Default::default()
        })
    }
}

#[async_trait]
impl Transport for RusshTransport {
    type Connection = RusshConnection;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        user: &str,
        auth: &AuthMethod,
    ) -> Result<RusshConnection, TransportError> {
        let limit = self.config.connect_timeout;
        let verifier = HostKeyVerifier {
            host: endpoint.host.clone(),
            port: endpoint.port,
            policy: self.config.host_key_policy.clone(),
        };

        debug!(%endpoint, user, mode = %auth.mode(), "dialing");
        let connecting = client::connect(self.client_config(), (endpoint.host.as_str(), endpoint.port), verifier);
        let mut handle = match timeout(limit, connecting).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(russh::Error::UnknownKey)) => {
                return Err(TransportError::HostKeyRejected(endpoint.to_string()));
            }
            Ok(Err(e)) => return Err(TransportError::Connection(format!("{}: {}", endpoint, e))),
            Err(_) => return Err(TransportError::Timeout(limit)),
        };

        match timeout(limit, authenticate(&mut handle, user, auth)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                disconnect(&handle).await;
                return Err(e);
            }
            Err(_) => {
                disconnect(&handle).await;
                return Err(TransportError::Timeout(limit));
            }
        }

        info!(%endpoint, user, "connected");
        Ok(RusshConnection { handle })
    }
}

async fn authenticate(
    handle: &mut Handle<HostKeyVerifier>,
    user: &str,
    auth: &AuthMethod,
) -> Result<(), TransportError> {
    let result = match auth {
        AuthMethod::Password(password) => handle.authenticate_password(user, password.as_str()).await?,
        AuthMethod::PublicKey { key, .. } => {
            let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
            handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::clone(key), hash_alg))
                .await?
        }
    };

    if result.success() {
        Ok(())
    } else {
        Err(TransportError::Authentication(format!(
            "server rejected {} authentication for {}",
            auth.mode(),
            user
        )))
    }
}

async fn disconnect(handle: &Handle<HostKeyVerifier>) {
    if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "").await {
        debug!(error = %e, "disconnect after failed setup");
    }
}

struct HostKeyVerifier {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl client::Handler for HostKeyVerifier {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let verdict = match &self.policy {
            HostKeyPolicy::AcceptAny => {
                warn!(host = %self.host, port = self.port, "accepting server host key without verification");
                return Ok(true);
            }
            HostKeyPolicy::KnownHosts => russh::keys::check_known_hosts(&self.host, self.port, server_public_key),
            HostKeyPolicy::KnownHostsFile(path) => {
                russh::keys::check_known_hosts_path(&self.host, self.port, server_public_key, path)
            }
        };

        match verdict {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!(host = %self.host, port = self.port, "server host key is not in known hosts");
                Ok(false)
            }
            Err(e) => {
                warn!(host = %self.host, port = self.port, error = %e, "host key verification failed");
                Ok(false)
            }
        }
    }
}

/// Authenticated `russh` connection
pub struct RusshConnection {
    handle: Handle<HostKeyVerifier>,
}

#[async_trait]
impl Connection for RusshConnection {
    type Channel = RusshChannel;

    async fn open_channel(&self) -> Result<RusshChannel, TransportError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;
        debug!(id = ?channel.id(), "opened session channel");
        Ok(RusshChannel {
            channel,
            exit_reported: false,
            closed: false,
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await
            .map_err(TransportError::from)
    }
}

/// Session channel on a `russh` connection
pub struct RusshChannel {
    channel: Channel<Msg>,
    exit_reported: bool,
    closed: bool,
}

fn pty_mode(mode: TerminalMode) -> Pty {
    match mode {
        TerminalMode::Echo => Pty::ECHO,
        TerminalMode::InputSpeed => Pty::TTY_OP_ISPEED,
        TerminalMode::OutputSpeed => Pty::TTY_OP_OSPEED,
    }
}

#[async_trait]
impl CommandChannel for RusshChannel {
    async fn request_pty(&mut self, pty: &PtyRequest) -> Result<(), TransportError> {
        let modes: Vec<(Pty, u32)> = pty.modes.iter().map(|(mode, value)| (pty_mode(mode), value)).collect();
        self.channel
            .request_pty(false, &pty.term, pty.cols, pty.rows, 0, 0, &modes)
            .await
            .map_err(|e| TransportError::Channel(format!("pty request failed: {}", e)))
    }

    fn stdin_pipe(&self) -> StdinPipe {
        Box::pin(self.channel.make_writer())
    }

    async fn exec(&mut self, command: &str) -> Result<(), TransportError> {
        debug!(command, "exec");
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| TransportError::Channel(format!("exec failed: {}", e)))
    }

    async fn close_stdin(&mut self) -> Result<(), TransportError> {
        self.channel.eof().await.map_err(TransportError::from)
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.closed {
            return None;
        }
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    return Some(ChannelEvent::Stdout(bytes::Bytes::copy_from_slice(&data)));
                }
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                    return Some(ChannelEvent::Stderr(bytes::Bytes::copy_from_slice(&data)));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    self.exit_reported = true;
                    return Some(ChannelEvent::Exit(ExitStatus::Code(exit_status)));
                }
                Some(ChannelMsg::ExitSignal {
                    signal_name,
                    core_dumped,
                    error_message,
                    ..
                }) => {
                    self.exit_reported = true;
                    return Some(ChannelEvent::Exit(ExitStatus::Signal {
                        name: format!("{:?}", signal_name),
                        core_dumped,
                        message: error_message,
                    }));
                }
                Some(other) => {
                    debug!(message = ?other, "ignoring channel message");
                }
                None => {
                    self.closed = true;
                    if self.exit_reported {
                        return None;
                    }
                    self.exit_reported = true;
                    return Some(ChannelEvent::Exit(ExitStatus::Missing));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.channel.close().await.map_err(TransportError::from)
    }
}
