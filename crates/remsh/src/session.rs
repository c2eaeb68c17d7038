//! Session management and connection handling

use std::fmt;

use remsh_ssh::{AuthMethod, AuthMode, CommandChannel, Connection, Endpoint, Transport, TransportError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ResultExt;
use crate::{Error, Result};

/// Address, user and secret for one remote host.
///
/// The secret is a password or a private key path depending on the
/// [`AuthMode`] it is used with.
#[derive(Clone)]
pub struct Credentials {
    address: String,
    user: String,
    secret: String,
}

impl Credentials {
    /// Create credentials for `user` at `address` (`host[:port]`)
    pub fn new(address: impl Into<String>, user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user: user.into(),
            secret: secret.into(),
        }
    }

    /// Remote address as given
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Remote user
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Password or key path
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Parsed address
    pub fn endpoint(&self) -> std::result::Result<Endpoint, TransportError> {
        Endpoint::parse(&self.address)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

type ChannelOf<T> = <<T as Transport>::Connection as Connection>::Channel;

/// One authenticated connection with exactly one command channel.
///
/// Runs a single command. Call [`close`](Self::close) when done; dropping an
/// open handle is logged.
pub struct SessionHandle<T: Transport> {
    id: Uuid,
    endpoint: Endpoint,
    connection: T::Connection,
    pub(crate) channel: ChannelOf<T>,
    started: bool,
    closed: bool,
}

impl<T: Transport> SessionHandle<T> {
    /// Resolve credentials, dial and open the command channel.
    ///
    /// `mode` accepts an [`AuthMode`] or one of its tags; an unsupported tag
    /// fails before any network activity. If the channel cannot be opened
    /// the connection is closed before returning.
    pub async fn connect<M>(transport: &T, credentials: &Credentials, mode: M) -> Result<Self>
    where
        M: TryInto<AuthMode>,
        M::Error: Into<Error>,
    {
        let mode = match mode.try_into() {
            Ok(mode) => mode,
            Err(e) => return Err(e.into()),
        };
        let auth = AuthMethod::resolve(mode, credentials.secret())
            .await
            .context("resolve credentials")?;
        let endpoint = credentials.endpoint().context("dial")?;

        let connection = transport
            .connect(&endpoint, credentials.user(), &auth)
            .await
            .context("dial")?;

        let channel = match connection.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    warn!(%endpoint, error = %close_err, "failed to close connection after channel error");
                }
                return Err(Error::from(e).context("open channel"));
            }
        };

        let id = Uuid::new_v4();
        info!(session = %id, %endpoint, user = credentials.user(), %mode, "session established");
        Ok(Self {
            id,
            endpoint,
            connection,
            channel,
            started: false,
            closed: false,
        })
    }

    /// Session ID used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Connected endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn begin_command(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::SessionUsed);
        }
        self.started = true;
        Ok(())
    }

    /// Close the channel, then the connection.
    ///
    /// Both are attempted; the first failure is returned.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        let channel = self.channel.close().await;
        let connection = self.connection.close().await;
        debug!(session = %self.id, "session closed");
        channel.and(connection).map_err(Error::from)
    }
}

impl<T: Transport> Drop for SessionHandle<T> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(session = %self.id, endpoint = %self.endpoint, "session handle dropped without close");
        }
    }
}

#[cfg(test)]
mod tests;
