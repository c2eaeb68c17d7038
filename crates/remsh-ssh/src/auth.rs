//! Credential resolution
//!
//! Turns an authentication mode and a secret string into something the
//! transport can present to the server. For key files the secret is a path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use russh::keys::PrivateKey;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::TransportError;

/// How the secret in a set of credentials is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Secret is a password
    Password,
    /// Secret is the path of an unencrypted private key file
    PublicKeyFile,
}

impl AuthMode {
    /// Legacy numeric tag for [`AuthMode::Password`]
    pub const PASSWORD_TAG: i32 = 1;
    /// Legacy numeric tag for [`AuthMode::PublicKeyFile`]
    pub const PUBLIC_KEY_FILE_TAG: i32 = 2;

    /// Parse a textual tag
    pub fn from_tag(tag: &str) -> Result<Self, TransportError> {
        match tag {
            "password" => Ok(AuthMode::Password),
            "public-key-file" => Ok(AuthMode::PublicKeyFile),
            other => Err(TransportError::UnsupportedAuthMode(other.to_string())),
        }
    }

    /// Textual tag
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Password => "password",
            AuthMode::PublicKeyFile => "public-key-file",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

impl TryFrom<&str> for AuthMode {
    type Error = TransportError;

    fn try_from(tag: &str) -> Result<Self, Self::Error> {
        Self::from_tag(tag)
    }
}

impl TryFrom<i32> for AuthMode {
    type Error = TransportError;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        match tag {
            Self::PASSWORD_TAG => Ok(AuthMode::Password),
            Self::PUBLIC_KEY_FILE_TAG => Ok(AuthMode::PublicKeyFile),
            other => Err(TransportError::UnsupportedAuthMode(other.to_string())),
        }
    }
}

/// Resolved authentication method
pub enum AuthMethod {
    /// Password authentication
    Password(Zeroizing<String>),
    /// Public key authentication with a decoded private key
    PublicKey {
        /// File the key was loaded from
        path: PathBuf,
        /// Decoded key
        key: Arc<PrivateKey>,
    },
}

impl AuthMethod {
    /// Resolve `secret` according to `mode`.
    ///
    /// Key files are read and decoded here so failures surface before any
    /// network activity. Passphrase-protected keys are rejected.
    pub async fn resolve(mode: AuthMode, secret: &str) -> Result<Self, TransportError> {
        match mode {
            AuthMode::Password => Ok(Self::password(secret)),
            AuthMode::PublicKeyFile => Self::from_key_file(secret).await,
        }
    }

    /// Password method
    pub fn password(password: impl Into<String>) -> Self {
        AuthMethod::Password(Zeroizing::new(password.into()))
    }

    /// Read and decode a private key file
    pub async fn from_key_file(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map(Zeroizing::new)
            .map_err(|source| TransportError::KeyRead {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_key_contents(path, &contents)
    }

    /// Decode private key text loaded from `path`
    pub fn from_key_contents(path: impl AsRef<Path>, contents: &str) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let key = russh::keys::decode_secret_key(contents, None).map_err(|e| TransportError::KeyParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), algorithm = ?key.algorithm(), "loaded private key");
        Ok(AuthMethod::PublicKey {
            path: path.to_path_buf(),
            key: Arc::new(key),
        })
    }

    /// Mode this method was resolved from
    pub fn mode(&self) -> AuthMode {
        match self {
            AuthMethod::Password(_) => AuthMode::Password,
            AuthMethod::PublicKey { .. } => AuthMode::PublicKeyFile,
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
            AuthMethod::PublicKey { path, key } => f
                .debug_struct("PublicKey")
                .field("path", path)
                .field("algorithm", &key.algorithm())
                .finish(),
        }
    }
}
