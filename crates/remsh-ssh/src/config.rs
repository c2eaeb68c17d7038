//! Endpoint and client configuration

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TransportError;

/// Port used when the address does not name one
pub const DEFAULT_PORT: u16 = 22;

/// Bound on dialing plus handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// SSH client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Bound on dialing, handshake and authentication
    pub connect_timeout: Duration,
    /// How server host keys are checked
    pub host_key_policy: HostKeyPolicy,
    /// Drop the connection after this much silence
    pub inactivity_timeout: Option<Duration>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            host_key_policy: HostKeyPolicy::default(),
            inactivity_timeout: None,
        }
    }
}

impl SshConfig {
    /// Override the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the host key policy
    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// Set an inactivity timeout
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = Some(timeout);
        self
    }
}

/// Server host key verification
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Trust any key. Every acceptance is logged at `warn`.
    #[default]
    AcceptAny,
    /// Check the user's `~/.ssh/known_hosts`
    KnownHosts,
    /// Check a specific known hosts file
    KnownHostsFile(PathBuf),
}

/// Remote host and port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP address, without brackets
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]:port` or a bare IPv6 address
    pub fn parse(addr: &str) -> Result<Self, TransportError> {
        let invalid = || TransportError::InvalidEndpoint(addr.to_string());
        let addr_trimmed = addr.trim();
        if addr_trimmed.is_empty() {
            return Err(invalid());
        }

        let (host, port) = if let Some(rest) = addr_trimmed.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            match tail {
                "" => (host, None),
                tail => (host, Some(tail.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else {
            match addr_trimmed.matches(':').count() {
                0 => (addr_trimmed, None),
                1 => {
                    let (host, port) = addr_trimmed.split_once(':').ok_or_else(invalid)?;
                    (host, Some(port))
                }
                _ => (addr_trimmed, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            None => DEFAULT_PORT,
            Some(port) => match port.parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => return Err(invalid()),
            },
        };

        Ok(Self::new(host, port))
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_endpoints() {
        assert_eq!(Endpoint::parse("example.com").unwrap(), Endpoint::new("example.com", 22));
        assert_eq!(Endpoint::parse("10.0.0.1:2222").unwrap(), Endpoint::new("10.0.0.1", 2222));
        assert_eq!(Endpoint::parse("[::1]:2200").unwrap(), Endpoint::new("::1", 2200));
        assert_eq!(Endpoint::parse("[fe80::1]").unwrap(), Endpoint::new("fe80::1", 22));
        assert_eq!(Endpoint::parse("fe80::1").unwrap(), Endpoint::new("fe80::1", 22));
    }

    #[test]
    fn test_parse_rejects() {
        for addr in ["", "  ", ":22", "host:", "host:0", "host:65536", "host:ssh", "[::1", "[::1]22"] {
            assert!(
                matches!(Endpoint::parse(addr), Err(TransportError::InvalidEndpoint(_))),
                "accepted {:?}",
                addr
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Endpoint::new("example.com", 22).to_string(), "example.com:22");
        assert_eq!(Endpoint::new("::1", 2200).to_string(), "[::1]:2200");
    }

    proptest! {
        #[test]
        fn prop_display_parses_back(host in "[a-z][a-z0-9.-]{0,30}", port in 1u16..) {
            let endpoint = Endpoint::new(host, port);
            prop_assert_eq!(Endpoint::parse(&endpoint.to_string()).unwrap(), endpoint);
        }
    }

    #[test]
    fn test_default_config() {
        let config = SshConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.host_key_policy, HostKeyPolicy::AcceptAny);
        assert!(config.inactivity_timeout.is_none());

        let config = config
            .with_host_key_policy(HostKeyPolicy::KnownHosts)
            .with_connect_timeout(Duration::from_secs(1));
        assert_eq!(config.host_key_policy, HostKeyPolicy::KnownHosts);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
    }
}
