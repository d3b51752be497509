//! Connection configuration.
//!
//! In-memory configuration for the bootstrap sequence: where to connect,
//! which proxy hop to use, how long the whole sequence may take and who to
//! authenticate as.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tether_proto::ssh::config::{ConnectionEndpoint, ProxyConfiguration, ProxyKind};
//!
//! let endpoint = ConnectionEndpoint::new("example.com", 22, Duration::from_secs(10));
//! assert_eq!(endpoint.to_string(), "example.com:22");
//!
//! let proxy = ProxyConfiguration::new(ProxyKind::Socks5, "127.0.0.1", 1080)
//!     .with_credentials("alice", "secret");
//! assert!(proxy.validate().is_ok());
//! ```

use crate::ssh::orchestrator::PARTIAL_SUCCESS_LIMIT;
use crate::ssh::version::SshIdentification;
use std::fmt;
use std::time::Duration;
use tether_platform::{TetherError, TetherResult};

/// Maximum username/password length accepted by SOCKS5 (RFC 1929).
pub const SOCKS5_MAX_CREDENTIAL_LENGTH: usize = 255;

/// Host, port and timeout of a connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionEndpoint {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Budget for the whole connect-and-handshake sequence
    pub timeout: Duration,
}

impl ConnectionEndpoint {
    /// Creates a new endpoint.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

impl fmt::Display for ConnectionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Proxy protocol used for the single proxy hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProxyKind {
    /// HTTP CONNECT tunnel
    Http,
    /// SOCKS4 (IPv4 destinations only)
    Socks4,
    /// SOCKS5 with optional username/password
    Socks5,
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyKind::Http => "HTTP",
            ProxyKind::Socks4 => "SOCKS4",
            ProxyKind::Socks5 => "SOCKS5",
        };
        f.write_str(name)
    }
}

/// Proxy hop configuration.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProxyConfiguration {
    /// Proxy protocol
    pub kind: ProxyKind,
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Proxy username (SOCKS4 user-id, SOCKS5/HTTP username)
    pub username: Option<String>,
    /// Proxy password (SOCKS5/HTTP)
    pub password: Option<String>,
}

// Manual Debug implementation to keep the password out of logs
impl fmt::Debug for ProxyConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfiguration")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProxyConfiguration {
    /// Creates a proxy configuration without credentials.
    pub fn new(kind: ProxyKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Sets the proxy username and password.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets only the proxy username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Returns the proxy endpoint, sharing the target's timeout budget.
    pub fn endpoint(&self, timeout: Duration) -> ConnectionEndpoint {
        ConnectionEndpoint::new(self.host.clone(), self.port, timeout)
    }

    /// Checks that SOCKS5 credentials fit their one-byte length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::Proxy`] naming the over-long field.
    pub fn check_socks5_credentials(&self) -> TetherResult<()> {
        let too_long = |value: &Option<String>| {
            value
                .as_ref()
                .is_some_and(|v| v.len() > SOCKS5_MAX_CREDENTIAL_LENGTH)
        };
        if too_long(&self.username) {
            return Err(TetherError::Proxy("Proxy username is too long.".into()));
        }
        if too_long(&self.password) {
            return Err(TetherError::Proxy("Proxy password is too long.".into()));
        }
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::Config`] if the host is empty and
    /// [`TetherError::Proxy`] if SOCKS5 credentials exceed 255 bytes.
    pub fn validate(&self) -> TetherResult<()> {
        if self.host.is_empty() {
            return Err(TetherError::Config("proxy host cannot be empty".into()));
        }
        if self.kind == ProxyKind::Socks5 {
            self.check_socks5_credentials()?;
        }
        Ok(())
    }
}

/// Client bootstrap configuration.
#[derive(Debug, Clone)]
pub struct SshClientConfig {
    /// Target server
    pub endpoint: ConnectionEndpoint,
    /// Optional proxy hop
    pub proxy: Option<ProxyConfiguration>,
    /// Identification string sent to the server
    pub client_identification: SshIdentification,
    /// User to authenticate as
    pub username: String,
    /// Per-method attempt limit
    pub attempt_limit: u32,
    /// Whether to start authentication with a "none" request
    pub probe_with_none: bool,
}

impl SshClientConfig {
    /// Creates a configuration for `username@host:port`.
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            endpoint: ConnectionEndpoint::new(host, port, Duration::from_secs(30)),
            proxy: None,
            client_identification: SshIdentification::default_tether(),
            username: username.into(),
            attempt_limit: PARTIAL_SUCCESS_LIMIT,
            probe_with_none: true,
        }
    }

    /// Sets the bootstrap timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.timeout = timeout;
        self
    }

    /// Routes the connection through a proxy.
    pub fn with_proxy(mut self, proxy: ProxyConfiguration) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Overrides the identification string sent to the server.
    pub fn with_client_identification(mut self, identification: SshIdentification) -> Self {
        self.client_identification = identification;
        self
    }

    /// Sets the per-method attempt limit.
    pub fn with_attempt_limit(mut self, limit: u32) -> Self {
        self.attempt_limit = limit;
        self
    }

    /// Enables or disables the initial "none" request.
    pub fn with_none_probe(mut self, enabled: bool) -> Self {
        self.probe_with_none = enabled;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> TetherResult<()> {
        if self.endpoint.host.is_empty() {
            return Err(TetherError::Config("host cannot be empty".into()));
        }
        if self.endpoint.timeout.is_zero() {
            return Err(TetherError::Config("timeout must be non-zero".into()));
        }
        if self.username.is_empty() {
            return Err(TetherError::Config("username cannot be empty".into()));
        }
        if self.attempt_limit == 0 {
            return Err(TetherError::Config("attempt limit must be at least 1".into()));
        }
        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
        }
        Ok(())
    }
}
