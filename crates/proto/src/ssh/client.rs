//! SSH client bootstrap.
//!
//! Ties the pieces together: connect (directly or through one proxy),
//! exchange identification strings, then, once a packet transport is in
//! place, request the `ssh-userauth` service and authenticate.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_proto::ssh::client::SshClient;
//! use tether_proto::ssh::config::SshClientConfig;
//! use tether_proto::ssh::methods::PasswordAuthentication;
//! use tether_proto::ssh::orchestrator::AuthenticationMethod;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SshClientConfig::new("127.0.0.1", 22, "alice");
//!
//! let connection = SshClient::connect(&config).await?;
//! println!("Server: {}", connection.server());
//!
//! let mut session = connection.into_session();
//! let methods: Vec<Box<dyn AuthenticationMethod>> =
//!     vec![Box::new(PasswordAuthentication::new("secret"))];
//! SshClient::authenticate(&mut session, &config, &methods).await?;
//! # Ok(())
//! # }
//! ```

use crate::ssh::config::SshClientConfig;
use crate::ssh::connector::{self, dispose};
use crate::ssh::deadline::Deadline;
use crate::ssh::orchestrator::{AuthenticationMethod, AuthenticationOrchestrator};
use crate::ssh::session::{PlainPacketTransport, Session};
use crate::ssh::version::{BannerHandler, ProtocolVersionExchange, SshIdentification};
use tether_platform::{TetherError, TetherResult};
use tokio::net::TcpStream;
use tracing::info;

/// Service requested before authentication.
pub const USERAUTH_SERVICE: &str = "ssh-userauth";

/// A connected socket with both identification strings exchanged.
#[derive(Debug)]
pub struct IdentifiedConnection {
    stream: TcpStream,
    client: SshIdentification,
    server: SshIdentification,
}

impl IdentifiedConnection {
    /// Identification string we sent.
    pub fn client(&self) -> &SshIdentification {
        &self.client
    }

    /// Identification string the server sent.
    pub fn server(&self) -> &SshIdentification {
        &self.server
    }

    /// Releases the socket for the key exchange layer.
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    /// Wraps the socket in an unencrypted packet transport.
    ///
    /// Key exchange is out of scope here; use this for testing or over a
    /// tunnel that already provides confidentiality.
    pub fn into_session(self) -> Session {
        Session::new(Box::new(PlainPacketTransport::new(self.stream)))
    }
}

/// Client bootstrap entry points.
#[derive(Debug)]
pub struct SshClient;

impl SshClient {
    /// Connects and exchanges identification strings.
    ///
    /// The whole sequence shares the endpoint timeout.
    ///
    /// # Errors
    ///
    /// - [`TetherError::Config`] for an invalid configuration
    /// - [`TetherError::Identification`] for a malformed or unsupported
    ///   server identification
    /// - any connect error (see [`connector::connect`])
    pub async fn connect(config: &SshClientConfig) -> TetherResult<IdentifiedConnection> {
        Self::connect_with_banner_handler(config, None).await
    }

    /// Like [`SshClient::connect`], reporting pre-identification lines to
    /// `handler`.
    pub async fn connect_with_banner_handler(
        config: &SshClientConfig,
        handler: Option<BannerHandler>,
    ) -> TetherResult<IdentifiedConnection> {
        config.validate()?;

        let deadline = Deadline::after(config.endpoint.timeout);
        let mut stream = connector::connect(&config.endpoint, config.proxy.as_ref()).await?;

        let remaining = deadline.remaining();
        if remaining.is_zero() {
            dispose(stream).await;
            return Err(deadline.expired("SSH identification exchange"));
        }

        let mut exchange =
            ProtocolVersionExchange::new(config.client_identification.clone(), remaining);
        if let Some(handler) = handler {
            exchange = exchange.with_banner_handler(handler);
        }

        let server = exchange.start(&mut stream).await?;
        if !server.is_supported() {
            dispose(stream).await;
            return Err(TetherError::Identification(format!(
                "Server version '{}' is not supported.",
                server.protocol_version()
            )));
        }

        info!(
            target_addr = %config.endpoint,
            server_id = %server,
            "SSH connection identified"
        );

        Ok(IdentifiedConnection {
            stream,
            client: config.client_identification.clone(),
            server,
        })
    }

    /// Requests the `ssh-userauth` service and authenticates with `methods`.
    ///
    /// # Errors
    ///
    /// See [`AuthenticationOrchestrator::authenticate`].
    pub async fn authenticate(
        session: &mut Session,
        config: &SshClientConfig,
        methods: &[Box<dyn AuthenticationMethod>],
    ) -> TetherResult<()> {
        session.request_service(USERAUTH_SERVICE).await?;

        AuthenticationOrchestrator::new(config.username.clone())
            .with_attempt_limit(config.attempt_limit)
            .with_none_probe(config.probe_with_none)
            .authenticate(session, methods)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::config::{ProxyConfiguration, ProxyKind};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn server(reply: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(reply).await.unwrap();
            let mut sink = [0u8; 256];
            let _ = socket.read(&mut sink).await;
        });
        port
    }

    #[tokio::test]
    async fn test_connect_identifies_server() {
        let port = server(b"SSH-2.0-OpenSSH_9.6 Ubuntu\r\n").await;
        let config = SshClientConfig::new("127.0.0.1", port, "alice")
            .with_timeout(Duration::from_secs(5));

        let connection = SshClient::connect(&config).await.unwrap();
        assert_eq!(connection.server().software_version(), "OpenSSH_9.6");
        assert_eq!(connection.server().comments(), Some("Ubuntu"));
        assert_eq!(
            connection.client(),
            &SshIdentification::default_tether()
        );
    }

    #[tokio::test]
    async fn test_connect_accepts_compat_version() {
        let port = server(b"SSH-1.99-Legacy\r\n").await;
        let config = SshClientConfig::new("127.0.0.1", port, "alice")
            .with_timeout(Duration::from_secs(5));

        assert!(SshClient::connect(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_rejects_protocol_one() {
        let port = server(b"SSH-1.5-Ancient\r\n").await;
        let config = SshClientConfig::new("127.0.0.1", port, "alice")
            .with_timeout(Duration::from_secs(5));

        match SshClient::connect(&config).await {
            Err(TetherError::Identification(message)) => {
                assert_eq!(message, "Server version '1.5' is not supported.")
            }
            other => panic!("Expected identification error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_long_socks5_username() {
        let config = SshClientConfig::new("127.0.0.1", 22, "alice").with_proxy(
            ProxyConfiguration::new(ProxyKind::Socks5, "127.0.0.1", 1080)
                .with_credentials("u".repeat(256), "p"),
        );
        match SshClient::connect(&config).await {
            Err(TetherError::Proxy(message)) => assert_eq!(message, "Proxy username is too long."),
            other => panic!("Expected proxy error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_validates_config() {
        let config = SshClientConfig::new("", 22, "alice");
        assert!(matches!(
            SshClient::connect(&config).await,
            Err(TetherError::Config(_))
        ));
    }
}
