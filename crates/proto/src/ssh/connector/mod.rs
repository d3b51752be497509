//! Transport connectors.
//!
//! A [`Connector`] produces a connected [`TcpStream`] to the target endpoint,
//! either directly or tunneled through one proxy hop:
//!
//! - [`DirectConnector`] - plain TCP connect
//! - [`HttpConnector`] - HTTP `CONNECT` tunnel
//! - [`Socks4Connector`] - SOCKS4 (IPv4 destinations only)
//! - [`Socks5Connector`] - SOCKS5 with optional username/password (RFC 1928/1929)
//!
//! Every connector budgets the entire connect-and-handshake sequence with the
//! endpoint's single timeout. On success the returned stream is positioned
//! right after the proxy response; on failure the socket is shut down before
//! the error is returned.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tether_proto::ssh::config::{ConnectionEndpoint, ProxyConfiguration, ProxyKind};
//! use tether_proto::ssh::connector;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = ConnectionEndpoint::new("server.example.com", 22, Duration::from_secs(10));
//! let proxy = ProxyConfiguration::new(ProxyKind::Socks5, "127.0.0.1", 1080);
//!
//! let stream = connector::connect(&endpoint, Some(&proxy)).await?;
//! # drop(stream);
//! # Ok(())
//! # }
//! ```

mod direct;
mod http;
mod socks4;
mod socks5;

pub use direct::DirectConnector;
pub use http::HttpConnector;
pub use socks4::Socks4Connector;
pub use socks5::Socks5Connector;

use crate::ssh::config::{ConnectionEndpoint, ProxyConfiguration, ProxyKind};
use crate::ssh::deadline::Deadline;
use crate::ssh::logging;
use std::net::{IpAddr, SocketAddr};
use tether_platform::TetherResult;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Strategy producing a connected transport socket.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Short name used in logs ("direct", "HTTP", "SOCKS4", "SOCKS5").
    fn via(&self) -> &'static str;

    /// Connects to `endpoint`, bounded by `endpoint.timeout`.
    ///
    /// # Errors
    ///
    /// - [`TetherError::Io`](tether_platform::TetherError::Io) for resolution,
    ///   refusal and reset errors
    /// - [`TetherError::Timeout`](tether_platform::TetherError::Timeout) when
    ///   the budget runs out
    /// - [`TetherError::Proxy`](tether_platform::TetherError::Proxy) for
    ///   malformed or rejecting proxy responses
    async fn connect(&self, endpoint: &ConnectionEndpoint) -> TetherResult<TcpStream>;
}

/// Returns the connector for an optional proxy hop.
pub fn connector_for(proxy: Option<&ProxyConfiguration>) -> Box<dyn Connector> {
    match proxy {
        None => Box::new(DirectConnector),
        Some(proxy) => match proxy.kind {
            ProxyKind::Http => Box::new(HttpConnector::new(proxy.clone())),
            ProxyKind::Socks4 => Box::new(Socks4Connector::new(proxy.clone())),
            ProxyKind::Socks5 => Box::new(Socks5Connector::new(proxy.clone())),
        },
    }
}

/// Connects to `endpoint`, optionally through `proxy`.
pub async fn connect(
    endpoint: &ConnectionEndpoint,
    proxy: Option<&ProxyConfiguration>,
) -> TetherResult<TcpStream> {
    let connector = connector_for(proxy);
    let target = endpoint.to_string();
    logging::log_connect_start(&target, connector.via());

    let deadline = Deadline::after(endpoint.timeout);
    match connector.connect(endpoint).await {
        Ok(stream) => {
            logging::log_connect_complete(
                &target,
                connector.via(),
                deadline.elapsed().as_millis() as u64,
            );
            Ok(stream)
        }
        Err(e) => {
            logging::log_connect_failed(&target, connector.via(), &e.to_string());
            Err(e)
        }
    }
}

/// Shuts the socket down and drops it.
pub(crate) async fn dispose(mut stream: TcpStream) {
    if let Err(e) = stream.shutdown().await {
        debug!("Socket shutdown failed: {}", e);
    }
}

/// Reads exactly `buf.len()` bytes within the remaining budget.
pub(crate) async fn read_exact<S>(
    stream: &mut S,
    buf: &mut [u8],
    deadline: &Deadline,
    operation: &str,
) -> TetherResult<()>
where
    S: AsyncRead + Unpin,
{
    deadline.run(operation, stream.read_exact(buf)).await?;
    Ok(())
}

/// Resolves the destination locally, for proxies that take raw addresses.
pub(crate) async fn resolve(
    endpoint: &ConnectionEndpoint,
    deadline: &Deadline,
) -> TetherResult<Vec<SocketAddr>> {
    if let Ok(ip) = endpoint.host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, endpoint.port)]);
    }

    let addrs = deadline
        .run(
            &format!("Resolution of {}", endpoint.host),
            tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port)),
        )
        .await?;
    Ok(addrs.collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_connector_for() {
        assert_eq!(connector_for(None).via(), "direct");

        let http = ProxyConfiguration::new(ProxyKind::Http, "proxy", 3128);
        assert_eq!(connector_for(Some(&http)).via(), "HTTP");

        let socks4 = ProxyConfiguration::new(ProxyKind::Socks4, "proxy", 1080);
        assert_eq!(connector_for(Some(&socks4)).via(), "SOCKS4");

        let socks5 = ProxyConfiguration::new(ProxyKind::Socks5, "proxy", 1080);
        assert_eq!(connector_for(Some(&socks5)).via(), "SOCKS5");
    }

    #[tokio::test]
    async fn test_resolve_ip_literal_skips_dns() {
        let endpoint = ConnectionEndpoint::new("192.0.2.7", 22, Duration::from_secs(1));
        let deadline = Deadline::after(endpoint.timeout);
        let addrs = resolve(&endpoint, &deadline).await.unwrap();
        assert_eq!(addrs, vec!["192.0.2.7:22".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_ipv6_literal() {
        let endpoint = ConnectionEndpoint::new("::1", 2222, Duration::from_secs(1));
        let deadline = Deadline::after(endpoint.timeout);
        let addrs = resolve(&endpoint, &deadline).await.unwrap();
        assert!(addrs[0].is_ipv6());
        assert_eq!(addrs[0].port(), 2222);
    }
}
