//! SOCKS4 connector.
//!
//! Only IPv4 destinations can be expressed in a SOCKS4 request, so the
//! target is resolved locally and the first IPv4 address is used.

use super::direct::open;
use super::{dispose, read_exact, resolve, Connector};
use crate::ssh::config::{ConnectionEndpoint, ProxyConfiguration};
use crate::ssh::deadline::Deadline;
use crate::ssh::logging;
use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, Ipv4Addr};
use tether_platform::{TetherError, TetherResult};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const SOCKS4_VERSION: u8 = 0x04;
const SOCKS4_CONNECT: u8 = 0x01;

const REQUEST_GRANTED: u8 = 0x5A;
const REQUEST_REJECTED: u8 = 0x5B;
const IDENTD_UNREACHABLE: u8 = 0x5C;
const IDENTD_MISMATCH: u8 = 0x5D;

/// Tunnels through a SOCKS4 proxy.
#[derive(Debug, Clone)]
pub struct Socks4Connector {
    proxy: ProxyConfiguration,
}

impl Socks4Connector {
    /// Creates a connector for the given proxy.
    pub fn new(proxy: ProxyConfiguration) -> Self {
        Self { proxy }
    }

    /// Encodes the CONNECT request for `address:port`.
    pub(crate) fn request(&self, address: Ipv4Addr, port: u16) -> TetherResult<BytesMut> {
        let user_id = self.proxy.username.as_deref().unwrap_or("");
        if !user_id.is_ascii() || user_id.contains('\0') {
            return Err(TetherError::Config(
                "SOCKS4 user id must be ASCII without null characters".into(),
            ));
        }

        let mut buf = BytesMut::with_capacity(9 + user_id.len());
        buf.put_u8(SOCKS4_VERSION);
        buf.put_u8(SOCKS4_CONNECT);
        buf.put_u16(port);
        buf.put_slice(&address.octets());
        buf.put_slice(user_id.as_bytes());
        buf.put_u8(0);
        Ok(buf)
    }

    async fn handshake(
        &self,
        stream: &mut TcpStream,
        request: &[u8],
        deadline: &Deadline,
    ) -> TetherResult<()> {
        logging::log_proxy_step("SOCKS4", "connect");
        deadline
            .run("SOCKS4 request", stream.write_all(request))
            .await?;

        let mut reply = [0u8; 8];
        read_exact(stream, &mut reply, deadline, "SOCKS4 response").await?;
        logging::log_handshake_bytes("socks4", &reply);

        check_reply(&reply)
    }
}

#[async_trait::async_trait]
impl Connector for Socks4Connector {
    fn via(&self) -> &'static str {
        "SOCKS4"
    }

    async fn connect(&self, endpoint: &ConnectionEndpoint) -> TetherResult<TcpStream> {
        let deadline = Deadline::after(endpoint.timeout);

        let address = resolve(endpoint, &deadline)
            .await?
            .into_iter()
            .find_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| {
                TetherError::Proxy("SOCKS4: Only IPv4 destinations are supported.".into())
            })?;
        let request = self.request(address, endpoint.port)?;

        let mut stream = open(&self.proxy.host, self.proxy.port, &deadline).await?;
        match self.handshake(&mut stream, &request, &deadline).await {
            Ok(()) => Ok(stream),
            Err(e) => {
                dispose(stream).await;
                Err(e)
            }
        }
    }
}

/// Interprets the 8-byte SOCKS4 reply.
fn check_reply(reply: &[u8; 8]) -> TetherResult<()> {
    if reply[0] != 0x00 {
        return Err(TetherError::Proxy("SOCKS4: Null is expected.".into()));
    }

    let message = match reply[1] {
        REQUEST_GRANTED => return Ok(()),
        REQUEST_REJECTED => "SOCKS4: Connection rejected.",
        IDENTD_UNREACHABLE => {
            "SOCKS4: Client is not running identd or not reachable from the server."
        }
        IDENTD_MISMATCH => {
            "SOCKS4: Client's identd could not confirm the user ID string in the request."
        }
        _ => "SOCKS4: Not valid response.",
    };
    Err(TetherError::Proxy(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::config::ProxyKind;

    fn proxy_error(result: TetherResult<()>) -> String {
        match result {
            Err(TetherError::Proxy(message)) => message,
            other => panic!("Expected proxy error, got {:?}", other),
        }
    }

    #[test]
    fn test_request_layout() {
        let connector = Socks4Connector::new(
            ProxyConfiguration::new(ProxyKind::Socks4, "proxy", 1080).with_username("bob"),
        );
        let request = connector
            .request(Ipv4Addr::new(10, 0, 0, 5), 22)
            .unwrap();
        assert_eq!(
            &request[..],
            &[0x04, 0x01, 0x00, 0x16, 10, 0, 0, 5, b'b', b'o', b'b', 0x00]
        );
    }

    #[test]
    fn test_request_without_user_id() {
        let connector = Socks4Connector::new(ProxyConfiguration::new(ProxyKind::Socks4, "proxy", 1080));
        let request = connector.request(Ipv4Addr::LOCALHOST, 2222).unwrap();
        assert_eq!(request.len(), 9);
        assert_eq!(request[8], 0x00);
    }

    #[test]
    fn test_request_rejects_non_ascii_user_id() {
        let connector = Socks4Connector::new(
            ProxyConfiguration::new(ProxyKind::Socks4, "proxy", 1080).with_username("jörg"),
        );
        assert!(matches!(
            connector.request(Ipv4Addr::LOCALHOST, 22),
            Err(TetherError::Config(_))
        ));
    }

    #[test]
    fn test_reply_codes() {
        assert!(check_reply(&[0x00, 0x5A, 0, 0, 0, 0, 0, 0]).is_ok());
        assert_eq!(
            proxy_error(check_reply(&[0x00, 0x5B, 0, 0, 0, 0, 0, 0])),
            "SOCKS4: Connection rejected."
        );
        assert_eq!(
            proxy_error(check_reply(&[0x00, 0x5C, 0, 0, 0, 0, 0, 0])),
            "SOCKS4: Client is not running identd or not reachable from the server."
        );
        assert_eq!(
            proxy_error(check_reply(&[0x00, 0x5D, 0, 0, 0, 0, 0, 0])),
            "SOCKS4: Client's identd could not confirm the user ID string in the request."
        );
        assert_eq!(
            proxy_error(check_reply(&[0x00, 0x42, 0, 0, 0, 0, 0, 0])),
            "SOCKS4: Not valid response."
        );
        assert_eq!(
            proxy_error(check_reply(&[0x04, 0x5A, 0, 0, 0, 0, 0, 0])),
            "SOCKS4: Null is expected."
        );
    }
}
