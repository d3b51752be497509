//! SOCKS5 connector (RFC 1928) with username/password authentication
//! (RFC 1929).

use super::direct::open;
use super::{dispose, read_exact, resolve, Connector};
use crate::ssh::config::{ConnectionEndpoint, ProxyConfiguration};
use crate::ssh::deadline::Deadline;
use crate::ssh::logging;
use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, SocketAddr};
use tether_platform::{TetherError, TetherResult};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use zeroize::Zeroize;

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_VERSION: u8 = 0x01;

const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_USERNAME_PASSWORD: u8 = 0x02;

const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Tunnels through a SOCKS5 proxy.
#[derive(Debug, Clone)]
pub struct Socks5Connector {
    proxy: ProxyConfiguration,
}

impl Socks5Connector {
    /// Creates a connector for the given proxy.
    pub fn new(proxy: ProxyConfiguration) -> Self {
        Self { proxy }
    }

    /// Encodes the username/password sub-negotiation.
    fn credentials_request(&self) -> BytesMut {
        let username = self.proxy.username.as_deref().unwrap_or("").as_bytes();
        let password = self.proxy.password.as_deref().unwrap_or("").as_bytes();

        let mut buf = BytesMut::with_capacity(3 + username.len() + password.len());
        buf.put_u8(AUTH_VERSION);
        buf.put_u8(username.len() as u8);
        buf.put_slice(username);
        buf.put_u8(password.len() as u8);
        buf.put_slice(password);
        buf
    }

    async fn handshake(
        &self,
        stream: &mut TcpStream,
        target: SocketAddr,
        deadline: &Deadline,
    ) -> TetherResult<()> {
        logging::log_proxy_step("SOCKS5", "greeting");
        deadline
            .run(
                "SOCKS5 greeting",
                stream.write_all(&[SOCKS5_VERSION, 2, METHOD_NO_AUTH, METHOD_USERNAME_PASSWORD]),
            )
            .await?;

        let mut selection = [0u8; 2];
        read_exact(stream, &mut selection, deadline, "SOCKS5 method selection").await?;
        logging::log_handshake_bytes("socks5-method", &selection);

        if selection[0] != SOCKS5_VERSION {
            return Err(TetherError::Proxy(format!(
                "SOCKS Version '{}' is not supported.",
                selection[0]
            )));
        }

        match selection[1] {
            METHOD_NO_AUTH => {}
            METHOD_USERNAME_PASSWORD => self.authenticate(stream, deadline).await?,
            other => {
                return Err(TetherError::Proxy(format!(
                    "SOCKS version negotiation failed: unsupported authentication method 0x{:02X}.",
                    other
                )))
            }
        }

        logging::log_proxy_step("SOCKS5", "connect");
        deadline
            .run("SOCKS5 connect request", stream.write_all(&connect_request(target)))
            .await?;

        read_reply(stream, deadline).await
    }

    async fn authenticate(&self, stream: &mut TcpStream, deadline: &Deadline) -> TetherResult<()> {
        logging::log_proxy_step("SOCKS5", "auth");
        let mut request = self.credentials_request();
        let sent = deadline
            .run("SOCKS5 authentication", stream.write_all(&request))
            .await;
        request[..].zeroize();
        sent?;

        let mut reply = [0u8; 2];
        read_exact(stream, &mut reply, deadline, "SOCKS5 authentication response").await?;
        if reply[1] != 0x00 {
            return Err(TetherError::Proxy(
                "Username/Password authentication failed.".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Connector for Socks5Connector {
    fn via(&self) -> &'static str {
        "SOCKS5"
    }

    async fn connect(&self, endpoint: &ConnectionEndpoint) -> TetherResult<TcpStream> {
        // Checked before any bytes reach the proxy
        self.proxy.check_socks5_credentials()?;

        let deadline = Deadline::after(endpoint.timeout);
        let addrs = resolve(endpoint, &deadline).await?;
        let target = addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                TetherError::Proxy(format!("SOCKS5: Cannot resolve '{}'.", endpoint.host))
            })?;

        let mut stream = open(&self.proxy.host, self.proxy.port, &deadline).await?;
        match self.handshake(&mut stream, target, &deadline).await {
            Ok(()) => Ok(stream),
            Err(e) => {
                dispose(stream).await;
                Err(e)
            }
        }
    }
}

/// Encodes the CONNECT request for a resolved target.
fn connect_request(target: SocketAddr) -> BytesMut {
    let mut buf = BytesMut::with_capacity(22);
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(CMD_CONNECT);
    buf.put_u8(0x00);
    match target.ip() {
        IpAddr::V4(v4) => {
            buf.put_u8(ATYP_IPV4);
            buf.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            buf.put_u8(ATYP_IPV6);
            buf.put_slice(&v6.octets());
        }
    }
    buf.put_u16(target.port());
    buf
}

fn status_message(status: u8) -> &'static str {
    match status {
        0x01 => "SOCKS5: General failure.",
        0x02 => "SOCKS5: Connection not allowed by ruleset.",
        0x03 => "SOCKS5: Network unreachable.",
        0x04 => "SOCKS5: Host unreachable.",
        0x05 => "SOCKS5: Connection refused by destination host.",
        0x06 => "SOCKS5: TTL expired.",
        0x07 => "SOCKS5: Command not supported or protocol error.",
        0x08 => "SOCKS5: Address type not supported.",
        _ => "SOCKS5: Not valid response.",
    }
}

/// Reads the CONNECT reply and discards the bound address.
async fn read_reply(stream: &mut TcpStream, deadline: &Deadline) -> TetherResult<()> {
    let mut header = [0u8; 4];
    read_exact(stream, &mut header, deadline, "SOCKS5 connect response").await?;
    logging::log_handshake_bytes("socks5-reply", &header);

    if header[0] != SOCKS5_VERSION {
        return Err(TetherError::Proxy("SOCKS5: Version 5 is expected.".into()));
    }
    if header[1] != 0x00 {
        return Err(TetherError::Proxy(status_message(header[1]).into()));
    }

    let address_length = match header[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut length = [0u8; 1];
            read_exact(stream, &mut length, deadline, "SOCKS5 bound address").await?;
            length[0] as usize
        }
        other => {
            return Err(TetherError::Proxy(format!(
                "SOCKS5: Address type '{}' is not supported.",
                other
            )))
        }
    };

    // Bound address and port
    let mut bound = vec![0u8; address_length + 2];
    read_exact(stream, &mut bound, deadline, "SOCKS5 bound address").await?;
    Ok(())
}
