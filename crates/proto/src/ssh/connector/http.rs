//! HTTP `CONNECT` tunnel connector.
//!
//! Sends a `CONNECT host:port HTTP/1.0` request (with Basic credentials when
//! a username is configured) and reads the response one byte at a time, so
//! nothing past the end of the response is consumed from the tunnel.

use super::direct::open;
use super::{dispose, Connector};
use crate::ssh::config::{ConnectionEndpoint, ProxyConfiguration};
use crate::ssh::deadline::Deadline;
use crate::ssh::logging;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use tether_platform::{TetherError, TetherResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

static STATUS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^HTTP/(?P<version>\d\.\d) (?P<code>\d{3})(?: (?P<reason>.*))?$")
        .expect("status line pattern is valid")
});

static HEADER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[^:\s]+)\s*:\s*(?P<value>.*)$").expect("header pattern is valid")
});

/// Upper bound on a single response line.
const MAX_LINE_LENGTH: usize = 8192;

/// Parsed `HTTP/x.y code reason` status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusLine {
    pub version: String,
    pub code: u16,
    pub reason: String,
}

impl StatusLine {
    pub(crate) fn parse(line: &str) -> Option<Self> {
        let caps = STATUS_LINE.captures(line)?;
        Some(Self {
            version: caps["version"].to_string(),
            code: caps["code"].parse().ok()?,
            reason: caps
                .name("reason")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Tunnels through an HTTP proxy with `CONNECT`.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    proxy: ProxyConfiguration,
}

impl HttpConnector {
    /// Creates a connector for the given proxy.
    pub fn new(proxy: ProxyConfiguration) -> Self {
        Self { proxy }
    }

    /// Builds the `CONNECT` request for `endpoint`.
    pub(crate) fn request(&self, endpoint: &ConnectionEndpoint) -> String {
        let mut request = format!("CONNECT {}:{} HTTP/1.0\r\n", endpoint.host, endpoint.port);
        if let Some(username) = &self.proxy.username {
            let password = self.proxy.password.as_deref().unwrap_or("");
            let token = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", username, password));
            request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", token));
        }
        request.push_str("\r\n");
        request
    }

    async fn handshake(
        &self,
        stream: &mut TcpStream,
        endpoint: &ConnectionEndpoint,
        deadline: &Deadline,
    ) -> TetherResult<()> {
        logging::log_proxy_step("HTTP", "connect");
        deadline
            .run(
                "HTTP CONNECT request",
                stream.write_all(self.request(endpoint).as_bytes()),
            )
            .await?;

        let status = read_line(stream, deadline)
            .await?
            .as_deref()
            .and_then(StatusLine::parse)
            .ok_or_else(|| {
                TetherError::Proxy("HTTP response does not contain status line.".into())
            })?;
        logging::log_proxy_step("HTTP", "status");

        let mut content_length = 0u64;
        let mut headers_complete = false;
        while let Some(line) = read_line(stream, deadline).await? {
            if line.is_empty() {
                headers_complete = true;
                break;
            }
            if let Some(length) = parse_content_length(&line)? {
                content_length = length;
            }
        }

        if headers_complete && content_length > 0 {
            drain_body(stream, content_length, deadline).await?;
        }

        if !status.is_success() {
            return Err(TetherError::Proxy(format!(
                "HTTP: Status code {}, \"{}\"",
                status.code, status.reason
            )));
        }
        if !headers_complete {
            return Err(TetherError::Proxy(
                "HTTP response ended before the end of the headers.".into(),
            ));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Connector for HttpConnector {
    fn via(&self) -> &'static str {
        "HTTP"
    }

    async fn connect(&self, endpoint: &ConnectionEndpoint) -> TetherResult<TcpStream> {
        let deadline = Deadline::after(endpoint.timeout);
        let mut stream = open(&self.proxy.host, self.proxy.port, &deadline).await?;

        match self.handshake(&mut stream, endpoint, &deadline).await {
            Ok(()) => Ok(stream),
            Err(e) => {
                dispose(stream).await;
                Err(e)
            }
        }
    }
}

/// Reads one CRLF or LF terminated line, byte by byte.
///
/// Returns `None` when the peer closed the connection before any byte of
/// the line arrived.
async fn read_line<S>(stream: &mut S, deadline: &Deadline) -> TetherResult<Option<String>>
where
    S: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let read = deadline
            .run("HTTP proxy response", stream.read(&mut byte))
            .await?;
        if read == 0 {
            if line.is_empty() {
                return Ok(None);
            }
            break;
        }
        if byte[0] == b'\n' {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            break;
        }
        line.push(byte[0]);
        if line.len() > MAX_LINE_LENGTH {
            return Err(TetherError::Proxy(
                "HTTP response line exceeds the maximum length.".into(),
            ));
        }
    }

    logging::log_handshake_bytes("http", &line);
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// Returns the body length if `line` is a `Content-Length` header.
fn parse_content_length(line: &str) -> TetherResult<Option<u64>> {
    let caps = match HEADER_LINE.captures(line) {
        Some(caps) if caps["name"].eq_ignore_ascii_case("content-length") => caps,
        _ => return Ok(None),
    };
    let value = caps["value"].trim();
    value.parse().map(Some).map_err(|_| {
        TetherError::Proxy(format!(
            "HTTP response contains an invalid Content-Length '{}'.",
            value
        ))
    })
}

async fn drain_body<S>(stream: &mut S, length: u64, deadline: &Deadline) -> TetherResult<()>
where
    S: AsyncRead + Unpin,
{
    let mut body = (&mut *stream).take(length);
    let drained = deadline
        .run(
            "HTTP response body",
            tokio::io::copy(&mut body, &mut tokio::io::sink()),
        )
        .await?;

    if drained < length {
        return Err(TetherError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "proxy closed the connection inside the response body",
        )));
    }
    Ok(())
}
