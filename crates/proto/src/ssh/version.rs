//! SSH protocol version exchange (RFC 4253 Section 4.2).
//!
//! Both sides send an identification string before anything else:
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! Servers may print banner lines before their identification line. The
//! exchange reads one byte at a time so that no byte past the identification
//! line's terminator is consumed.
//!
//! # Example
//!
//! ```rust
//! use tether_proto::ssh::version::SshIdentification;
//!
//! let id = SshIdentification::new("2.0", "Tether_0.1.0", None).unwrap();
//! assert_eq!(id.to_string(), "SSH-2.0-Tether_0.1.0");
//!
//! let parsed = SshIdentification::parse(b"SSH-2.0-OpenSSH_9.6 Debian").unwrap();
//! assert_eq!(parsed.software_version(), "OpenSSH_9.6");
//! assert_eq!(parsed.comments(), Some("Debian"));
//! ```

use crate::ssh::deadline::Deadline;
use crate::ssh::logging;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tether_platform::{TetherError, TetherResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Maximum length of a single line sent by the server.
pub const MAX_LINE_LENGTH: usize = 8192;

static IDENTIFICATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)^SSH-(?P<proto>[^-]+)-(?P<software>[^ ]+)(?: (?P<comments>.*))?$")
        .expect("identification pattern is valid")
});

/// Callback receiving banner lines sent before the identification line.
pub type BannerHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Parsed SSH identification string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshIdentification {
    protocol_version: String,
    software_version: String,
    comments: Option<String>,
}

impl SshIdentification {
    /// Creates an identification.
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::InvalidArgument`] if either version is empty.
    pub fn new(
        protocol_version: &str,
        software_version: &str,
        comments: Option<&str>,
    ) -> TetherResult<Self> {
        if protocol_version.is_empty() {
            return Err(TetherError::InvalidArgument(
                "protocol version cannot be empty".into(),
            ));
        }
        if software_version.is_empty() {
            return Err(TetherError::InvalidArgument(
                "software version cannot be empty".into(),
            ));
        }
        Ok(Self {
            protocol_version: protocol_version.to_string(),
            software_version: software_version.to_string(),
            comments: comments.map(String::from),
        })
    }

    /// Identification sent by this crate.
    pub fn default_tether() -> Self {
        Self {
            protocol_version: "2.0".to_string(),
            software_version: format!("Tether_{}", env!("CARGO_PKG_VERSION")),
            comments: None,
        }
    }

    /// Parses an identification line (without its terminator).
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::Identification`] with a dump of `line` if it is
    /// not a complete `SSH-proto-software[ comments]` string.
    pub fn parse(line: &[u8]) -> TetherResult<Self> {
        let caps = IDENTIFICATION.captures(line).ok_or_else(|| {
            TetherError::Identification(format!(
                "The identification string is not a complete SSH identification string:\n{}",
                hex_dump(line)
            ))
        })?;

        let text = |name: &str| {
            caps.name(name)
                .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        };
        Ok(Self {
            protocol_version: text("proto").unwrap_or_default(),
            software_version: text("software").unwrap_or_default(),
            comments: text("comments").filter(|c| !c.is_empty()),
        })
    }

    /// Protocol version (e.g. "2.0").
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Software version (e.g. "OpenSSH_9.6").
    pub fn software_version(&self) -> &str {
        &self.software_version
    }

    /// Comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Whether this client can talk to the peer ("2.0" or "1.99").
    pub fn is_supported(&self) -> bool {
        matches!(self.protocol_version.as_str(), "2.0" | "1.99")
    }

    /// Wire form, terminated by CR LF.
    pub fn to_wire_format(&self) -> Vec<u8> {
        format!("{}\r\n", self).into_bytes()
    }
}

impl fmt::Display for SshIdentification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SSH-{}-{}", self.protocol_version, self.software_version)?;
        if let Some(comments) = &self.comments {
            write!(f, " {}", comments)?;
        }
        Ok(())
    }
}

/// Performs the identification handshake over a connected stream.
pub struct ProtocolVersionExchange {
    client: SshIdentification,
    timeout: Duration,
    banner_handler: Option<BannerHandler>,
}

impl fmt::Debug for ProtocolVersionExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolVersionExchange")
            .field("client", &self.client)
            .field("timeout", &self.timeout)
            .field("banner_handler", &self.banner_handler.is_some())
            .finish()
    }
}

impl ProtocolVersionExchange {
    /// Creates an exchange sending `client` and bounded by `timeout`.
    pub fn new(client: SshIdentification, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            banner_handler: None,
        }
    }

    /// Reports banner lines to `handler` as they arrive.
    pub fn with_banner_handler(mut self, handler: BannerHandler) -> Self {
        self.banner_handler = Some(handler);
        self
    }

    /// Sends the client identification and reads the server's.
    ///
    /// On failure the stream is shut down before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`TetherError::Identification`] for NUL bytes, a missing or
    ///   incomplete identification line, or an over-long line
    /// - [`TetherError::Timeout`] when the budget runs out
    /// - [`TetherError::Io`] for transport errors
    pub async fn start<S>(&self, stream: &mut S) -> TetherResult<SshIdentification>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let deadline = Deadline::after(self.timeout);
        match self.exchange(stream, &deadline).await {
            Ok(server) => Ok(server),
            Err(e) => {
                if let Err(shutdown) = stream.shutdown().await {
                    debug!("Stream shutdown failed: {}", shutdown);
                }
                Err(e)
            }
        }
    }

    async fn exchange<S>(&self, stream: &mut S, deadline: &Deadline) -> TetherResult<SshIdentification>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        deadline
            .run(
                "SSH identification exchange",
                stream.write_all(&self.client.to_wire_format()),
            )
            .await?;
        deadline
            .run("SSH identification exchange", stream.flush())
            .await?;

        let mut received = Vec::new();
        let mut banner_lines = 0usize;

        loop {
            let start = received.len();
            let terminated = read_line(stream, &mut received, deadline).await?;
            let line = strip_terminator(&received[start..]);

            if line.starts_with(b"SSH-") {
                logging::log_handshake_bytes("identification", line);
                let server = SshIdentification::parse(line)?;
                logging::log_identification(&server.to_string(), banner_lines);
                return Ok(server);
            }

            if !terminated {
                if received.is_empty() {
                    return Err(TetherError::Identification(
                        "The server response does not contain an SSH identification string. \
                         The connection to the remote server was closed before any data was received."
                            .into(),
                    ));
                }
                return Err(TetherError::Identification(format!(
                    "The server response does not contain an SSH identification string:\n{}",
                    hex_dump(&received)
                )));
            }

            banner_lines += 1;
            if let Some(handler) = &self.banner_handler {
                handler(&String::from_utf8_lossy(line));
            }
        }
    }
}

/// Appends one line (terminator included) to `received`.
///
/// Returns `false` if the peer closed the stream before a `\n` arrived.
async fn read_line<S>(
    stream: &mut S,
    received: &mut Vec<u8>,
    deadline: &Deadline,
) -> TetherResult<bool>
where
    S: AsyncRead + Unpin,
{
    let start = received.len();
    let mut byte = [0u8; 1];

    loop {
        let read = deadline
            .run("SSH identification exchange", stream.read(&mut byte))
            .await?;
        if read == 0 {
            return Ok(false);
        }

        received.push(byte[0]);
        match byte[0] {
            b'\0' => {
                return Err(TetherError::Identification(format!(
                    "The server response contains a null character at position 0x{:08X}:\n{}",
                    received.len() - 1,
                    hex_dump(received)
                )))
            }
            b'\n' => return Ok(true),
            _ => {}
        }

        if received.len() - start > MAX_LINE_LENGTH {
            return Err(TetherError::Identification(format!(
                "The server response contains a line longer than {} bytes:\n{}",
                MAX_LINE_LENGTH,
                hex_dump(&received[start..start + 64])
            )));
        }
    }
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Renders bytes as `offset  hex  ascii` rows of 16.
pub(crate) fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!("  {:08X}  {:<47}  {}", row * 16, hex.join(" "), ascii)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn identification_error(result: TetherResult<SshIdentification>) -> String {
        match result {
            Err(TetherError::Identification(message)) => message,
            other => panic!("Expected identification error, got {:?}", other),
        }
    }

    #[test]
    fn test_identification_display() {
        let id = SshIdentification::new("2.0", "SOFT", None).unwrap();
        assert_eq!(id.to_string(), "SSH-2.0-SOFT");

        let id = SshIdentification::new("2.0", "SOFT", Some("comments")).unwrap();
        assert_eq!(id.to_string(), "SSH-2.0-SOFT comments");
        assert_eq!(id.to_wire_format(), b"SSH-2.0-SOFT comments\r\n");
    }

    #[test]
    fn test_identification_requires_versions() {
        assert!(matches!(
            SshIdentification::new("", "SOFT", None),
            Err(TetherError::InvalidArgument(_))
        ));
        assert!(matches!(
            SshIdentification::new("2.0", "", None),
            Err(TetherError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_default_identification() {
        let id = SshIdentification::default_tether();
        assert!(id.to_string().starts_with("SSH-2.0-Tether_"));
        assert!(id.is_supported());
    }

    #[test]
    fn test_parse_variants() {
        let id = SshIdentification::parse(b"SSH-1.99-Legacy_2").unwrap();
        assert_eq!(id.protocol_version(), "1.99");
        assert!(id.is_supported());

        let id = SshIdentification::parse(b"SSH-Zero-App").unwrap();
        assert_eq!(id.protocol_version(), "Zero");
        assert_eq!(id.software_version(), "App");
        assert_eq!(id.comments(), None);
        assert!(!id.is_supported());

        let id = SshIdentification::parse(b"SSH-2.0-OpenSSH_9.6p1 Ubuntu-3ubuntu13").unwrap();
        assert_eq!(id.software_version(), "OpenSSH_9.6p1");
        assert_eq!(id.comments(), Some("Ubuntu-3ubuntu13"));
    }

    #[test]
    fn test_parse_non_utf8_comments() {
        let id = SshIdentification::parse(b"SSH-2.0-Foo \xffbar").unwrap();
        assert_eq!(id.protocol_version(), "2.0");
        assert_eq!(id.software_version(), "Foo");
        assert_eq!(id.comments(), Some("\u{FFFD}bar"));

        let id = SshIdentification::parse(b"SSH-2.0-Caf\xe9").unwrap();
        assert_eq!(id.software_version(), "Caf\u{FFFD}");
    }

    #[test]
    fn test_parse_incomplete() {
        let message = identification_error(SshIdentification::parse(b"SSH-2.0"));
        assert!(message.starts_with(
            "The identification string is not a complete SSH identification string:"
        ));
        assert!(message.contains("53 53 48 2D 32 2E 30"));

        assert!(SshIdentification::parse(b"SSH-2.0-").is_err());
    }

    #[test]
    fn test_hex_dump_layout() {
        let dump = hex_dump(b"SSH-2.0\r\n");
        assert_eq!(
            dump,
            format!("  00000000  {:<47}  SSH-2.0..", "53 53 48 2D 32 2E 30 0D 0A")
        );

        let two_rows = hex_dump(&[0x41; 17]);
        assert_eq!(two_rows.lines().count(), 2);
        assert!(two_rows.lines().nth(1).unwrap().starts_with("  00000010  41"));
    }

    #[tokio::test]
    async fn test_exchange_sends_client_identification() {
        let (mut client, mut server) = duplex(1024);
        let exchange =
            ProtocolVersionExchange::new(SshIdentification::new("2.0", "Client", None).unwrap(), Duration::from_secs(1));

        server.write_all(b"SSH-2.0-Server\r\n").await.unwrap();
        let id = exchange.start(&mut client).await.unwrap();
        assert_eq!(id.software_version(), "Server");

        let mut sent = [0u8; 16];
        server.read_exact(&mut sent).await.unwrap();
        assert_eq!(&sent, b"SSH-2.0-Client\r\n");
    }

    #[tokio::test]
    async fn test_exchange_stops_after_identification_line() {
        let (mut client, mut server) = duplex(1024);
        let exchange = ProtocolVersionExchange::new(SshIdentification::default_tether(), Duration::from_secs(1));

        server
            .write_all(b"Welcome!\n\nSSH-Zero-App\n\0")
            .await
            .unwrap();
        let id = exchange.start(&mut client).await.unwrap();
        assert_eq!(id.protocol_version(), "Zero");
        assert_eq!(id.software_version(), "App");
        assert_eq!(id.comments(), None);

        let mut next = [0xFFu8; 1];
        client.read_exact(&mut next).await.unwrap();
        assert_eq!(next[0], 0x00);
    }

    #[tokio::test]
    async fn test_exchange_reports_banner_lines() {
        let (mut client, mut server) = duplex(1024);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let exchange = ProtocolVersionExchange::new(SshIdentification::default_tether(), Duration::from_secs(1))
            .with_banner_handler(Arc::new(move |line: &str| {
                sink.lock().unwrap().push(line.to_string());
            }));

        server
            .write_all(b"Authorized use only\r\n\r\nSSH-2.0-OpenSSH_9.6\r\n")
            .await
            .unwrap();
        exchange.start(&mut client).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Authorized use only".to_string(), String::new()]
        );
    }

    #[tokio::test]
    async fn test_exchange_null_character() {
        let (mut client, mut server) = duplex(1024);
        let exchange = ProtocolVersionExchange::new(SshIdentification::default_tether(), Duration::from_secs(1));

        server.write_all(b"Hi\r\nA\0SSH-2.0-X\r\n").await.unwrap();
        let message = identification_error(exchange.start(&mut client).await);
        assert!(message.starts_with(
            "The server response contains a null character at position 0x00000005:"
        ));
        assert!(message.contains("48 69 0D 0A 41 00"));
    }

    #[tokio::test]
    async fn test_exchange_closed_without_data() {
        let (mut client, server) = duplex(1024);
        drop(server);
        let exchange = ProtocolVersionExchange::new(SshIdentification::default_tether(), Duration::from_secs(1));

        // Writing to a closed duplex fails before the read; accept either
        match exchange.start(&mut client).await {
            Err(TetherError::Identification(message)) => assert!(message.ends_with(
                "The connection to the remote server was closed before any data was received."
            )),
            Err(TetherError::Io(_)) => {}
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_closed_after_banner() {
        let (mut client, mut server) = duplex(1024);
        let exchange = ProtocolVersionExchange::new(SshIdentification::default_tether(), Duration::from_secs(1));

        let writer = tokio::spawn(async move {
            server.write_all(b"HTTP/1.1 400 Bad Request\r\n").await.unwrap();
            let mut sink = vec![0u8; 64];
            let _ = server.read(&mut sink).await;
        });

        let message = identification_error(exchange.start(&mut client).await);
        assert!(message
            .starts_with("The server response does not contain an SSH identification string:"));
        assert!(message.contains("HTTP/1.1 400"));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_exchange_timeout() {
        let (mut client, _server) = duplex(1024);
        let budget = Duration::from_millis(50);
        let exchange = ProtocolVersionExchange::new(SshIdentification::default_tether(), budget);

        let started = std::time::Instant::now();
        let result = exchange.start(&mut client).await;
        let observed = started.elapsed();

        assert!(result.unwrap_err().is_timeout());
        assert!(observed >= budget, "returned after {:?}", observed);
        assert!(
            observed <= budget + Duration::from_millis(100),
            "returned after {:?}",
            observed
        );
    }

    #[tokio::test]
    async fn test_exchange_rejects_long_line() {
        let (mut client, mut server) = duplex(16 * 1024);
        let exchange = ProtocolVersionExchange::new(SshIdentification::default_tether(), Duration::from_secs(1));

        server.write_all(&vec![b'x'; MAX_LINE_LENGTH + 10]).await.unwrap();
        let message = identification_error(exchange.start(&mut client).await);
        assert!(message.contains("longer than 8192 bytes"));
    }
}
