//! SSH binary packet protocol (RFC 4253 Section 6), unencrypted phase.
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! ```
//!
//! Before keys are negotiated there is no MAC and the block size is 8.
//! Encrypted framing belongs to the cipher layer behind
//! [`PacketTransport`](crate::ssh::session::PacketTransport).
//!
//! # Constraints
//!
//! - `padding_length`: minimum 4, maximum 255 bytes
//! - `packet_length + 4` is a multiple of 8
//! - Maximum packet size: 35000 bytes
//!
//! # Example
//!
//! ```rust
//! use tether_proto::ssh::packet::Packet;
//!
//! let packet = Packet::new(b"\x05payload".to_vec()).unwrap();
//! let bytes = packet.to_bytes();
//!
//! let parsed = Packet::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.payload(), b"\x05payload");
//! ```

use bytes::{Buf, BufMut, BytesMut};
use rand::RngCore;
use tether_platform::{TetherError, TetherResult};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum packet size in bytes (RFC 4253 Section 6.1).
pub const MAX_PACKET_SIZE: usize = 35000;

/// Minimum padding length in bytes (RFC 4253 Section 6).
pub const MIN_PADDING_LEN: u8 = 4;

/// Block size used before encryption is negotiated.
const BLOCK_SIZE: usize = 8;

/// SSH binary packet.
///
/// # Invariants
///
/// - Padding length is between 4 and 255 bytes
/// - Total packet size is at most 35000 bytes
/// - The packet is aligned to 8 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
    padding: Vec<u8>,
}

impl Packet {
    /// Creates a packet with random padding.
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::Protocol`] if the payload is empty or the
    /// packet would exceed [`MAX_PACKET_SIZE`].
    pub fn new(payload: Vec<u8>) -> TetherResult<Self> {
        if payload.is_empty() {
            return Err(TetherError::Protocol("Packet payload is empty".to_string()));
        }

        let unpadded_len = 5 + payload.len();
        let mut padding_len = MIN_PADDING_LEN as usize;
        while (unpadded_len + padding_len) % BLOCK_SIZE != 0 {
            padding_len += 1;
        }

        let total_size = unpadded_len + padding_len;
        if total_size > MAX_PACKET_SIZE {
            return Err(TetherError::Protocol(format!(
                "Packet size {} exceeds maximum {}",
                total_size, MAX_PACKET_SIZE
            )));
        }

        let mut padding = vec![0u8; padding_len];
        rand::thread_rng().fill_bytes(&mut padding);

        Ok(Self { payload, padding })
    }

    /// Returns the payload of this packet.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Returns the padding of this packet.
    pub fn padding(&self) -> &[u8] {
        &self.padding
    }

    /// Serializes this packet to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let packet_length = 1 + self.payload.len() + self.padding.len();
        let mut buf = BytesMut::with_capacity(4 + packet_length);
        buf.put_u32(packet_length as u32);
        buf.put_u8(self.padding.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_slice(&self.padding);
        buf.to_vec()
    }

    /// Parses a complete packet from wire format.
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::Protocol`] if:
    /// - Data is too short or doesn't match the declared `packet_length`
    /// - Packet size exceeds the maximum
    /// - Padding length is invalid
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        if data.len() < 5 {
            return Err(TetherError::Protocol(format!(
                "Packet too short: {} bytes (minimum 5)",
                data.len()
            )));
        }

        let mut buf = data;
        let packet_length = check_length(buf.get_u32())?;

        if buf.len() != packet_length {
            return Err(TetherError::Protocol(format!(
                "Incomplete packet: expected {} bytes, got {} bytes",
                packet_length,
                buf.len()
            )));
        }

        Self::from_body(buf)
    }

    /// Reads one packet from `stream`.
    pub async fn read_from<S>(stream: &mut S) -> TetherResult<Self>
    where
        S: AsyncRead + Unpin,
    {
        let packet_length = check_length(stream.read_u32().await?)?;
        let mut body = vec![0u8; packet_length];
        stream.read_exact(&mut body).await?;
        Self::from_body(&body)
    }

    /// Parses `padding_length || payload || padding`.
    fn from_body(mut buf: &[u8]) -> TetherResult<Self> {
        let packet_length = buf.len();
        let padding_length = buf.get_u8() as usize;

        if padding_length < MIN_PADDING_LEN as usize {
            return Err(TetherError::Protocol(format!(
                "Padding too short: {} bytes (minimum {})",
                padding_length, MIN_PADDING_LEN
            )));
        }
        if packet_length < 1 + padding_length {
            return Err(TetherError::Protocol(format!(
                "Invalid packet: packet_length ({}) too small for padding ({})",
                packet_length, padding_length
            )));
        }

        let payload_length = packet_length - 1 - padding_length;
        let payload = buf[..payload_length].to_vec();
        buf.advance(payload_length);
        let padding = buf.to_vec();

        Ok(Self { payload, padding })
    }
}

fn check_length(packet_length: u32) -> TetherResult<usize> {
    let packet_length = packet_length as usize;
    if packet_length > MAX_PACKET_SIZE {
        return Err(TetherError::Protocol(format!(
            "Packet too large: {} bytes (maximum {})",
            packet_length, MAX_PACKET_SIZE
        )));
    }
    if packet_length < 5 {
        return Err(TetherError::Protocol(format!(
            "Packet too small: {} bytes (minimum 5)",
            packet_length
        )));
    }
    Ok(packet_length)
}
