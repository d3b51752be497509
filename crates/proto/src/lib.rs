//! SSH client bootstrap for the Tether ecosystem.
//!
//! This crate gets an SSH client from "nothing" to "authenticated":
//!
//! - **Proxy connectors** - direct TCP, HTTP CONNECT, SOCKS4, SOCKS5
//! - **Version exchange** - identification strings with banner tolerance
//! - **Message dispatch** - phase-aware message number table
//! - **Authentication** - none, password, keyboard-interactive, publickey
//!
//! Key exchange and the encrypted packet layer are not part of this crate;
//! [`ssh::session::PacketTransport`] is the seam where they plug in.
//!
//! # Features
//!
//! - `ssh` (default) - the SSH bootstrap
//! - `serde` - `Serialize`/`Deserialize` for the configuration types
//!
//! # Example
//!
//! ```rust
//! use tether_proto::ssh::Packet;
//!
//! let packet = Packet::new(b"\x05\x00\x00\x00\x0cssh-userauth".to_vec()).unwrap();
//! let wire_format = packet.to_bytes();
//!
//! let parsed = Packet::from_bytes(&wire_format).unwrap();
//! assert_eq!(parsed.payload(), b"\x05\x00\x00\x00\x0cssh-userauth");
//! ```
//!
//! # References
//!
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "ssh")]
pub mod ssh;
