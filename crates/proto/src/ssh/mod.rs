//! SSH client bootstrap (RFC 4252, RFC 4253).
//!
//! Everything a client does before the connection protocol starts, minus the
//! cryptography of the key exchange:
//!
//! 1. **Connect** ([`connector`]) - direct TCP or one HTTP CONNECT, SOCKS4
//!    or SOCKS5 proxy hop, all bounded by a single [`deadline::Deadline`]
//! 2. **Identify** ([`version`]) - exchange `SSH-protoversion-softwareversion`
//!    lines, tolerating pre-identification banner lines
//! 3. **Dispatch** ([`factory`], [`message`]) - a number-to-message table
//!    whose entries are switched on and off as the protocol phase changes
//! 4. **Authenticate** ([`orchestrator`], [`methods`]) - negotiate methods
//!    with the server, honoring partial success and per-method attempt limits
//!
//! # Security Considerations
//!
//! - **Input Validation**: packets are bounded to 35000 bytes and every line
//!   read during a handshake to 8192 bytes
//! - **Memory Safety**: passwords and keyboard-interactive responses are
//!   zeroized on drop using [`zeroize`]
//! - **No Unsafe Code**
//!
//! # Example
//!
//! ```rust
//! use tether_proto::ssh::factory::MessageFactory;
//!
//! let mut factory = MessageFactory::new();
//! factory.enable_and_activate("SSH_MSG_USERAUTH_PK_OK").unwrap();
//!
//! // 60 is shared; only one meaning can be live at a time
//! assert!(factory
//!     .enable_and_activate("SSH_MSG_USERAUTH_INFO_REQUEST")
//!     .is_err());
//! ```
//!
//! # References
//!
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4256](https://datatracker.ietf.org/doc/html/rfc4256) - Keyboard-Interactive Authentication
//! - [RFC 1928](https://datatracker.ietf.org/doc/html/rfc1928) - SOCKS Protocol Version 5

pub mod auth;
pub mod client;
pub mod config;
pub mod connector;
pub mod deadline;
pub mod factory;
pub mod logging;
pub mod message;
pub mod methods;
pub mod orchestrator;
pub mod packet;
pub mod session;
pub mod version;
mod wire;

// Re-export main types
pub use auth::{
    construct_signature_data, AuthBanner, AuthFailure, AuthInfoRequest, AuthInfoResponse,
    AuthMethod, AuthPasswdChangeReq, AuthPkOk, AuthRequest, AuthSuccess, Prompt,
};
pub use client::{IdentifiedConnection, SshClient};
pub use config::{ConnectionEndpoint, ProxyConfiguration, ProxyKind, SshClientConfig};
pub use connector::{connect, connector_for, Connector};
pub use deadline::Deadline;
pub use factory::{MessageFactory, MessageMetadata};
pub use message::{MessageType, SshMessage};
pub use methods::{
    KeyboardInteractiveAuthentication, NoneAuthentication, PasswordAuthentication,
    PublicKeyAuthentication, Signer,
};
pub use orchestrator::{AuthenticationMethod, AuthenticationOrchestrator, AuthenticationOutcome};
pub use packet::Packet;
pub use session::{PacketTransport, PlainPacketTransport, Session};
pub use version::{ProtocolVersionExchange, SshIdentification};
