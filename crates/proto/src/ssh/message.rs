//! SSH protocol message catalog (RFC 4250 Section 4.1).
//!
//! [`MessageType`] names every message the client may receive. Several
//! messages share a wire number and are told apart only by context: number
//! 60 is `USERAUTH_PK_OK`, `USERAUTH_PASSWD_CHANGEREQ` or
//! `USERAUTH_INFO_REQUEST` depending on the method in progress, and number 31
//! depends on the negotiated key exchange. Which one is meant is decided by
//! the [`MessageFactory`](crate::ssh::factory::MessageFactory).
//!
//! # Message Categories
//!
//! - **Transport Layer Generic** (1-19): Disconnect, ignore, debug, service
//! - **Algorithm Negotiation** (20-29): Key exchange initialization
//! - **Key Exchange Method** (30-49): Method-specific messages
//! - **User Authentication** (50-79): Authentication protocol
//! - **Connection Protocol** (80-127): Global requests and channels
//!
//! # Example
//!
//! ```rust
//! use tether_proto::ssh::message::MessageType;
//!
//! assert_eq!(MessageType::UserauthPkOk.number(), 60);
//! assert_eq!(MessageType::UserauthInfoRequest.number(), 60);
//! assert_eq!(MessageType::UserauthPkOk.name(), "SSH_MSG_USERAUTH_PK_OK");
//! ```

use crate::ssh::auth::{
    AuthBanner, AuthFailure, AuthInfoRequest, AuthPasswdChangeReq, AuthPkOk, AuthSuccess,
};
use crate::ssh::wire::{
    expect_message, read_bool, read_bytes, read_string, read_u32, write_bool, write_bytes,
    write_string,
};
use bytes::{BufMut, BytesMut};
use tether_platform::{TetherError, TetherResult};

/// Messages the client can receive, in registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // Transport layer generic (1-19)
    /// Disconnect message - terminates the connection.
    Disconnect,
    /// Ignore message - padding or keep-alive.
    Ignore,
    /// Unimplemented message - response to unknown message type.
    Unimplemented,
    /// Debug message - debugging information.
    Debug,
    /// Service accept - service request accepted.
    ServiceAccept,
    /// Extension info (RFC 8308).
    ExtInfo,

    // Algorithm negotiation (20-29)
    /// Key exchange init - algorithm negotiation.
    KexInit,
    /// New keys - signals transition to new keys.
    NewKeys,

    // Key exchange method specific (30-49)
    /// Diffie-Hellman reply.
    KexDhReply,
    /// ECDH reply (RFC 5656).
    KexEcdhReply,
    /// DH group exchange group (RFC 4419).
    KexDhGexGroup,
    /// DH group exchange reply (RFC 4419).
    KexDhGexReply,

    // User authentication (50-79)
    /// User authentication failure.
    UserauthFailure,
    /// User authentication success.
    UserauthSuccess,
    /// User authentication banner.
    UserauthBanner,
    /// Public key acceptable.
    UserauthPkOk,
    /// Password change requested.
    UserauthPasswdChangeReq,
    /// Keyboard-interactive prompts (RFC 4256).
    UserauthInfoRequest,

    // Connection protocol (80-127)
    /// Global request.
    GlobalRequest,
    /// Request success.
    RequestSuccess,
    /// Request failure.
    RequestFailure,
    /// Channel open.
    ChannelOpen,
    /// Channel open confirmation.
    ChannelOpenConfirmation,
    /// Channel open failure.
    ChannelOpenFailure,
    /// Channel window adjust.
    ChannelWindowAdjust,
    /// Channel data.
    ChannelData,
    /// Channel extended data (stderr).
    ChannelExtendedData,
    /// Channel EOF.
    ChannelEof,
    /// Channel close.
    ChannelClose,
    /// Channel request.
    ChannelRequest,
    /// Channel success.
    ChannelSuccess,
    /// Channel failure.
    ChannelFailure,
}

impl MessageType {
    /// Every registered message, in registry order.
    pub const ALL: &'static [MessageType] = &[
        MessageType::Disconnect,
        MessageType::Ignore,
        MessageType::Unimplemented,
        MessageType::Debug,
        MessageType::ServiceAccept,
        MessageType::ExtInfo,
        MessageType::KexInit,
        MessageType::NewKeys,
        MessageType::KexDhReply,
        MessageType::KexEcdhReply,
        MessageType::KexDhGexGroup,
        MessageType::KexDhGexReply,
        MessageType::UserauthFailure,
        MessageType::UserauthSuccess,
        MessageType::UserauthBanner,
        MessageType::UserauthPkOk,
        MessageType::UserauthPasswdChangeReq,
        MessageType::UserauthInfoRequest,
        MessageType::GlobalRequest,
        MessageType::RequestSuccess,
        MessageType::RequestFailure,
        MessageType::ChannelOpen,
        MessageType::ChannelOpenConfirmation,
        MessageType::ChannelOpenFailure,
        MessageType::ChannelWindowAdjust,
        MessageType::ChannelData,
        MessageType::ChannelExtendedData,
        MessageType::ChannelEof,
        MessageType::ChannelClose,
        MessageType::ChannelRequest,
        MessageType::ChannelSuccess,
        MessageType::ChannelFailure,
    ];

    /// Returns the wire message number.
    pub fn number(&self) -> u8 {
        match self {
            MessageType::Disconnect => 1,
            MessageType::Ignore => 2,
            MessageType::Unimplemented => 3,
            MessageType::Debug => 4,
            MessageType::ServiceAccept => 6,
            MessageType::ExtInfo => 7,
            MessageType::KexInit => 20,
            MessageType::NewKeys => 21,
            MessageType::KexDhReply => 31,
            MessageType::KexEcdhReply => 31,
            MessageType::KexDhGexGroup => 31,
            MessageType::KexDhGexReply => 33,
            MessageType::UserauthFailure => 51,
            MessageType::UserauthSuccess => 52,
            MessageType::UserauthBanner => 53,
            MessageType::UserauthPkOk => 60,
            MessageType::UserauthPasswdChangeReq => 60,
            MessageType::UserauthInfoRequest => 60,
            MessageType::GlobalRequest => 80,
            MessageType::RequestSuccess => 81,
            MessageType::RequestFailure => 82,
            MessageType::ChannelOpen => 90,
            MessageType::ChannelOpenConfirmation => 91,
            MessageType::ChannelOpenFailure => 92,
            MessageType::ChannelWindowAdjust => 93,
            MessageType::ChannelData => 94,
            MessageType::ChannelExtendedData => 95,
            MessageType::ChannelEof => 96,
            MessageType::ChannelClose => 97,
            MessageType::ChannelRequest => 98,
            MessageType::ChannelSuccess => 99,
            MessageType::ChannelFailure => 100,
        }
    }

    /// Returns the canonical message name.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tether_proto::ssh::message::MessageType;
    ///
    /// assert_eq!(MessageType::KexInit.name(), "SSH_MSG_KEXINIT");
    /// ```
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Disconnect => "SSH_MSG_DISCONNECT",
            MessageType::Ignore => "SSH_MSG_IGNORE",
            MessageType::Unimplemented => "SSH_MSG_UNIMPLEMENTED",
            MessageType::Debug => "SSH_MSG_DEBUG",
            MessageType::ServiceAccept => "SSH_MSG_SERVICE_ACCEPT",
            MessageType::ExtInfo => "SSH_MSG_EXT_INFO",
            MessageType::KexInit => "SSH_MSG_KEXINIT",
            MessageType::NewKeys => "SSH_MSG_NEWKEYS",
            MessageType::KexDhReply => "SSH_MSG_KEXDH_REPLY",
            MessageType::KexEcdhReply => "SSH_MSG_KEX_ECDH_REPLY",
            MessageType::KexDhGexGroup => "SSH_MSG_KEX_DH_GEX_GROUP",
            MessageType::KexDhGexReply => "SSH_MSG_KEX_DH_GEX_REPLY",
            MessageType::UserauthFailure => "SSH_MSG_USERAUTH_FAILURE",
            MessageType::UserauthSuccess => "SSH_MSG_USERAUTH_SUCCESS",
            MessageType::UserauthBanner => "SSH_MSG_USERAUTH_BANNER",
            MessageType::UserauthPkOk => "SSH_MSG_USERAUTH_PK_OK",
            MessageType::UserauthPasswdChangeReq => "SSH_MSG_USERAUTH_PASSWD_CHANGEREQ",
            MessageType::UserauthInfoRequest => "SSH_MSG_USERAUTH_INFO_REQUEST",
            MessageType::GlobalRequest => "SSH_MSG_GLOBAL_REQUEST",
            MessageType::RequestSuccess => "SSH_MSG_REQUEST_SUCCESS",
            MessageType::RequestFailure => "SSH_MSG_REQUEST_FAILURE",
            MessageType::ChannelOpen => "SSH_MSG_CHANNEL_OPEN",
            MessageType::ChannelOpenConfirmation => "SSH_MSG_CHANNEL_OPEN_CONFIRMATION",
            MessageType::ChannelOpenFailure => "SSH_MSG_CHANNEL_OPEN_FAILURE",
            MessageType::ChannelWindowAdjust => "SSH_MSG_CHANNEL_WINDOW_ADJUST",
            MessageType::ChannelData => "SSH_MSG_CHANNEL_DATA",
            MessageType::ChannelExtendedData => "SSH_MSG_CHANNEL_EXTENDED_DATA",
            MessageType::ChannelEof => "SSH_MSG_CHANNEL_EOF",
            MessageType::ChannelClose => "SSH_MSG_CHANNEL_CLOSE",
            MessageType::ChannelRequest => "SSH_MSG_CHANNEL_REQUEST",
            MessageType::ChannelSuccess => "SSH_MSG_CHANNEL_SUCCESS",
            MessageType::ChannelFailure => "SSH_MSG_CHANNEL_FAILURE",
        }
    }

    /// Looks a message up by canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Returns a fresh, blank instance of this message.
    pub fn instantiate(&self) -> SshMessage {
        match self {
            MessageType::Disconnect => SshMessage::Disconnect(DisconnectMessage::default()),
            MessageType::Ignore => SshMessage::Ignore(IgnoreMessage::default()),
            MessageType::Unimplemented => SshMessage::Unimplemented(UnimplementedMessage::default()),
            MessageType::Debug => SshMessage::Debug(DebugMessage::default()),
            MessageType::ServiceAccept => SshMessage::ServiceAccept(ServiceAccept::default()),
            MessageType::UserauthFailure => SshMessage::UserauthFailure(AuthFailure::default()),
            MessageType::UserauthSuccess => SshMessage::UserauthSuccess(AuthSuccess::new()),
            MessageType::UserauthBanner => SshMessage::UserauthBanner(AuthBanner::default()),
            MessageType::UserauthPkOk => SshMessage::UserauthPkOk(AuthPkOk::default()),
            MessageType::UserauthPasswdChangeReq => {
                SshMessage::UserauthPasswdChangeReq(AuthPasswdChangeReq::default())
            }
            MessageType::UserauthInfoRequest => {
                SshMessage::UserauthInfoRequest(AuthInfoRequest::default())
            }
            other => SshMessage::Opaque(OpaqueMessage::new(*other)),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.number())
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshMessage {
    /// SSH_MSG_DISCONNECT
    Disconnect(DisconnectMessage),
    /// SSH_MSG_IGNORE
    Ignore(IgnoreMessage),
    /// SSH_MSG_UNIMPLEMENTED
    Unimplemented(UnimplementedMessage),
    /// SSH_MSG_DEBUG
    Debug(DebugMessage),
    /// SSH_MSG_SERVICE_ACCEPT
    ServiceAccept(ServiceAccept),
    /// SSH_MSG_USERAUTH_FAILURE
    UserauthFailure(AuthFailure),
    /// SSH_MSG_USERAUTH_SUCCESS
    UserauthSuccess(AuthSuccess),
    /// SSH_MSG_USERAUTH_BANNER
    UserauthBanner(AuthBanner),
    /// SSH_MSG_USERAUTH_PK_OK
    UserauthPkOk(AuthPkOk),
    /// SSH_MSG_USERAUTH_PASSWD_CHANGEREQ
    UserauthPasswdChangeReq(AuthPasswdChangeReq),
    /// SSH_MSG_USERAUTH_INFO_REQUEST
    UserauthInfoRequest(AuthInfoRequest),
    /// Any other registered message, kept as raw payload for the layer that
    /// owns it (key exchange, connection protocol).
    Opaque(OpaqueMessage),
}

impl SshMessage {
    /// Returns the catalog entry this instance was created from.
    pub fn message_type(&self) -> MessageType {
        match self {
            SshMessage::Disconnect(_) => MessageType::Disconnect,
            SshMessage::Ignore(_) => MessageType::Ignore,
            SshMessage::Unimplemented(_) => MessageType::Unimplemented,
            SshMessage::Debug(_) => MessageType::Debug,
            SshMessage::ServiceAccept(_) => MessageType::ServiceAccept,
            SshMessage::UserauthFailure(_) => MessageType::UserauthFailure,
            SshMessage::UserauthSuccess(_) => MessageType::UserauthSuccess,
            SshMessage::UserauthBanner(_) => MessageType::UserauthBanner,
            SshMessage::UserauthPkOk(_) => MessageType::UserauthPkOk,
            SshMessage::UserauthPasswdChangeReq(_) => MessageType::UserauthPasswdChangeReq,
            SshMessage::UserauthInfoRequest(_) => MessageType::UserauthInfoRequest,
            SshMessage::Opaque(opaque) => opaque.message_type,
        }
    }

    /// Fills this blank instance from a full payload (message number included).
    pub fn load(&mut self, payload: &[u8]) -> TetherResult<()> {
        match self {
            SshMessage::Disconnect(m) => *m = DisconnectMessage::from_bytes(payload)?,
            SshMessage::Ignore(m) => *m = IgnoreMessage::from_bytes(payload)?,
            SshMessage::Unimplemented(m) => *m = UnimplementedMessage::from_bytes(payload)?,
            SshMessage::Debug(m) => *m = DebugMessage::from_bytes(payload)?,
            SshMessage::ServiceAccept(m) => *m = ServiceAccept::from_bytes(payload)?,
            SshMessage::UserauthFailure(m) => *m = AuthFailure::from_bytes(payload)?,
            SshMessage::UserauthSuccess(m) => *m = AuthSuccess::from_bytes(payload)?,
            SshMessage::UserauthBanner(m) => *m = AuthBanner::from_bytes(payload)?,
            SshMessage::UserauthPkOk(m) => *m = AuthPkOk::from_bytes(payload)?,
            SshMessage::UserauthPasswdChangeReq(m) => {
                *m = AuthPasswdChangeReq::from_bytes(payload)?
            }
            SshMessage::UserauthInfoRequest(m) => *m = AuthInfoRequest::from_bytes(payload)?,
            SshMessage::Opaque(m) => m.load(payload)?,
        }
        Ok(())
    }
}

/// Registered message whose body is interpreted by another layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueMessage {
    /// Catalog entry
    pub message_type: MessageType,
    /// Full payload, message number included
    pub payload: Vec<u8>,
}

impl OpaqueMessage {
    /// Creates a blank instance.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            payload: Vec::new(),
        }
    }

    fn load(&mut self, payload: &[u8]) -> TetherResult<()> {
        expect_message(payload, self.message_type.number(), self.message_type.name())?;
        self.payload = payload.to_vec();
        Ok(())
    }
}

/// SSH_MSG_DISCONNECT (RFC 4253 Section 11.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectMessage {
    /// Reason code (e.g. 14 = no more auth methods available)
    pub reason_code: u32,
    /// Human-readable description
    pub description: String,
    /// Language tag
    pub language: String,
}

impl DisconnectMessage {
    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_u32(self.reason_code);
        write_string(&mut buf, &self.description);
        write_string(&mut buf, &self.language);
        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, 1, "SSH_MSG_DISCONNECT")?;
        let mut offset = 1;
        let reason_code = read_u32(data, &mut offset)?;
        let description = read_string(data, &mut offset)?;
        // Some servers omit the language tag
        let language = if offset < data.len() {
            read_string(data, &mut offset)?
        } else {
            String::new()
        };
        Ok(Self {
            reason_code,
            description,
            language,
        })
    }
}

impl From<DisconnectMessage> for TetherError {
    fn from(message: DisconnectMessage) -> Self {
        TetherError::Disconnected {
            reason_code: message.reason_code,
            description: message.description,
        }
    }
}

/// SSH_MSG_IGNORE (RFC 4253 Section 11.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreMessage {
    /// Arbitrary data
    pub data: Vec<u8>,
}

impl IgnoreMessage {
    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(2);
        write_bytes(&mut buf, &self.data);
        buf.to_vec()
    }

    /// Parses the message. A missing data field is read as empty.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, 2, "SSH_MSG_IGNORE")?;
        let mut offset = 1;
        let data = if data.len() > 1 {
            read_bytes(data, &mut offset)?
        } else {
            Vec::new()
        };
        Ok(Self { data })
    }
}

/// SSH_MSG_UNIMPLEMENTED (RFC 4253 Section 11.4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnimplementedMessage {
    /// Sequence number of the rejected packet
    pub sequence_number: u32,
}

impl UnimplementedMessage {
    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, 3, "SSH_MSG_UNIMPLEMENTED")?;
        let mut offset = 1;
        Ok(Self {
            sequence_number: read_u32(data, &mut offset)?,
        })
    }
}

/// SSH_MSG_DEBUG (RFC 4253 Section 11.3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugMessage {
    /// Whether the client should show the message
    pub always_display: bool,
    /// Debug text
    pub message: String,
    /// Language tag
    pub language: String,
}

impl DebugMessage {
    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, 4, "SSH_MSG_DEBUG")?;
        let mut offset = 1;
        let always_display = read_bool(data, &mut offset)?;
        let message = read_string(data, &mut offset)?;
        let language = if offset < data.len() {
            read_string(data, &mut offset)?
        } else {
            String::new()
        };
        Ok(Self {
            always_display,
            message,
            language,
        })
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(4);
        write_bool(&mut buf, self.always_display);
        write_string(&mut buf, &self.message);
        write_string(&mut buf, &self.language);
        buf.to_vec()
    }
}

/// SSH_MSG_SERVICE_REQUEST (RFC 4253 Section 10). Client to server only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    /// Requested service (e.g. "ssh-userauth")
    pub service_name: String,
}

impl ServiceRequest {
    /// Creates a request for `service_name`.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(5);
        write_string(&mut buf, &self.service_name);
        buf.to_vec()
    }
}

/// SSH_MSG_SERVICE_ACCEPT (RFC 4253 Section 10).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAccept {
    /// Accepted service
    pub service_name: String,
}

impl ServiceAccept {
    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(6);
        write_string(&mut buf, &self.service_name);
        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, 6, "SSH_MSG_SERVICE_ACCEPT")?;
        let mut offset = 1;
        Ok(Self {
            service_name: read_string(data, &mut offset)?,
        })
    }
}
