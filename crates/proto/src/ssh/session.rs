//! Packet transport and message session.
//!
//! A [`Session`] couples a [`PacketTransport`] with the
//! [`MessageFactory`] that decides which messages are valid right now.
//! Messages that never need an answer during the bootstrap (`IGNORE`,
//! `DEBUG`, `UNIMPLEMENTED`) are logged and skipped, authentication banners
//! go to an optional handler, and a server `DISCONNECT` ends the session with
//! [`TetherError::Disconnected`].

use crate::ssh::factory::MessageFactory;
use crate::ssh::logging;
use crate::ssh::message::{MessageType, ServiceRequest, SshMessage};
use crate::ssh::packet::Packet;
use crate::ssh::version::BannerHandler;
use std::fmt;
use tether_platform::{TetherError, TetherResult};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Messages enabled for the whole lifetime of a session.
const TRANSPORT_MESSAGES: &[MessageType] = &[
    MessageType::Disconnect,
    MessageType::Ignore,
    MessageType::Unimplemented,
    MessageType::Debug,
    MessageType::ServiceAccept,
    MessageType::ExtInfo,
    MessageType::KexInit,
    MessageType::NewKeys,
];

/// Moves whole message payloads to and from the peer.
///
/// The encrypted implementation lives with the cipher layer;
/// [`PlainPacketTransport`] covers the unencrypted phase.
#[async_trait::async_trait]
pub trait PacketTransport: Send {
    /// Sends one payload (message number included).
    async fn send_payload(&mut self, payload: &[u8]) -> TetherResult<()>;

    /// Receives the next payload.
    async fn receive_payload(&mut self) -> TetherResult<Vec<u8>>;
}

/// Unencrypted RFC 4253 framing over any async stream.
#[derive(Debug)]
pub struct PlainPacketTransport<S> {
    stream: S,
}

impl<S> PlainPacketTransport<S> {
    /// Wraps a connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait::async_trait]
impl<S> PacketTransport for PlainPacketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_payload(&mut self, payload: &[u8]) -> TetherResult<()> {
        let packet = Packet::new(payload.to_vec())?;
        self.stream.write_all(&packet.to_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn receive_payload(&mut self) -> TetherResult<Vec<u8>> {
        Ok(Packet::read_from(&mut self.stream).await?.into_payload())
    }
}

/// Message-level view of an established transport.
pub struct Session {
    transport: Box<dyn PacketTransport>,
    factory: MessageFactory,
    banner_handler: Option<BannerHandler>,
    session_id: Vec<u8>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("factory", &self.factory)
            .field("banner_handler", &self.banner_handler.is_some())
            .field("session_id", &hex::encode(&self.session_id))
            .finish()
    }
}

impl Session {
    /// Creates a session with the transport-generic messages enabled.
    pub fn new(transport: Box<dyn PacketTransport>) -> Self {
        let mut factory = MessageFactory::new();
        for message_type in TRANSPORT_MESSAGES {
            if let Err(e) = factory.enable_and_activate(message_type.name()) {
                debug!("Failed to enable {}: {}", message_type, e);
            }
        }

        Self {
            transport,
            factory,
            banner_handler: None,
            session_id: Vec::new(),
        }
    }

    /// Delivers `SSH_MSG_USERAUTH_BANNER` text to `handler`.
    pub fn with_banner_handler(mut self, handler: BannerHandler) -> Self {
        self.banner_handler = Some(handler);
        self
    }

    /// Stores the exchange hash of the first key exchange.
    pub fn set_session_id(&mut self, session_id: Vec<u8>) {
        self.session_id = session_id;
    }

    /// Session identifier (empty until a key exchange completed).
    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// Dispatch table.
    pub fn factory(&self) -> &MessageFactory {
        &self.factory
    }

    /// Dispatch table, for phase changes.
    pub fn factory_mut(&mut self) -> &mut MessageFactory {
        &mut self.factory
    }

    /// Sends one message payload.
    pub async fn send_payload(&mut self, payload: &[u8]) -> TetherResult<()> {
        self.transport.send_payload(payload).await
    }

    /// Receives the next message that needs handling.
    ///
    /// # Errors
    ///
    /// - [`TetherError::Disconnected`] when the server disconnects
    /// - [`TetherError::Dispatch`] for messages not valid in this phase
    /// - [`TetherError::Protocol`] for malformed payloads
    pub async fn receive_message(&mut self) -> TetherResult<SshMessage> {
        loop {
            let payload = self.transport.receive_payload().await?;
            match self.factory.decode(&payload)? {
                SshMessage::Ignore(_) => {
                    logging::log_message_skipped("SSH_MSG_IGNORE", "");
                }
                SshMessage::Debug(debug) => {
                    logging::log_message_skipped("SSH_MSG_DEBUG", &debug.message);
                }
                SshMessage::Unimplemented(unimplemented) => {
                    logging::log_message_skipped(
                        "SSH_MSG_UNIMPLEMENTED",
                        &format!("sequence number {}", unimplemented.sequence_number),
                    );
                }
                SshMessage::UserauthBanner(banner) => {
                    if let Some(handler) = &self.banner_handler {
                        handler(banner.message());
                    }
                }
                SshMessage::Disconnect(disconnect) => return Err(disconnect.into()),
                message => return Ok(message),
            }
        }
    }

    /// Requests a service and waits for it to be accepted.
    pub async fn request_service(&mut self, service_name: &str) -> TetherResult<()> {
        self.send_payload(&ServiceRequest::new(service_name).to_bytes())
            .await?;

        match self.receive_message().await? {
            SshMessage::ServiceAccept(accept) if accept.service_name == service_name => Ok(()),
            SshMessage::ServiceAccept(accept) => Err(TetherError::Protocol(format!(
                "Requested service '{}' but server accepted '{}'",
                service_name, accept.service_name
            ))),
            other => Err(TetherError::Protocol(format!(
                "Expected SSH_MSG_SERVICE_ACCEPT, got {}",
                other.message_type()
            ))),
        }
    }

    /// Restricts dispatch to key exchange messages.
    pub fn begin_key_reexchange(&mut self) {
        self.factory.disable_non_key_exchange_messages();
    }

    /// Restores the messages that were enabled before the key exchange.
    pub fn end_key_reexchange(&mut self) -> TetherResult<()> {
        self.factory.enable_activated_messages()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ssh::auth::{AuthBanner, AuthFailure, AuthSuccess};
    use crate::ssh::message::{
        DebugMessage, DisconnectMessage, IgnoreMessage, ServiceAccept,
    };
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tether_platform::DispatchError;

    /// Replays canned server payloads and records what the client sent.
    pub(crate) struct ScriptedTransport {
        pub incoming: VecDeque<Vec<u8>>,
        pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(incoming: Vec<Vec<u8>>) -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    incoming: incoming.into(),
                    sent: Arc::clone(&sent),
                },
                sent,
            )
        }
    }

    #[async_trait::async_trait]
    impl PacketTransport for ScriptedTransport {
        async fn send_payload(&mut self, payload: &[u8]) -> TetherResult<()> {
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        async fn receive_payload(&mut self) -> TetherResult<Vec<u8>> {
            self.incoming.pop_front().ok_or_else(|| {
                TetherError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "script exhausted",
                ))
            })
        }
    }

    fn session(incoming: Vec<Vec<u8>>) -> (Session, Arc<Mutex<Vec<Vec<u8>>>>) {
        let (transport, sent) = ScriptedTransport::new(incoming);
        (Session::new(Box::new(transport)), sent)
    }

    #[tokio::test]
    async fn test_receive_skips_transport_noise() {
        let debug = DebugMessage {
            always_display: false,
            message: "noise".to_string(),
            language: String::new(),
        };
        let (mut session, _) = session(vec![
            IgnoreMessage::default().to_bytes(),
            debug.to_bytes(),
            vec![3, 0, 0, 0, 9],
            ServiceAccept {
                service_name: "ssh-userauth".to_string(),
            }
            .to_bytes(),
        ]);

        match session.receive_message().await.unwrap() {
            SshMessage::ServiceAccept(accept) => assert_eq!(accept.service_name, "ssh-userauth"),
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receive_disconnect() {
        let disconnect = DisconnectMessage {
            reason_code: 11,
            description: "bye".to_string(),
            language: String::new(),
        };
        let (mut session, _) = session(vec![disconnect.to_bytes()]);

        match session.receive_message().await {
            Err(TetherError::Disconnected {
                reason_code,
                description,
            }) => {
                assert_eq!(reason_code, 11);
                assert_eq!(description, "bye");
            }
            other => panic!("Expected disconnect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receive_disabled_message() {
        let (mut session, _) = session(vec![AuthSuccess::new().to_bytes()]);
        assert!(matches!(
            session.receive_message().await,
            Err(TetherError::Dispatch(DispatchError::NotValidInContext(52)))
        ));
    }

    #[tokio::test]
    async fn test_banner_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let (transport, _) = ScriptedTransport::new(vec![
            AuthBanner::new("Authorized users only").to_bytes(),
            AuthFailure::new(vec!["password".to_string()], false).to_bytes(),
        ]);
        let mut session = Session::new(Box::new(transport)).with_banner_handler(Arc::new(
            move |text: &str| sink.lock().unwrap().push(text.to_string()),
        ));
        session
            .factory_mut()
            .enable_and_activate("SSH_MSG_USERAUTH_BANNER")
            .unwrap();
        session
            .factory_mut()
            .enable_and_activate("SSH_MSG_USERAUTH_FAILURE")
            .unwrap();

        let message = session.receive_message().await.unwrap();
        assert_eq!(message.message_type(), MessageType::UserauthFailure);
        assert_eq!(*seen.lock().unwrap(), vec!["Authorized users only"]);
    }

    #[tokio::test]
    async fn test_request_service() {
        let (mut session, sent) = session(vec![ServiceAccept {
            service_name: "ssh-userauth".to_string(),
        }
        .to_bytes()]);

        session.request_service("ssh-userauth").await.unwrap();
        assert_eq!(
            sent.lock().unwrap()[0],
            ServiceRequest::new("ssh-userauth").to_bytes()
        );
    }

    #[tokio::test]
    async fn test_request_service_wrong_name() {
        let (mut session, _) = session(vec![ServiceAccept {
            service_name: "ssh-connection".to_string(),
        }
        .to_bytes()]);
        assert!(matches!(
            session.request_service("ssh-userauth").await,
            Err(TetherError::Protocol(_))
        ));
    }

    #[test]
    fn test_key_reexchange_window() {
        let (mut session, _) = session(vec![]);
        session
            .factory_mut()
            .enable_and_activate("SSH_MSG_USERAUTH_PK_OK")
            .unwrap();

        session.begin_key_reexchange();
        assert!(session.factory().create(60).is_err());
        assert!(session.factory().create(20).is_ok());

        session.end_key_reexchange().unwrap();
        assert!(session.factory().create(60).is_ok());
    }

    #[tokio::test]
    async fn test_plain_transport_over_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client = PlainPacketTransport::new(client);
        let mut server = PlainPacketTransport::new(server);

        client.send_payload(&[5, 0, 0, 0, 1, b'x']).await.unwrap();
        assert_eq!(
            server.receive_payload().await.unwrap(),
            vec![5, 0, 0, 0, 1, b'x']
        );
    }
}
