//! Client authentication methods.
//!
//! Each method runs exactly one attempt per call and reports the server's
//! verdict as an [`AuthenticationOutcome`]. The orchestrator decides what
//! happens next.
//!
//! - [`NoneAuthentication`] - "none", used to query the allowed methods
//! - [`PasswordAuthentication`] - "password", with optional password change
//! - [`KeyboardInteractiveAuthentication`] - "keyboard-interactive" (RFC 4256)
//! - [`PublicKeyAuthentication`] - "publickey" with query-then-sign

use crate::ssh::auth::{
    construct_signature_data, AuthInfoRequest, AuthInfoResponse, AuthMethod, AuthRequest,
};
use crate::ssh::message::SshMessage;
use crate::ssh::orchestrator::{AuthenticationMethod, AuthenticationOutcome};
use crate::ssh::session::Session;
use std::fmt;
use std::sync::Arc;
use tether_platform::{TetherError, TetherResult};
use tracing::debug;
use zeroize::Zeroize;

/// Service started once authentication succeeds.
pub const CONNECTION_SERVICE: &str = "ssh-connection";

const PASSWD_CHANGEREQ: &str = "SSH_MSG_USERAUTH_PASSWD_CHANGEREQ";
const INFO_REQUEST: &str = "SSH_MSG_USERAUTH_INFO_REQUEST";
const PK_OK: &str = "SSH_MSG_USERAUTH_PK_OK";

/// Supplies a new password when the server demands a change.
///
/// Receives the server's prompt. Returning `None` abandons the attempt.
pub type PasswordChangeHandler = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Answers one round of keyboard-interactive prompts, one response per prompt.
pub type PromptResponder = Arc<dyn Fn(&AuthInfoRequest) -> Vec<String> + Send + Sync>;

/// Private key operations needed for public key authentication.
pub trait Signer: Send + Sync {
    /// Public key algorithm (e.g. "ssh-ed25519", "rsa-sha2-256").
    fn algorithm(&self) -> &str;

    /// Public key in SSH wire format.
    fn public_key_blob(&self) -> Vec<u8>;

    /// Signs `data`, returning the SSH signature blob
    /// (`string algorithm || string signature`).
    fn sign(&self, data: &[u8]) -> TetherResult<Vec<u8>>;
}

/// Maps a FAILURE or SUCCESS reply to an outcome.
fn outcome(message: SshMessage, method: &str) -> TetherResult<AuthenticationOutcome> {
    match message {
        SshMessage::UserauthSuccess(_) => Ok(AuthenticationOutcome::Success),
        SshMessage::UserauthFailure(failure) => {
            let allowed = failure.methods_can_continue().to_vec();
            if failure.partial_success() {
                Ok(AuthenticationOutcome::PartialSuccess { allowed })
            } else {
                Ok(AuthenticationOutcome::Failure { allowed })
            }
        }
        other => Err(TetherError::Protocol(format!(
            "Unexpected {} during {} authentication",
            other.message_type(),
            method
        ))),
    }
}

/// Disables a method-specific message, keeping the first error.
fn release(
    session: &mut Session,
    name: &str,
    result: TetherResult<AuthenticationOutcome>,
) -> TetherResult<AuthenticationOutcome> {
    let released = session.factory_mut().disable_and_deactivate(name);
    let outcome = result?;
    released?;
    Ok(outcome)
}

/// The "none" method.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneAuthentication;

#[async_trait::async_trait]
impl AuthenticationMethod for NoneAuthentication {
    fn name(&self) -> &str {
        "none"
    }

    async fn attempt(
        &self,
        session: &mut Session,
        username: &str,
    ) -> TetherResult<AuthenticationOutcome> {
        let request = AuthRequest::new(username, CONNECTION_SERVICE, AuthMethod::None);
        session.send_payload(&request.to_bytes()).await?;
        outcome(session.receive_message().await?, self.name())
    }
}

/// The "password" method.
pub struct PasswordAuthentication {
    password: String,
    change_handler: Option<PasswordChangeHandler>,
}

impl PasswordAuthentication {
    /// Creates the method with the user's password.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            change_handler: None,
        }
    }

    /// Answers `SSH_MSG_USERAUTH_PASSWD_CHANGEREQ` with `handler`.
    pub fn with_change_handler(mut self, handler: PasswordChangeHandler) -> Self {
        self.change_handler = Some(handler);
        self
    }

    fn request(&self, username: &str, new_password: Option<String>) -> AuthRequest {
        AuthRequest::new(
            username,
            CONNECTION_SERVICE,
            AuthMethod::Password {
                password: self.password.clone(),
                new_password,
            },
        )
    }

    async fn exchange(
        &self,
        session: &mut Session,
        username: &str,
    ) -> TetherResult<AuthenticationOutcome> {
        session
            .send_payload(&self.request(username, None).to_bytes())
            .await?;

        loop {
            match session.receive_message().await? {
                SshMessage::UserauthPasswdChangeReq(change) => {
                    let handler = self.change_handler.as_ref().ok_or_else(|| {
                        TetherError::Authentication(format!(
                            "Password change required but no handler is configured: {}",
                            change.prompt()
                        ))
                    })?;
                    let new_password = handler(change.prompt()).ok_or_else(|| {
                        TetherError::Authentication("Password change was declined.".to_string())
                    })?;
                    debug!("Sending changed password");
                    session
                        .send_payload(&self.request(username, Some(new_password)).to_bytes())
                        .await?;
                }
                message => return outcome(message, self.name()),
            }
        }
    }
}

impl fmt::Debug for PasswordAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordAuthentication")
            .field("password", &"<redacted>")
            .field("change_handler", &self.change_handler.is_some())
            .finish()
    }
}

impl Drop for PasswordAuthentication {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

#[async_trait::async_trait]
impl AuthenticationMethod for PasswordAuthentication {
    fn name(&self) -> &str {
        "password"
    }

    async fn attempt(
        &self,
        session: &mut Session,
        username: &str,
    ) -> TetherResult<AuthenticationOutcome> {
        session.factory_mut().enable_and_activate(PASSWD_CHANGEREQ)?;
        let result = self.exchange(session, username).await;
        release(session, PASSWD_CHANGEREQ, result)
    }
}

/// The "keyboard-interactive" method.
pub struct KeyboardInteractiveAuthentication {
    responder: PromptResponder,
}

impl KeyboardInteractiveAuthentication {
    /// Creates the method with a prompt responder.
    pub fn new(responder: PromptResponder) -> Self {
        Self { responder }
    }

    async fn exchange(
        &self,
        session: &mut Session,
        username: &str,
    ) -> TetherResult<AuthenticationOutcome> {
        let request = AuthRequest::new(
            username,
            CONNECTION_SERVICE,
            AuthMethod::KeyboardInteractive {
                language: String::new(),
                submethods: Vec::new(),
            },
        );
        session.send_payload(&request.to_bytes()).await?;

        loop {
            match session.receive_message().await? {
                SshMessage::UserauthInfoRequest(info) => {
                    let responses = (self.responder)(&info);
                    if responses.len() != info.prompts.len() {
                        return Err(TetherError::Authentication(format!(
                            "Keyboard-interactive responder returned {} responses for {} prompts.",
                            responses.len(),
                            info.prompts.len()
                        )));
                    }
                    session
                        .send_payload(&AuthInfoResponse::new(responses).to_bytes())
                        .await?;
                }
                message => return outcome(message, self.name()),
            }
        }
    }
}

impl fmt::Debug for KeyboardInteractiveAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyboardInteractiveAuthentication")
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl AuthenticationMethod for KeyboardInteractiveAuthentication {
    fn name(&self) -> &str {
        "keyboard-interactive"
    }

    async fn attempt(
        &self,
        session: &mut Session,
        username: &str,
    ) -> TetherResult<AuthenticationOutcome> {
        session.factory_mut().enable_and_activate(INFO_REQUEST)?;
        let result = self.exchange(session, username).await;
        release(session, INFO_REQUEST, result)
    }
}

/// The "publickey" method.
///
/// Each key is first offered without a signature; only keys the server
/// answers with `SSH_MSG_USERAUTH_PK_OK` are used to sign.
pub struct PublicKeyAuthentication {
    signers: Vec<Box<dyn Signer>>,
}

impl PublicKeyAuthentication {
    /// Creates the method with the keys to offer, in order.
    pub fn new(signers: Vec<Box<dyn Signer>>) -> Self {
        Self { signers }
    }

    async fn try_key(
        &self,
        session: &mut Session,
        username: &str,
        signer: &dyn Signer,
    ) -> TetherResult<AuthenticationOutcome> {
        let algorithm = signer.algorithm().to_string();
        let public_key = signer.public_key_blob();

        let query = AuthRequest::new(
            username,
            CONNECTION_SERVICE,
            AuthMethod::PublicKey {
                algorithm: algorithm.clone(),
                public_key: public_key.clone(),
                signature: None,
            },
        );
        session.send_payload(&query.to_bytes()).await?;

        match session.receive_message().await? {
            SshMessage::UserauthPkOk(ok) => {
                if ok.algorithm() != algorithm || ok.public_key() != public_key.as_slice() {
                    return Err(TetherError::Protocol(
                        "SSH_MSG_USERAUTH_PK_OK does not match the offered key".to_string(),
                    ));
                }
            }
            message => return outcome(message, self.name()),
        }

        let data = construct_signature_data(
            session.session_id(),
            username,
            CONNECTION_SERVICE,
            &algorithm,
            &public_key,
        );
        let signature = signer.sign(&data)?;

        let signed = AuthRequest::new(
            username,
            CONNECTION_SERVICE,
            AuthMethod::PublicKey {
                algorithm,
                public_key,
                signature: Some(signature),
            },
        );
        session.send_payload(&signed.to_bytes()).await?;
        outcome(session.receive_message().await?, self.name())
    }

    async fn exchange(
        &self,
        session: &mut Session,
        username: &str,
    ) -> TetherResult<AuthenticationOutcome> {
        let mut last = AuthenticationOutcome::Failure { allowed: Vec::new() };
        for signer in &self.signers {
            last = self.try_key(session, username, signer.as_ref()).await?;
            if !matches!(last, AuthenticationOutcome::Failure { .. }) {
                break;
            }
        }
        Ok(last)
    }
}

impl fmt::Debug for PublicKeyAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algorithms: Vec<&str> = self.signers.iter().map(|s| s.algorithm()).collect();
        f.debug_struct("PublicKeyAuthentication")
            .field("keys", &algorithms)
            .finish()
    }
}

#[async_trait::async_trait]
impl AuthenticationMethod for PublicKeyAuthentication {
    fn name(&self) -> &str {
        "publickey"
    }

    async fn attempt(
        &self,
        session: &mut Session,
        username: &str,
    ) -> TetherResult<AuthenticationOutcome> {
        session.factory_mut().enable_and_activate(PK_OK)?;
        let result = self.exchange(session, username).await;
        release(session, PK_OK, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::auth::{AuthFailure, AuthPasswdChangeReq, AuthPkOk, AuthSuccess, Prompt};
    use crate::ssh::session::tests::ScriptedTransport;
    use std::sync::Mutex;

    fn session(incoming: Vec<Vec<u8>>) -> (Session, Arc<Mutex<Vec<Vec<u8>>>>) {
        let (transport, sent) = ScriptedTransport::new(incoming);
        let mut session = Session::new(Box::new(transport));
        for name in [
            "SSH_MSG_USERAUTH_SUCCESS",
            "SSH_MSG_USERAUTH_FAILURE",
            "SSH_MSG_USERAUTH_BANNER",
        ] {
            session.factory_mut().enable_and_activate(name).unwrap();
        }
        (session, sent)
    }

    fn sent_request(sent: &Arc<Mutex<Vec<Vec<u8>>>>, index: usize) -> AuthRequest {
        AuthRequest::from_bytes(&sent.lock().unwrap()[index]).unwrap()
    }

    struct FixedSigner;

    impl Signer for FixedSigner {
        fn algorithm(&self) -> &str {
            "ssh-ed25519"
        }

        fn public_key_blob(&self) -> Vec<u8> {
            vec![0xAA, 0xBB]
        }

        fn sign(&self, data: &[u8]) -> TetherResult<Vec<u8>> {
            Ok(vec![data.len() as u8])
        }
    }

    #[tokio::test]
    async fn test_none_returns_allowed_methods() {
        let (mut session, sent) = session(vec![AuthFailure::new(
            vec!["publickey".to_string(), "password".to_string()],
            false,
        )
        .to_bytes()]);

        let outcome = NoneAuthentication
            .attempt(&mut session, "alice")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AuthenticationOutcome::Failure {
                allowed: vec!["publickey".to_string(), "password".to_string()]
            }
        );
        assert_eq!(sent_request(&sent, 0).method(), &AuthMethod::None);
    }

    #[tokio::test]
    async fn test_password_success() {
        let (mut session, sent) = session(vec![AuthSuccess::new().to_bytes()]);

        let outcome = PasswordAuthentication::new("hunter2")
            .attempt(&mut session, "alice")
            .await
            .unwrap();
        assert_eq!(outcome, AuthenticationOutcome::Success);

        let request = sent_request(&sent, 0);
        assert_eq!(request.user_name(), "alice");
        assert_eq!(request.service_name(), "ssh-connection");
        assert_eq!(
            request.method(),
            &AuthMethod::Password {
                password: "hunter2".to_string(),
                new_password: None
            }
        );
        assert!(!session.factory().is_enabled(PASSWD_CHANGEREQ));
    }

    #[tokio::test]
    async fn test_password_change_handled() {
        let (mut session, sent) = session(vec![
            AuthPasswdChangeReq::new("Password expired").to_bytes(),
            AuthSuccess::new().to_bytes(),
        ]);

        let method = PasswordAuthentication::new("old").with_change_handler(Arc::new(
            |prompt: &str| {
                assert_eq!(prompt, "Password expired");
                Some("new".to_string())
            },
        ));
        let outcome = method.attempt(&mut session, "alice").await.unwrap();
        assert_eq!(outcome, AuthenticationOutcome::Success);

        match sent_request(&sent, 1).method() {
            AuthMethod::Password { new_password, .. } => {
                assert_eq!(new_password.as_deref(), Some("new"))
            }
            other => panic!("Expected password request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_password_change_without_handler() {
        let (mut session, _) = session(vec![AuthPasswdChangeReq::new("expired").to_bytes()]);

        let result = PasswordAuthentication::new("old")
            .attempt(&mut session, "alice")
            .await;
        assert!(matches!(result, Err(TetherError::Authentication(_))));
        assert!(!session.factory().is_enabled(PASSWD_CHANGEREQ));
    }

    #[tokio::test]
    async fn test_keyboard_interactive_rounds() {
        let info = AuthInfoRequest {
            name: String::new(),
            instruction: String::new(),
            language_tag: String::new(),
            prompts: vec![Prompt {
                text: "Verification code: ".to_string(),
                echo: false,
            }],
        };
        let (mut session, sent) = session(vec![
            info.to_bytes(),
            AuthFailure::new(vec!["password".to_string()], true).to_bytes(),
        ]);

        let method = KeyboardInteractiveAuthentication::new(Arc::new(
            |request: &AuthInfoRequest| -> Vec<String> {
                request.prompts.iter().map(|_| "424242".to_string()).collect()
            },
        ));
        let outcome = method.attempt(&mut session, "alice").await.unwrap();
        assert_eq!(
            outcome,
            AuthenticationOutcome::PartialSuccess {
                allowed: vec!["password".to_string()]
            }
        );

        let response = AuthInfoResponse::from_bytes(&sent.lock().unwrap()[1]).unwrap();
        assert_eq!(response.responses(), &["424242"]);
    }

    #[tokio::test]
    async fn test_keyboard_interactive_response_count_mismatch() {
        let info = AuthInfoRequest {
            prompts: vec![
                Prompt {
                    text: "a".to_string(),
                    echo: true,
                },
                Prompt {
                    text: "b".to_string(),
                    echo: true,
                },
            ],
            ..AuthInfoRequest::default()
        };
        let (mut session, _) = session(vec![info.to_bytes()]);

        let method = KeyboardInteractiveAuthentication::new(Arc::new(
            |_: &AuthInfoRequest| -> Vec<String> { vec!["only one".to_string()] },
        ));
        let result = method.attempt(&mut session, "alice").await;
        assert!(matches!(result, Err(TetherError::Authentication(_))));
        assert!(!session.factory().is_enabled(INFO_REQUEST));
    }

    #[tokio::test]
    async fn test_publickey_query_then_sign() {
        let (mut session, sent) = session(vec![
            AuthPkOk::new("ssh-ed25519", vec![0xAA, 0xBB]).to_bytes(),
            AuthSuccess::new().to_bytes(),
        ]);
        session.set_session_id(vec![9; 32]);

        let method = PublicKeyAuthentication::new(vec![Box::new(FixedSigner)]);
        let outcome = method.attempt(&mut session, "alice").await.unwrap();
        assert_eq!(outcome, AuthenticationOutcome::Success);

        match sent_request(&sent, 0).method() {
            AuthMethod::PublicKey { signature, .. } => assert!(signature.is_none()),
            other => panic!("Expected publickey query, got {:?}", other),
        }

        let expected = construct_signature_data(
            &[9; 32],
            "alice",
            "ssh-connection",
            "ssh-ed25519",
            &[0xAA, 0xBB],
        );
        match sent_request(&sent, 1).method() {
            AuthMethod::PublicKey { signature, .. } => {
                assert_eq!(signature.as_deref(), Some(&[expected.len() as u8][..]))
            }
            other => panic!("Expected signed publickey request, got {:?}", other),
        }
        assert!(!session.factory().is_enabled(PK_OK));
    }

    #[tokio::test]
    async fn test_publickey_rejected_key() {
        let (mut session, sent) = session(vec![AuthFailure::new(
            vec!["publickey".to_string(), "password".to_string()],
            false,
        )
        .to_bytes()]);

        let method = PublicKeyAuthentication::new(vec![Box::new(FixedSigner)]);
        let outcome = method.attempt(&mut session, "alice").await.unwrap();
        assert!(matches!(outcome, AuthenticationOutcome::Failure { .. }));
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pk_ok_conflicts_with_pending_change_request() {
        let (mut session, _) = session(vec![]);
        session
            .factory_mut()
            .enable_and_activate(PASSWD_CHANGEREQ)
            .unwrap();

        let method = PublicKeyAuthentication::new(vec![Box::new(FixedSigner)]);
        assert!(matches!(
            method.attempt(&mut session, "alice").await,
            Err(TetherError::Dispatch(_))
        ));
    }
}
