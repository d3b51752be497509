//! SSH authentication protocol messages (RFC 4252, RFC 4256).
//!
//! Client-side codecs for user authentication:
//! - `SSH_MSG_USERAUTH_REQUEST` for "none", "password", "publickey" and
//!   "keyboard-interactive"
//! - the server replies `FAILURE`, `SUCCESS`, `BANNER`
//! - the number-60 family: `PK_OK`, `PASSWD_CHANGEREQ`, `INFO_REQUEST`
//! - `SSH_MSG_USERAUTH_INFO_RESPONSE`
//!
//! # Security
//!
//! Passwords and keyboard-interactive responses are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use tether_proto::ssh::auth::{AuthRequest, AuthMethod};
//!
//! let auth = AuthRequest::new(
//!     "user",
//!     "ssh-connection",
//!     AuthMethod::Password { password: "secret".to_string(), new_password: None },
//! );
//! assert_eq!(auth.to_bytes()[0], 50);
//! ```

use crate::ssh::wire::{
    expect_message, read_bool, read_bytes, read_name_list, read_string, read_u32, write_bool,
    write_bytes, write_name_list, write_string,
};
use bytes::{BufMut, BytesMut};
use tether_platform::{TetherError, TetherResult};
use zeroize::Zeroize;

/// SSH_MSG_USERAUTH_REQUEST
pub const MSG_USERAUTH_REQUEST: u8 = 50;
/// SSH_MSG_USERAUTH_FAILURE
pub const MSG_USERAUTH_FAILURE: u8 = 51;
/// SSH_MSG_USERAUTH_SUCCESS
pub const MSG_USERAUTH_SUCCESS: u8 = 52;
/// SSH_MSG_USERAUTH_BANNER
pub const MSG_USERAUTH_BANNER: u8 = 53;
/// Shared by PK_OK, PASSWD_CHANGEREQ and INFO_REQUEST
pub const MSG_USERAUTH_60: u8 = 60;
/// SSH_MSG_USERAUTH_INFO_RESPONSE
pub const MSG_USERAUTH_INFO_RESPONSE: u8 = 61;

/// SSH authentication method carried by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Query the methods that can continue.
    None,
    /// Password authentication, optionally changing the password.
    Password {
        /// Current password
        password: String,
        /// Replacement password after `PASSWD_CHANGEREQ`
        new_password: Option<String>,
    },
    /// Public key authentication.
    PublicKey {
        /// Algorithm name (e.g., "ssh-ed25519", "rsa-sha2-256")
        algorithm: String,
        /// Public key blob
        public_key: Vec<u8>,
        /// Signature (absent for the acceptability query)
        signature: Option<Vec<u8>>,
    },
    /// Keyboard-interactive authentication (RFC 4256).
    KeyboardInteractive {
        /// Language tag (usually empty)
        language: String,
        /// Submethod hints
        submethods: Vec<String>,
    },
}

impl AuthMethod {
    /// Returns the method name.
    pub fn name(&self) -> &str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Password { .. } => "password",
            AuthMethod::PublicKey { .. } => "publickey",
            AuthMethod::KeyboardInteractive { .. } => "keyboard-interactive",
        }
    }
}

impl Drop for AuthMethod {
    fn drop(&mut self) {
        if let AuthMethod::Password {
            password,
            new_password,
        } = self
        {
            password.zeroize();
            new_password.zeroize();
        }
    }
}

/// SSH_MSG_USERAUTH_REQUEST message (RFC 4252 Section 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    user_name: String,
    service_name: String,
    method: AuthMethod,
}

impl AuthRequest {
    /// Creates a new authentication request.
    ///
    /// # Arguments
    ///
    /// * `user_name` - User name to authenticate as
    /// * `service_name` - Service to start after authentication (usually "ssh-connection")
    /// * `method` - Authentication method
    pub fn new(user_name: &str, service_name: &str, method: AuthMethod) -> Self {
        Self {
            user_name: user_name.to_string(),
            service_name: service_name.to_string(),
            method,
        }
    }

    /// Returns the user name.
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Returns the service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns the authentication method.
    pub fn method(&self) -> &AuthMethod {
        &self.method
    }

    /// Serializes the authentication request.
    ///
    /// Format (RFC 4252 Section 5):
    /// ```text
    /// byte      SSH_MSG_USERAUTH_REQUEST (50)
    /// string    user name
    /// string    service name
    /// string    method name
    /// ....      method specific fields
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MSG_USERAUTH_REQUEST);
        write_string(&mut buf, &self.user_name);
        write_string(&mut buf, &self.service_name);
        write_string(&mut buf, self.method.name());

        match &self.method {
            AuthMethod::None => {}
            AuthMethod::Password {
                password,
                new_password,
            } => {
                write_bool(&mut buf, new_password.is_some());
                write_string(&mut buf, password);
                if let Some(new_password) = new_password {
                    write_string(&mut buf, new_password);
                }
            }
            AuthMethod::PublicKey {
                algorithm,
                public_key,
                signature,
            } => {
                write_bool(&mut buf, signature.is_some());
                write_string(&mut buf, algorithm);
                write_bytes(&mut buf, public_key);
                if let Some(sig) = signature {
                    write_bytes(&mut buf, sig);
                }
            }
            AuthMethod::KeyboardInteractive {
                language,
                submethods,
            } => {
                write_string(&mut buf, language);
                write_name_list(&mut buf, submethods);
            }
        }

        buf.to_vec()
    }

    /// Parses an authentication request.
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::Protocol`] if the data is invalid.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, MSG_USERAUTH_REQUEST, "SSH_MSG_USERAUTH_REQUEST")?;
        let mut offset = 1;

        let user_name = read_string(data, &mut offset)?;
        let service_name = read_string(data, &mut offset)?;
        let method_name = read_string(data, &mut offset)?;

        let method = match method_name.as_str() {
            "none" => AuthMethod::None,
            "password" => {
                let changing = read_bool(data, &mut offset)?;
                let password = read_string(data, &mut offset)?;
                let new_password = if changing {
                    Some(read_string(data, &mut offset)?)
                } else {
                    None
                };
                AuthMethod::Password {
                    password,
                    new_password,
                }
            }
            "publickey" => {
                let has_signature = read_bool(data, &mut offset)?;
                let algorithm = read_string(data, &mut offset)?;
                let public_key = read_bytes(data, &mut offset)?;
                let signature = if has_signature {
                    Some(read_bytes(data, &mut offset)?)
                } else {
                    None
                };
                AuthMethod::PublicKey {
                    algorithm,
                    public_key,
                    signature,
                }
            }
            "keyboard-interactive" => AuthMethod::KeyboardInteractive {
                language: read_string(data, &mut offset)?,
                submethods: read_name_list(data, &mut offset)?,
            },
            _ => {
                return Err(TetherError::Protocol(format!(
                    "Unsupported authentication method: '{}'",
                    method_name
                )))
            }
        };

        Ok(Self {
            user_name,
            service_name,
            method,
        })
    }
}

/// SSH_MSG_USERAUTH_FAILURE message (RFC 4252 Section 5.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthFailure {
    methods_can_continue: Vec<String>,
    partial_success: bool,
}

impl AuthFailure {
    /// Creates a new authentication failure message.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tether_proto::ssh::auth::AuthFailure;
    ///
    /// let failure = AuthFailure::new(
    ///     vec!["publickey".to_string(), "password".to_string()],
    ///     false,
    /// );
    /// assert!(!failure.partial_success());
    /// ```
    pub fn new(methods: Vec<String>, partial_success: bool) -> Self {
        Self {
            methods_can_continue: methods,
            partial_success,
        }
    }

    /// Returns the methods that can continue, in server order.
    pub fn methods_can_continue(&self) -> &[String] {
        &self.methods_can_continue
    }

    /// Returns whether the last request succeeded but more is required.
    pub fn partial_success(&self) -> bool {
        self.partial_success
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MSG_USERAUTH_FAILURE);
        write_name_list(&mut buf, &self.methods_can_continue);
        write_bool(&mut buf, self.partial_success);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, MSG_USERAUTH_FAILURE, "SSH_MSG_USERAUTH_FAILURE")?;
        let mut offset = 1;
        let methods_can_continue = read_name_list(data, &mut offset)?;
        let partial_success = read_bool(data, &mut offset)?;
        Ok(Self {
            methods_can_continue,
            partial_success,
        })
    }
}

/// SSH_MSG_USERAUTH_SUCCESS message (RFC 4252 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSuccess;

impl AuthSuccess {
    /// Creates a new authentication success message.
    pub fn new() -> Self {
        Self
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![MSG_USERAUTH_SUCCESS]
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, MSG_USERAUTH_SUCCESS, "SSH_MSG_USERAUTH_SUCCESS")?;
        Ok(Self)
    }
}

impl Default for AuthSuccess {
    fn default() -> Self {
        Self::new()
    }
}

/// SSH_MSG_USERAUTH_BANNER message (RFC 4252 Section 5.4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthBanner {
    message: String,
    language_tag: String,
}

impl AuthBanner {
    /// Creates a new banner message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            language_tag: String::new(),
        }
    }

    /// Returns the banner message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the language tag.
    pub fn language_tag(&self) -> &str {
        &self.language_tag
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MSG_USERAUTH_BANNER);
        write_string(&mut buf, &self.message);
        write_string(&mut buf, &self.language_tag);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, MSG_USERAUTH_BANNER, "SSH_MSG_USERAUTH_BANNER")?;
        let mut offset = 1;
        let message = read_string(data, &mut offset)?;
        let language_tag = read_string(data, &mut offset)?;
        Ok(Self {
            message,
            language_tag,
        })
    }
}

/// SSH_MSG_USERAUTH_PK_OK message (RFC 4252 Section 7).
///
/// Sent by the server to indicate that the public key is acceptable
/// for authentication (in response to a try-then-sign query).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthPkOk {
    algorithm: String,
    public_key: Vec<u8>,
}

impl AuthPkOk {
    /// Creates a new SSH_MSG_USERAUTH_PK_OK message.
    pub fn new(algorithm: impl Into<String>, public_key: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.into(),
            public_key,
        }
    }

    /// Returns the algorithm name.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the public key blob.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Serializes to bytes.
    ///
    /// Format (RFC 4252 Section 7):
    /// ```text
    /// byte      SSH_MSG_USERAUTH_PK_OK (60)
    /// string    public key algorithm name
    /// string    public key blob
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MSG_USERAUTH_60);
        write_string(&mut buf, &self.algorithm);
        write_bytes(&mut buf, &self.public_key);
        buf.to_vec()
    }

    /// Parses from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::Protocol`] if the data is invalid.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, MSG_USERAUTH_60, "SSH_MSG_USERAUTH_PK_OK")?;
        let mut offset = 1;
        let algorithm = read_string(data, &mut offset)?;
        let public_key = read_bytes(data, &mut offset)?;
        Ok(Self {
            algorithm,
            public_key,
        })
    }
}

/// SSH_MSG_USERAUTH_PASSWD_CHANGEREQ message (RFC 4252 Section 8).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthPasswdChangeReq {
    prompt: String,
    language_tag: String,
}

impl AuthPasswdChangeReq {
    /// Creates a new change request.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            language_tag: String::new(),
        }
    }

    /// Returns the server's prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MSG_USERAUTH_60);
        write_string(&mut buf, &self.prompt);
        write_string(&mut buf, &self.language_tag);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, MSG_USERAUTH_60, "SSH_MSG_USERAUTH_PASSWD_CHANGEREQ")?;
        let mut offset = 1;
        let prompt = read_string(data, &mut offset)?;
        let language_tag = read_string(data, &mut offset)?;
        Ok(Self {
            prompt,
            language_tag,
        })
    }
}

/// One keyboard-interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Prompt text
    pub text: String,
    /// Whether the response may be echoed
    pub echo: bool,
}

/// SSH_MSG_USERAUTH_INFO_REQUEST message (RFC 4256 Section 3.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInfoRequest {
    /// Request name
    pub name: String,
    /// Instruction text
    pub instruction: String,
    /// Language tag
    pub language_tag: String,
    /// Prompts, in order
    pub prompts: Vec<Prompt>,
}

impl AuthInfoRequest {
    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MSG_USERAUTH_60);
        write_string(&mut buf, &self.name);
        write_string(&mut buf, &self.instruction);
        write_string(&mut buf, &self.language_tag);
        buf.put_u32(self.prompts.len() as u32);
        for prompt in &self.prompts {
            write_string(&mut buf, &prompt.text);
            write_bool(&mut buf, prompt.echo);
        }
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(data, MSG_USERAUTH_60, "SSH_MSG_USERAUTH_INFO_REQUEST")?;
        let mut offset = 1;
        let name = read_string(data, &mut offset)?;
        let instruction = read_string(data, &mut offset)?;
        let language_tag = read_string(data, &mut offset)?;

        let count = read_u32(data, &mut offset)? as usize;
        // Each prompt needs at least 5 bytes; reject absurd counts early
        if count > (data.len() - offset) / 5 {
            return Err(TetherError::Protocol(format!(
                "USERAUTH_INFO_REQUEST declares {} prompts but carries {} bytes",
                count,
                data.len() - offset
            )));
        }

        let mut prompts = Vec::with_capacity(count);
        for _ in 0..count {
            let text = read_string(data, &mut offset)?;
            let echo = read_bool(data, &mut offset)?;
            prompts.push(Prompt { text, echo });
        }

        Ok(Self {
            name,
            instruction,
            language_tag,
            prompts,
        })
    }
}

/// SSH_MSG_USERAUTH_INFO_RESPONSE message (RFC 4256 Section 3.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfoResponse {
    responses: Vec<String>,
}

impl AuthInfoResponse {
    /// Creates a response carrying one answer per prompt.
    pub fn new(responses: Vec<String>) -> Self {
        Self { responses }
    }

    /// Returns the answers.
    pub fn responses(&self) -> &[String] {
        &self.responses
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MSG_USERAUTH_INFO_RESPONSE);
        buf.put_u32(self.responses.len() as u32);
        for response in &self.responses {
            write_string(&mut buf, response);
        }
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> TetherResult<Self> {
        expect_message(
            data,
            MSG_USERAUTH_INFO_RESPONSE,
            "SSH_MSG_USERAUTH_INFO_RESPONSE",
        )?;
        let mut offset = 1;
        let count = read_u32(data, &mut offset)? as usize;
        let mut responses = Vec::new();
        for _ in 0..count {
            responses.push(read_string(data, &mut offset)?);
        }
        Ok(Self { responses })
    }
}

impl Drop for AuthInfoResponse {
    fn drop(&mut self) {
        self.responses.zeroize();
    }
}

/// Constructs the data to be signed for public key authentication (RFC 4252 Section 7).
///
/// # Format
///
/// ```text
/// string    session identifier
/// byte      SSH_MSG_USERAUTH_REQUEST (50)
/// string    user name
/// string    service name
/// string    "publickey"
/// boolean   TRUE (has signature)
/// string    public key algorithm name
/// string    public key blob
/// ```
pub fn construct_signature_data(
    session_id: &[u8],
    user_name: &str,
    service_name: &str,
    algorithm: &str,
    public_key_blob: &[u8],
) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_bytes(&mut buf, session_id);
    buf.put_u8(MSG_USERAUTH_REQUEST);
    write_string(&mut buf, user_name);
    write_string(&mut buf, service_name);
    write_string(&mut buf, "publickey");
    write_bool(&mut buf, true);
    write_string(&mut buf, algorithm);
    write_bytes(&mut buf, public_key_blob);
    buf.to_vec()
}
