//! Authentication orchestrator (RFC 4252).
//!
//! Drives the configured [`AuthenticationMethod`]s until the server accepts
//! the user or no method is left to try. The server steers the negotiation:
//! every `SSH_MSG_USERAUTH_FAILURE` carries the methods that may continue,
//! and a partial success means "correct, but more is required".
//!
//! Selection rules:
//!
//! 1. Eligible methods are the configured ones (in client order) that the
//!    server allows and that have not failed outright.
//! 2. A method that was never attempted goes first; otherwise the first
//!    eligible method still below the attempt limit is retried.
//! 3. No method is attempted more than the limit.
//!
//! The loop is bounded by `methods × limit` attempts.

use crate::ssh::logging;
use crate::ssh::methods::NoneAuthentication;
use crate::ssh::session::Session;
use std::collections::{HashMap, HashSet};
use tether_platform::{TetherError, TetherResult};
use tracing::debug;

/// Default number of attempts allowed per method.
pub const PARTIAL_SUCCESS_LIMIT: u32 = 5;

/// Messages that are valid for the whole authentication phase.
const AUTHENTICATION_MESSAGES: &[&str] = &[
    "SSH_MSG_USERAUTH_SUCCESS",
    "SSH_MSG_USERAUTH_FAILURE",
    "SSH_MSG_USERAUTH_BANNER",
];

/// Result of one attempt of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationOutcome {
    /// The user is authenticated.
    Success,
    /// Accepted, but the server requires one of `allowed` next.
    PartialSuccess {
        /// Methods that may continue
        allowed: Vec<String>,
    },
    /// Rejected; `allowed` lists the methods that may continue.
    Failure {
        /// Methods that may continue
        allowed: Vec<String>,
    },
}

/// A single authentication method.
#[async_trait::async_trait]
pub trait AuthenticationMethod: Send + Sync {
    /// Method name as sent on the wire (e.g. "password").
    fn name(&self) -> &str;

    /// Runs one attempt for `username`.
    ///
    /// Methods enable the method-specific messages they expect (such as
    /// `SSH_MSG_USERAUTH_PK_OK`) only for the duration of the attempt.
    async fn attempt(
        &self,
        session: &mut Session,
        username: &str,
    ) -> TetherResult<AuthenticationOutcome>;
}

/// Runs the authentication negotiation for one user.
#[derive(Debug, Clone)]
pub struct AuthenticationOrchestrator {
    username: String,
    attempt_limit: u32,
    probe_with_none: bool,
}

impl AuthenticationOrchestrator {
    /// Creates an orchestrator for `username` with default settings.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            attempt_limit: PARTIAL_SUCCESS_LIMIT,
            probe_with_none: true,
        }
    }

    /// Sets the per-method attempt limit.
    pub fn with_attempt_limit(mut self, limit: u32) -> Self {
        self.attempt_limit = limit;
        self
    }

    /// Enables or disables the initial "none" request.
    pub fn with_none_probe(mut self, enabled: bool) -> Self {
        self.probe_with_none = enabled;
        self
    }

    /// Authenticates the user with `methods`.
    ///
    /// # Errors
    ///
    /// - [`TetherError::Authentication`] if every method is exhausted or denied
    /// - [`TetherError::Disconnected`] if the server disconnects
    /// - any transport or protocol error raised by a method
    pub async fn authenticate(
        &self,
        session: &mut Session,
        methods: &[Box<dyn AuthenticationMethod>],
    ) -> TetherResult<()> {
        for name in AUTHENTICATION_MESSAGES {
            session.factory_mut().enable_and_activate(name)?;
        }

        let result = self.negotiate(session, methods).await;

        for name in AUTHENTICATION_MESSAGES {
            if let Err(e) = session.factory_mut().disable_and_deactivate(name) {
                debug!("Failed to disable {}: {}", name, e);
            }
        }

        match &result {
            Ok(method) => logging::log_auth_success(&self.username, method),
            Err(e) => logging::log_auth_failed(&self.username, &e.to_string()),
        }
        result.map(|_| ())
    }

    /// Returns the name of the method that completed authentication.
    async fn negotiate(
        &self,
        session: &mut Session,
        methods: &[Box<dyn AuthenticationMethod>],
    ) -> TetherResult<String> {
        // None means every configured method is allowed
        let mut allowed: Option<Vec<String>> = None;

        if self.probe_with_none {
            match NoneAuthentication.attempt(session, &self.username).await? {
                AuthenticationOutcome::Success => return Ok("none".to_string()),
                AuthenticationOutcome::PartialSuccess { allowed: next }
                | AuthenticationOutcome::Failure { allowed: next } => allowed = Some(next),
            }
        }

        let mut attempts: HashMap<&str, u32> = HashMap::new();
        let mut denied: HashSet<&str> = HashSet::new();
        let mut last_failure: Option<&str> = None;

        loop {
            let eligible: Vec<&dyn AuthenticationMethod> = methods
                .iter()
                .map(|m| m.as_ref())
                .filter(|m| {
                    allowed
                        .as_ref()
                        .map_or(true, |names| names.iter().any(|n| n == m.name()))
                })
                .filter(|m| !denied.contains(m.name()))
                .collect();

            if eligible.is_empty() {
                let message = match last_failure {
                    Some(name) => format!("Permission denied ({}).", name),
                    None => "No suitable authentication method found.".to_string(),
                };
                return Err(TetherError::Authentication(message));
            }

            let method = eligible
                .iter()
                .find(|m| !attempts.contains_key(m.name()))
                .or_else(|| {
                    eligible
                        .iter()
                        .find(|m| attempts.get(m.name()).copied().unwrap_or(0) < self.attempt_limit)
                })
                .copied()
                .ok_or_else(|| {
                    TetherError::Authentication(format!(
                        "Reached authentication attempt limit for method ({}).",
                        eligible[0].name()
                    ))
                })?;

            let count = attempts.entry(method.name()).or_insert(0);
            *count += 1;
            logging::log_auth_attempt(method.name(), *count, self.attempt_limit);

            match method.attempt(session, &self.username).await? {
                AuthenticationOutcome::Success => return Ok(method.name().to_string()),
                AuthenticationOutcome::PartialSuccess { allowed: next } => {
                    logging::log_auth_partial(method.name(), &next);
                    last_failure = None;
                    allowed = Some(next);
                }
                AuthenticationOutcome::Failure { allowed: next } => {
                    logging::log_auth_denied(method.name(), &next);
                    denied.insert(method.name());
                    last_failure = Some(method.name());
                    allowed = Some(next);
                }
            }
        }
    }
}
