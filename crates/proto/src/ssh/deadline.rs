//! End-to-end timeout budget.
//!
//! A [`Deadline`] is created once at the start of a multi-step handshake and
//! every blocking step waits only for what is left of it, so a slow sequence
//! of reads cannot exceed the configured total.

use std::future::Future;
use std::io;
use std::time::Duration;
use tether_platform::{TetherError, TetherResult};
use tokio::time::Instant;

/// Shared timeout budget for one connect or exchange sequence.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    expires: Instant,
    timeout: Duration,
}

impl Deadline {
    /// Starts a budget of `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires: started + timeout,
            timeout,
        }
    }

    /// Configured budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time spent so far.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the budget runs out (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.expires.saturating_duration_since(Instant::now())
    }

    /// Builds the timeout error for `operation`.
    pub fn expired(&self, operation: &str) -> TetherError {
        TetherError::Timeout {
            operation: operation.to_string(),
            configured: self.timeout,
            elapsed: self.elapsed(),
        }
    }

    /// Runs an I/O future within the remaining budget.
    ///
    /// I/O errors are passed through unchanged as [`TetherError::Io`].
    pub async fn run<T, F>(&self, operation: &str, future: F) -> TetherResult<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        match tokio::time::timeout_at(self.expires, future).await {
            Ok(result) => result.map_err(TetherError::Io),
            Err(_) => Err(self.expired(operation)),
        }
    }
}
