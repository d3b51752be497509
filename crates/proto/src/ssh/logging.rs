//! Structured logging for the bootstrap sequence
//!
//! Provides structured, contextual logging using the `tracing` framework.
//! All log messages include the relevant context fields for debugging.
//!
//! # Log Levels
//!
//! - **TRACE**: Raw bytes read during handshakes, message payload sizes
//! - **DEBUG**: Dispatch table changes, proxy handshake steps
//! - **INFO**: Connections established, identification received, authentication result
//! - **WARN**: Denied authentication methods, unexpected but tolerated messages
//! - **ERROR**: Failed connects and handshakes
//!
//! # Example
//!
//! ```no_run
//! use tether_proto::ssh::logging;
//!
//! // Initialize tracing subscriber (in tests or applications)
//! tracing_subscriber::fmt()
//!     .with_env_filter("tether_proto=debug")
//!     .init();
//!
//! logging::log_connect_start("example.com:22", "direct");
//! ```

use tracing::{debug, error, info, trace, warn};

/// Log the start of a connect sequence
///
/// # Arguments
///
/// * `target` - Target `host:port`
/// * `via` - "direct" or the proxy kind
pub fn log_connect_start(target: &str, via: &str) {
    info!(target_addr = target, via = via, "Connecting");
}

/// Log a completed connect sequence
pub fn log_connect_complete(target: &str, via: &str, duration_ms: u64) {
    info!(
        target_addr = target,
        via = via,
        duration_ms = duration_ms,
        "Connection established"
    );
}

/// Log a failed connect sequence
pub fn log_connect_failed(target: &str, via: &str, error: &str) {
    error!(target_addr = target, via = via, error = error, "Connection failed");
}

/// Log a proxy handshake step
///
/// # Arguments
///
/// * `proxy` - Proxy kind ("HTTP", "SOCKS4", "SOCKS5")
/// * `step` - Handshake step (e.g., "greeting", "auth", "connect")
pub fn log_proxy_step(proxy: &str, step: &str) {
    debug!(proxy = proxy, step = step, "Proxy handshake step");
}

/// Log raw bytes received during a handshake
pub fn log_handshake_bytes(stage: &str, bytes: &[u8]) {
    trace!(stage = stage, bytes = %hex::encode(bytes), "Handshake bytes received");
}

/// Log a received identification string
pub fn log_identification(server: &str, banner_lines: usize) {
    info!(
        server_id = server,
        banner_lines = banner_lines,
        "Server identification received"
    );
}

/// Log a dispatch table change
///
/// # Arguments
///
/// * `message` - Canonical message name
/// * `number` - Wire message number
/// * `enabled` - New enabled state
pub fn log_dispatch_change(message: &str, number: u8, enabled: bool) {
    debug!(
        message = message,
        number = number,
        enabled = enabled,
        "Dispatch table updated"
    );
}

/// Log a received message
pub fn log_message_recv(message: &str, size_bytes: usize) {
    trace!(message = message, size_bytes = size_bytes, "Received SSH message");
}

/// Log a message that is skipped by the receive loop
pub fn log_message_skipped(message: &str, detail: &str) {
    debug!(message = message, detail = detail, "Skipped SSH message");
}

/// Log an authentication attempt
///
/// # Arguments
///
/// * `method` - Method name
/// * `attempt` - Attempt number for this method (1-based)
/// * `limit` - Configured attempt limit
pub fn log_auth_attempt(method: &str, attempt: u32, limit: u32) {
    debug!(
        method = method,
        attempt = attempt,
        limit = limit,
        "Authentication attempt"
    );
}

/// Log partial success with the methods the server wants next
pub fn log_auth_partial(method: &str, allowed: &[String]) {
    info!(
        method = method,
        allowed = %allowed.join(","),
        "Authentication partially successful"
    );
}

/// Log a denied authentication method
pub fn log_auth_denied(method: &str, allowed: &[String]) {
    warn!(
        method = method,
        allowed = %allowed.join(","),
        "Authentication method denied"
    );
}

/// Log successful authentication
pub fn log_auth_success(user: &str, method: &str) {
    info!(user = user, method = method, "Authentication successful");
}

/// Log terminal authentication failure
pub fn log_auth_failed(user: &str, error: &str) {
    error!(user = user, error = error, "Authentication failed");
}
