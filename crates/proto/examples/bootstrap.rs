//! Connect and identify example
//!
//! This example demonstrates how to:
//! - Connect to an SSH server, optionally through a proxy
//! - Exchange identification strings
//! - Print banner lines sent before the identification
//!
//! Usage:
//!   cargo run --example bootstrap <host> <port> [socks5|socks4|http <proxy-host> <proxy-port>]
//!
//! Example:
//!   cargo run --example bootstrap 127.0.0.1 22 socks5 127.0.0.1 1080
//!
//! Set `RUST_LOG=tether_proto=debug` to see proxy handshake steps.

use std::env;
use std::sync::Arc;
use std::time::Duration;
use tether_proto::ssh::client::SshClient;
use tether_proto::ssh::config::{ProxyConfiguration, ProxyKind, SshClientConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 && args.len() != 6 {
        eprintln!(
            "Usage: {} <host> <port> [socks5|socks4|http <proxy-host> <proxy-port>]",
            args[0]
        );
        std::process::exit(1);
    }

    let user = env::var("USER").unwrap_or_else(|_| "tether".to_string());
    let mut config = SshClientConfig::new(args[1].as_str(), args[2].parse()?, user)
        .with_timeout(Duration::from_secs(10));

    if args.len() == 6 {
        let kind = match args[3].as_str() {
            "socks5" => ProxyKind::Socks5,
            "socks4" => ProxyKind::Socks4,
            "http" => ProxyKind::Http,
            other => return Err(format!("unknown proxy kind: {}", other).into()),
        };
        config = config.with_proxy(ProxyConfiguration::new(kind, args[4].as_str(), args[5].parse()?));
    }

    println!("Connecting to {}...", config.endpoint);

    let connection = SshClient::connect_with_banner_handler(
        &config,
        Some(Arc::new(|line: &str| println!("  banner: {}", line))),
    )
    .await?;

    println!("Connected");
    println!("  Client: {}", connection.client());
    println!("  Server: {}", connection.server());
    if let Some(comments) = connection.server().comments() {
        println!("  Comments: {}", comments);
    }

    Ok(())
}
