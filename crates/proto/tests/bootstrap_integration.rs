//! End-to-end bootstrap tests against a scripted loopback server.
//!
//! These tests validate the complete client flow:
//! - Connect and identification exchange with banner lines
//! - `ssh-userauth` service request
//! - Method negotiation with partial success and keyboard-interactive rounds

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_platform::TetherError;
use tether_proto::ssh::auth::{
    AuthFailure, AuthInfoRequest, AuthInfoResponse, AuthMethod, AuthRequest, AuthSuccess, Prompt,
};
use tether_proto::ssh::client::SshClient;
use tether_proto::ssh::config::SshClientConfig;
use tether_proto::ssh::message::ServiceAccept;
use tether_proto::ssh::methods::{KeyboardInteractiveAuthentication, PasswordAuthentication};
use tether_proto::ssh::orchestrator::AuthenticationMethod;
use tether_proto::ssh::packet::Packet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn send(socket: &mut TcpStream, payload: Vec<u8>) {
    let packet = Packet::new(payload).unwrap();
    socket.write_all(&packet.to_bytes()).await.unwrap();
}

async fn receive(socket: &mut TcpStream) -> Vec<u8> {
    Packet::read_from(socket).await.unwrap().into_payload()
}

/// Accepts one client, exchanges identification strings and the service
/// request, then hands the socket to `script`.
async fn serve<F, Fut>(script: F) -> (u16, tokio::task::JoinHandle<Vec<String>>)
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Vec<String>> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket
            .write_all(b"Welcome to the test host\r\nSSH-2.0-Scripted_1.0\r\n")
            .await
            .unwrap();

        let mut byte = [0u8; 1];
        let mut line = Vec::new();
        while byte[0] != b'\n' {
            socket.read_exact(&mut byte).await.unwrap();
            line.push(byte[0]);
        }
        assert!(line.starts_with(b"SSH-2.0-Tether_"));

        let service = receive(&mut socket).await;
        assert_eq!(&service[5..], b"ssh-userauth");
        send(
            &mut socket,
            ServiceAccept {
                service_name: "ssh-userauth".to_string(),
            }
            .to_bytes(),
        )
        .await;

        script(socket).await
    });

    (port, handle)
}

fn config(port: u16) -> SshClientConfig {
    SshClientConfig::new("127.0.0.1", port, "alice").with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_password_then_keyboard_interactive() -> Result<(), Box<dyn std::error::Error>> {
    let (port, server) = serve(|mut socket| async move {
        let mut seen = Vec::new();

        let none = AuthRequest::from_bytes(&receive(&mut socket).await).unwrap();
        seen.push(none.method().name().to_string());
        send(
            &mut socket,
            AuthFailure::new(
                vec!["password".to_string(), "publickey".to_string()],
                false,
            )
            .to_bytes(),
        )
        .await;

        let password = AuthRequest::from_bytes(&receive(&mut socket).await).unwrap();
        seen.push(password.method().name().to_string());
        assert!(matches!(
            password.method(),
            AuthMethod::Password { password, .. } if password == "secret"
        ));
        send(
            &mut socket,
            AuthFailure::new(vec!["keyboard-interactive".to_string()], true).to_bytes(),
        )
        .await;

        let interactive = AuthRequest::from_bytes(&receive(&mut socket).await).unwrap();
        seen.push(interactive.method().name().to_string());
        let info = AuthInfoRequest {
            name: "Second factor".to_string(),
            prompts: vec![Prompt {
                text: "Code: ".to_string(),
                echo: false,
            }],
            ..AuthInfoRequest::default()
        };
        send(&mut socket, info.to_bytes()).await;

        let response = AuthInfoResponse::from_bytes(&receive(&mut socket).await).unwrap();
        seen.extend(response.responses().iter().cloned());
        send(&mut socket, AuthSuccess::new().to_bytes()).await;

        seen
    })
    .await;

    let banner = Arc::new(Mutex::new(Vec::<String>::new()));
    let lines = Arc::clone(&banner);
    let connection = SshClient::connect_with_banner_handler(
        &config(port),
        Some(Arc::new(move |line: &str| {
            lines.lock().unwrap().push(line.to_string())
        })),
    )
    .await?;
    assert_eq!(connection.server().software_version(), "Scripted_1.0");
    assert_eq!(
        *banner.lock().unwrap(),
        vec!["Welcome to the test host".to_string()]
    );

    let mut session = connection.into_session();
    let methods: Vec<Box<dyn AuthenticationMethod>> = vec![
        Box::new(PasswordAuthentication::new("secret")),
        Box::new(KeyboardInteractiveAuthentication::new(Arc::new(
            |request: &AuthInfoRequest| -> Vec<String> {
                request.prompts.iter().map(|_| "123456".to_string()).collect()
            },
        ))),
    ];
    SshClient::authenticate(&mut session, &config(port), &methods).await?;

    assert_eq!(
        server.await?,
        vec!["none", "password", "keyboard-interactive", "123456"]
    );
    Ok(())
}

#[tokio::test]
async fn test_every_method_denied() -> Result<(), Box<dyn std::error::Error>> {
    let (port, server) = serve(|mut socket| async move {
        let mut seen = Vec::new();
        for _ in 0..2 {
            let request = AuthRequest::from_bytes(&receive(&mut socket).await).unwrap();
            seen.push(request.method().name().to_string());
            send(
                &mut socket,
                AuthFailure::new(vec!["password".to_string()], false).to_bytes(),
            )
            .await;
        }
        seen
    })
    .await;

    let connection = SshClient::connect(&config(port)).await?;
    let mut session = connection.into_session();
    let methods: Vec<Box<dyn AuthenticationMethod>> =
        vec![Box::new(PasswordAuthentication::new("wrong"))];

    match SshClient::authenticate(&mut session, &config(port), &methods).await {
        Err(TetherError::Authentication(message)) => {
            assert_eq!(message, "Permission denied (password).")
        }
        other => panic!("Expected authentication error, got {:?}", other),
    }
    assert_eq!(server.await?, vec!["none", "password"]);
    Ok(())
}

#[tokio::test]
async fn test_server_disconnect_during_authentication() -> Result<(), Box<dyn std::error::Error>> {
    let (port, server) = serve(|mut socket| async move {
        receive(&mut socket).await;
        let mut disconnect = vec![1, 0, 0, 0, 2];
        disconnect.extend_from_slice(&[0, 0, 0, 3]);
        disconnect.extend_from_slice(b"bye");
        disconnect.extend_from_slice(&[0, 0, 0, 0]);
        send(&mut socket, disconnect).await;
        Vec::new()
    })
    .await;

    let connection = SshClient::connect(&config(port)).await?;
    let mut session = connection.into_session();
    let methods: Vec<Box<dyn AuthenticationMethod>> =
        vec![Box::new(PasswordAuthentication::new("secret"))];

    match SshClient::authenticate(&mut session, &config(port), &methods).await {
        Err(TetherError::Disconnected {
            reason_code,
            description,
        }) => {
            assert_eq!(reason_code, 2);
            assert_eq!(description, "bye");
        }
        other => panic!("Expected disconnect, got {:?}", other),
    }
    server.await?;
    Ok(())
}
