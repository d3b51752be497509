//! Direct TCP connector.

use super::Connector;
use crate::ssh::config::ConnectionEndpoint;
use crate::ssh::deadline::Deadline;
use tether_platform::TetherResult;
use tokio::net::TcpStream;

/// Connects straight to the target without a proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectConnector;

#[async_trait::async_trait]
impl Connector for DirectConnector {
    fn via(&self) -> &'static str {
        "direct"
    }

    async fn connect(&self, endpoint: &ConnectionEndpoint) -> TetherResult<TcpStream> {
        let deadline = Deadline::after(endpoint.timeout);
        open(&endpoint.host, endpoint.port, &deadline).await
    }
}

/// Opens a TCP connection within the remaining budget.
///
/// Resolution and refusal errors are returned unchanged.
pub(crate) async fn open(host: &str, port: u16, deadline: &Deadline) -> TetherResult<TcpStream> {
    let stream = deadline
        .run(
            &format!("Connection to {}:{}", host, port),
            TcpStream::connect((host, port)),
        )
        .await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_platform::TetherError;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_direct_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let endpoint = ConnectionEndpoint::new("127.0.0.1", port, Duration::from_secs(2));
        let stream = DirectConnector.connect(&endpoint).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_direct_connect_refused_is_io_error() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let endpoint = ConnectionEndpoint::new("127.0.0.1", port, Duration::from_secs(2));
        let result = DirectConnector.connect(&endpoint).await;
        match result {
            Err(TetherError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused)
            }
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_direct_connect_unresolvable_host() {
        let endpoint = ConnectionEndpoint::new("host.invalid", 22, Duration::from_secs(5));
        let result = DirectConnector.connect(&endpoint).await;
        // Resolution failures surface unchanged (or as a timeout on very slow resolvers)
        assert!(matches!(
            result,
            Err(TetherError::Io(_)) | Err(TetherError::Timeout { .. })
        ));
    }
}
