//! TCP transport implementation

use crate::stream::{Connector, StreamPair};
use async_trait::async_trait;
use secs_core::{SecsError, SecsResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// TCP transport layer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpSettings {
    /// Remote address (active) or local bind address (passive)
    pub address: SocketAddr,
    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
    pub nodelay: bool,
}

impl TcpSettings {
    /// Create new TCP settings
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            connect_timeout: Duration::from_secs(5),
            nodelay: true,
        }
    }

    /// Create TCP settings from an address string
    pub fn from_address(address: &str) -> SecsResult<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| SecsError::InvalidData(format!("Invalid TCP address: {}", e)))?;
        Ok(Self::new(addr))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

fn into_pair(stream: TcpStream, peer: SocketAddr, nodelay: bool) -> SecsResult<StreamPair> {
    stream.set_nodelay(nodelay)?;
    let (reader, writer) = stream.into_split();
    Ok(StreamPair::new(Box::new(reader), Box::new(writer)).with_peer(peer))
}

/// Active TCP endpoint: dials the configured address on every `establish`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    settings: TcpSettings,
}

impl TcpConnector {
    pub fn new(settings: TcpSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn establish(&mut self) -> SecsResult<StreamPair> {
        let address = self.settings.address;
        let connect = TcpStream::connect(address);
        let stream = tokio::time::timeout(self.settings.connect_timeout, connect)
            .await
            .map_err(|_| SecsError::Timeout)??;
        log::info!("Connected to {}", address);
        into_pair(stream, address, self.settings.nodelay)
    }

    fn description(&self) -> String {
        format!("tcp://{} (active)", self.settings.address)
    }
}

/// Passive TCP endpoint: binds once, then accepts one peer per `establish`
#[derive(Debug)]
pub struct TcpAcceptor {
    settings: TcpSettings,
    listener: Option<TcpListener>,
}

impl TcpAcceptor {
    /// Create an acceptor that binds lazily on first use
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            settings,
            listener: None,
        }
    }

    /// Bind immediately, so the caller can learn the actual local address
    pub async fn bind(settings: TcpSettings) -> SecsResult<Self> {
        let listener = TcpListener::bind(settings.address).await?;
        log::info!("Listening on {}", listener.local_addr()?);
        Ok(Self {
            settings,
            listener: Some(listener),
        })
    }

    /// Local address once bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }
}

#[async_trait]
impl Connector for TcpAcceptor {
    async fn establish(&mut self) -> SecsResult<StreamPair> {
        if self.listener.is_none() {
            let listener = TcpListener::bind(self.settings.address).await?;
            log::info!("Listening on {}", listener.local_addr()?);
            self.listener = Some(listener);
        }
        let listener = self.listener.as_ref().ok_or_else(|| {
            SecsError::InvalidState("TCP listener not bound".to_string())
        })?;
        let (stream, peer) = listener.accept().await?;
        log::info!("Accepted connection from {}", peer);
        into_pair(stream, peer, self.settings.nodelay)
    }

    fn description(&self) -> String {
        let address = self.local_addr().unwrap_or(self.settings.address);
        format!("tcp://{} (passive)", address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_test::assert_ok;

    #[test]
    fn test_settings_from_address() {
        let settings = TcpSettings::from_address("127.0.0.1:5000").unwrap();
        assert_eq!(settings.address.port(), 5000);
        assert!(settings.nodelay);
        assert!(TcpSettings::from_address("not an address").is_err());
    }

    #[tokio::test]
    async fn test_connector_and_acceptor_exchange_bytes() {
        let settings = TcpSettings::from_address("127.0.0.1:0").unwrap();
        let mut acceptor = TcpAcceptor::bind(settings).await.unwrap();
        let address = acceptor.local_addr().unwrap();
        let mut connector = TcpConnector::new(TcpSettings::new(address));

        let accept = tokio::spawn(async move { acceptor.establish().await });
        let mut active = assert_ok!(connector.establish().await);
        let mut passive = assert_ok!(accept.await.unwrap());

        active.writer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        passive.reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        assert_eq!(active.peer, Some(address));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let mut connector = TcpConnector::new(TcpSettings::new(address));
        assert!(connector.establish().await.is_err());
        assert!(connector.description().contains("active"));
    }
}
