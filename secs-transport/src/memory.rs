//! In-process transport over `tokio::io::duplex`

use crate::stream::{Connector, StreamPair};
use async_trait::async_trait;
use secs_core::{SecsError, SecsResult};
use std::io;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

enum Role {
    Dial(mpsc::Sender<DuplexStream>),
    Listen(mpsc::Receiver<DuplexStream>),
}

/// Connector endpoint of an in-memory link.
///
/// Every `establish` on the dialing side creates a fresh duplex stream and
/// hands the far end to the listening side.
pub struct MemoryConnector {
    role: Role,
    buffer: usize,
}

/// Dialing and listening endpoints joined together
pub fn memory_pair(buffer: usize) -> (MemoryConnector, MemoryConnector) {
    let (sender, receiver) = mpsc::channel(1);
    (
        MemoryConnector {
            role: Role::Dial(sender),
            buffer,
        },
        MemoryConnector {
            role: Role::Listen(receiver),
            buffer,
        },
    )
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn establish(&mut self) -> SecsResult<StreamPair> {
        match &mut self.role {
            Role::Dial(sender) => {
                let (local, remote) = tokio::io::duplex(self.buffer);
                sender.send(remote).await.map_err(|_| {
                    SecsError::Connection(io::Error::new(
                        io::ErrorKind::ConnectionRefused,
                        "memory listener dropped",
                    ))
                })?;
                Ok(StreamPair::from_stream(local))
            }
            Role::Listen(receiver) => receiver
                .recv()
                .await
                .map(StreamPair::from_stream)
                .ok_or(SecsError::ConnectionClosed),
        }
    }

    fn description(&self) -> String {
        match self.role {
            Role::Dial(_) => "memory dialer".to_string(),
            Role::Listen(_) => "memory listener".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_pair_connects_repeatedly() {
        let (mut dialer, mut listener) = memory_pair(64);
        for round in 0..2u8 {
            let mut near = dialer.establish().await.unwrap();
            let mut far = listener.establish().await.unwrap();
            near.writer.write_all(&[round]).await.unwrap();
            let mut byte = [0u8; 1];
            far.reader.read_exact(&mut byte).await.unwrap();
            assert_eq!(byte[0], round);
        }
    }

    #[tokio::test]
    async fn test_dial_fails_without_listener() {
        let (mut dialer, listener) = memory_pair(64);
        drop(listener);
        assert!(matches!(dialer.establish().await, Err(SecsError::Connection(_))));
    }
}
