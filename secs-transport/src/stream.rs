//! Stream abstraction for the transport layer

use async_trait::async_trait;
use secs_core::SecsResult;
use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

/// Read half of an established byte stream
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an established byte stream
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established byte stream split into independently owned halves.
///
/// The session layer gives the reader to its receive task and keeps the
/// writer behind a lock shared by every sender.
pub struct StreamPair {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub peer: Option<SocketAddr>,
}

impl StreamPair {
    pub fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader,
            writer,
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Build a pair from any full-duplex stream
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(Box::new(reader), Box::new(writer))
    }
}

impl fmt::Debug for StreamPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPair").field("peer", &self.peer).finish()
    }
}

/// Transport layer trait: produces one byte stream per connection attempt.
///
/// Active implementations dial the peer, passive ones wait for an incoming
/// connection. The session driver calls `establish` again after every
/// disconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new connection
    async fn establish(&mut self) -> SecsResult<StreamPair>;

    /// Human readable endpoint for logging
    fn description(&self) -> String;
}
