//! Length-prefixed HSMS framing over an async byte stream

use crate::header::{MessageHeader, HEADER_LENGTH, LENGTH_PREFIX_LENGTH};
use crate::message::Frame;
use bytes::Bytes;
use secs_core::{SecsError, SecsResult};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound for a single frame
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const DISCARD_CHUNK: usize = 8 * 1024;

/// Result of reading one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Frame(Frame),
    /// Declared length over the limit; the body was drained
    TooLong { header: MessageHeader, length: usize },
}

/// Reads frames, enforcing T8 between the bytes of one frame
pub struct FrameReader<R> {
    reader: R,
    t8: Duration,
    max_length: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, t8: Duration, max_length: usize) -> Self {
        Self {
            reader,
            t8,
            max_length,
        }
    }

    /// Read the next frame.
    ///
    /// Waits indefinitely for the first byte; every later read must
    /// complete within T8.
    pub async fn read_frame(&mut self) -> SecsResult<Incoming> {
        let mut prefix = [0u8; LENGTH_PREFIX_LENGTH];
        let n = self.reader.read(&mut prefix[..1]).await?;
        if n == 0 {
            return Err(SecsError::ConnectionClosed);
        }
        self.read_timed(&mut prefix[1..]).await?;

        let length = u32::from_be_bytes(prefix) as usize;
        if length < HEADER_LENGTH {
            return Err(SecsError::FrameTooShort(length));
        }

        let mut header_bytes = [0u8; HEADER_LENGTH];
        self.read_timed(&mut header_bytes).await?;
        let header = MessageHeader::decode(&header_bytes)?;

        let body_length = length - HEADER_LENGTH;
        if length > self.max_length {
            self.discard(body_length).await?;
            return Ok(Incoming::TooLong { header, length });
        }

        let mut body = vec![0u8; body_length];
        self.read_timed(&mut body).await?;
        Ok(Incoming::Frame(Frame::new(header, Bytes::from(body))))
    }

    async fn read_timed(&mut self, buf: &mut [u8]) -> SecsResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = tokio::time::timeout(self.t8, self.reader.read(&mut buf[filled..]))
                .await
                .map_err(|_| SecsError::Timeout)??;
            if n == 0 {
                return Err(SecsError::ConnectionClosed);
            }
            filled += n;
        }
        Ok(())
    }

    async fn discard(&mut self, mut remaining: usize) -> SecsResult<()> {
        let mut scratch = vec![0u8; DISCARD_CHUNK.min(remaining)];
        while remaining > 0 {
            let chunk = remaining.min(scratch.len());
            self.read_timed(&mut scratch[..chunk]).await?;
            remaining -= chunk;
        }
        Ok(())
    }
}

/// Writes whole frames; callers serialize access
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one encoded frame and flush
    pub async fn write_frame(&mut self, frame: &[u8]) -> SecsResult<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> SecsResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::SType;
    use crate::message::Message;
    use secs_core::Item;

    const T8: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_write_then_read_frame() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server, T8, DEFAULT_MAX_MESSAGE_SIZE);

        let mut message = Message::primary(1, 1, Some(Item::ascii("x")));
        message.header.system_bytes = 42;
        writer.write_frame(&message.encode().unwrap()).await.unwrap();

        match reader.read_frame().await.unwrap() {
            Incoming::Frame(frame) => {
                assert_eq!(frame.header.system_bytes, 42);
                assert_eq!(frame.to_message().unwrap(), message);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut reader = FrameReader::new(server, T8, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(matches!(
            reader.read_frame().await,
            Err(SecsError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_frame_too_short() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&[0, 0, 0, 4, 1, 2, 3, 4]).await.unwrap();
        let mut reader = FrameReader::new(server, T8, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(matches!(
            reader.read_frame().await,
            Err(SecsError::FrameTooShort(4))
        ));
    }

    #[tokio::test]
    async fn test_partial_frame_times_out() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&[0, 0, 0, 10, 0xFF]).await.unwrap();
        let mut reader = FrameReader::new(server, T8, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(matches!(reader.read_frame().await, Err(SecsError::Timeout)));
        drop(client);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_drained() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server, T8, 64);

        let mut big = Message::primary(6, 11, Some(Item::binary(vec![0u8; 100])));
        big.header.system_bytes = 3;
        writer.write_frame(&big.encode().unwrap()).await.unwrap();
        let linktest = Message::control(MessageHeader::control(SType::LinktestReq, 4));
        writer.write_frame(&linktest.encode().unwrap()).await.unwrap();

        match reader.read_frame().await.unwrap() {
            Incoming::TooLong { header, length } => {
                assert_eq!(header.system_bytes, 3);
                assert_eq!(length, 10 + 102);
            }
            other => panic!("unexpected {:?}", other),
        }
        match reader.read_frame().await.unwrap() {
            Incoming::Frame(frame) => assert_eq!(frame.header.s_type(), Some(SType::LinktestReq)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
