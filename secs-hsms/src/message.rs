//! HSMS messages with decoded SECS-II bodies

use crate::header::{MessageHeader, SType, HEADER_LENGTH, LENGTH_PREFIX_LENGTH};
use bytes::Bytes;
use secs_core::{Item, SecsError, SecsResult};
use std::fmt;

/// A data or control message with its decoded body
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub body: Option<Item>,
}

impl Message {
    pub fn new(header: MessageHeader, body: Option<Item>) -> Self {
        Self { header, body }
    }

    /// Data message. Session id and system bytes are assigned when sent.
    pub fn data(stream: u8, function: u8, w_bit: bool, body: Option<Item>) -> Self {
        Self::new(MessageHeader::data(0, stream, function, w_bit, 0), body)
    }

    /// Primary message expecting a reply
    pub fn primary(stream: u8, function: u8, body: Option<Item>) -> Self {
        Self::data(stream, function, true, body)
    }

    /// Reply to `request`: function + 1, same session id and system bytes
    pub fn reply_to(request: &MessageHeader, body: Option<Item>) -> Self {
        Self::new(
            MessageHeader::data(
                request.session_id,
                request.stream(),
                request.function().wrapping_add(1),
                false,
                request.system_bytes,
            ),
            body,
        )
    }

    /// Transaction abort reply (SxF0)
    pub fn abort(request: &MessageHeader) -> Self {
        Self::new(
            MessageHeader::data(
                request.session_id,
                request.stream(),
                0,
                false,
                request.system_bytes,
            ),
            None,
        )
    }

    /// Header-only control message
    pub fn control(header: MessageHeader) -> Self {
        Self::new(header, None)
    }

    pub fn stream(&self) -> u8 {
        self.header.stream()
    }

    pub fn function(&self) -> u8 {
        self.header.function()
    }

    pub fn w_bit(&self) -> bool {
        self.header.w_bit()
    }

    pub fn system_bytes(&self) -> u32 {
        self.header.system_bytes
    }

    pub fn session_id(&self) -> u16 {
        self.header.session_id
    }

    pub fn s_type(&self) -> Option<SType> {
        self.header.s_type()
    }

    pub fn body(&self) -> Option<&Item> {
        self.body.as_ref()
    }

    /// Body or an error naming the message
    pub fn require_body(&self) -> SecsResult<&Item> {
        self.body
            .as_ref()
            .ok_or_else(|| SecsError::InvalidData(format!("{} carries no body", self.name())))
    }

    /// `SxFy` label
    pub fn name(&self) -> String {
        format!("S{}F{}", self.stream(), self.function())
    }

    /// Encode to a complete frame: length prefix, header and body
    pub fn encode(&self) -> SecsResult<Vec<u8>> {
        let body = match &self.body {
            Some(item) => secs_codec::encode(item)?,
            None => Vec::new(),
        };
        encode_frame(&self.header, &body)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)?;
        if let Some(body) = &self.body {
            write!(f, " {}", body)?;
        }
        Ok(())
    }
}

/// A received frame with its body still encoded
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: MessageHeader,
    pub body: Bytes,
}

impl Frame {
    pub fn new(header: MessageHeader, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Decode the body into an item tree
    pub fn to_message(&self) -> SecsResult<Message> {
        let body = secs_codec::decode_body(&self.body)?;
        Ok(Message::new(self.header, body))
    }
}

/// Build the wire form of a frame
pub fn encode_frame(header: &MessageHeader, body: &[u8]) -> SecsResult<Vec<u8>> {
    let length = u32::try_from(HEADER_LENGTH + body.len())
        .map_err(|_| SecsError::FrameTooLong(HEADER_LENGTH + body.len()))?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LENGTH + HEADER_LENGTH + body.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(body);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_echoes_system_bytes() {
        let request = MessageHeader::data(7, 1, 3, true, 0xDEAD_BEEF);
        let reply = Message::reply_to(&request, Some(Item::empty_list()));
        assert_eq!(reply.stream(), 1);
        assert_eq!(reply.function(), 4);
        assert!(!reply.w_bit());
        assert_eq!(reply.session_id(), 7);
        assert_eq!(reply.system_bytes(), 0xDEAD_BEEF);

        let abort = Message::abort(&request);
        assert_eq!(abort.function(), 0);
        assert_eq!(abort.system_bytes(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_encode_linktest_frame() {
        let message = Message::control(MessageHeader::control(SType::LinktestReq, 1));
        assert_eq!(
            message.encode().unwrap(),
            vec![0, 0, 0, 10, 0xFF, 0xFF, 0, 0, 0, 5, 0, 0, 0, 1]
        );
    }

    #[test]
    fn test_frame_to_message() {
        let header = MessageHeader::data(0, 1, 2, false, 9);
        let frame = Frame::new(header, Bytes::from_static(&[0x01, 0x00]));
        let message = frame.to_message().unwrap();
        assert_eq!(message.body, Some(Item::empty_list()));
        assert_eq!(message.name(), "S1F2");

        let broken = Frame::new(header, Bytes::from_static(&[0x41, 0x05]));
        assert!(broken.to_message().is_err());
    }

    #[test]
    fn test_display() {
        let message = Message::primary(1, 1, None);
        assert!(message.to_string().starts_with("S1F1 W"));
        assert!(message.require_body().is_err());
    }
}
