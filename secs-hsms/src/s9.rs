//! Stream 9 error messages
//!
//! Except S9F13, every message carries the offending 10-byte header as
//! `B[10]` and echoes its system bytes.

use crate::header::MessageHeader;
use crate::message::Message;
use secs_core::Item;

/// S9F1 unrecognized device id
pub const UNRECOGNIZED_DEVICE_ID: u8 = 1;
/// S9F3 unrecognized stream type
pub const UNRECOGNIZED_STREAM: u8 = 3;
/// S9F5 unrecognized function type
pub const UNRECOGNIZED_FUNCTION: u8 = 5;
/// S9F7 illegal data
pub const ILLEGAL_DATA: u8 = 7;
/// S9F9 transaction timer timeout
pub const TRANSACTION_TIMEOUT: u8 = 9;
/// S9F11 data too long
pub const DATA_TOO_LONG: u8 = 11;
/// S9F13 conversation timeout
pub const CONVERSATION_TIMEOUT: u8 = 13;

fn with_header(function: u8, offending: &MessageHeader) -> Message {
    Message::new(
        MessageHeader::data(offending.session_id, 9, function, false, offending.system_bytes),
        Some(Item::binary(offending.encode().to_vec())),
    )
}

pub fn unrecognized_device_id(offending: &MessageHeader) -> Message {
    with_header(UNRECOGNIZED_DEVICE_ID, offending)
}

pub fn unrecognized_stream(offending: &MessageHeader) -> Message {
    with_header(UNRECOGNIZED_STREAM, offending)
}

pub fn unrecognized_function(offending: &MessageHeader) -> Message {
    with_header(UNRECOGNIZED_FUNCTION, offending)
}

pub fn illegal_data(offending: &MessageHeader) -> Message {
    with_header(ILLEGAL_DATA, offending)
}

pub fn transaction_timeout(offending: &MessageHeader) -> Message {
    with_header(TRANSACTION_TIMEOUT, offending)
}

pub fn data_too_long(offending: &MessageHeader) -> Message {
    with_header(DATA_TOO_LONG, offending)
}

/// S9F13 `L[A MEXP, A EDID]`; system bytes are assigned when sent
pub fn conversation_timeout(expected: &str, data_id: &str) -> Message {
    Message::data(
        9,
        CONVERSATION_TIMEOUT,
        false,
        Some(Item::list(vec![Item::ascii(expected), Item::ascii(data_id)])),
    )
}

/// Offending header carried by an S9 message, if well formed
pub fn offending_header(message: &Message) -> Option<MessageHeader> {
    let bytes = message.body.as_ref()?.as_binary()?;
    if bytes.len() != crate::header::HEADER_LENGTH {
        return None;
    }
    MessageHeader::decode(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s9_payload_is_offending_header() {
        let offending = MessageHeader::data(0, 99, 1, true, 0x1234);
        let message = unrecognized_stream(&offending);
        assert_eq!(message.stream(), 9);
        assert_eq!(message.function(), 3);
        assert!(!message.w_bit());
        assert_eq!(message.system_bytes(), 0x1234);
        assert_eq!(
            message.body,
            Some(Item::Binary(offending.encode().to_vec()))
        );
        assert_eq!(offending_header(&message), Some(offending));
    }

    #[test]
    fn test_conversation_timeout_body() {
        let message = conversation_timeout("S6F11", "7");
        assert_eq!(message.function(), 13);
        assert_eq!(
            message.body,
            Some(Item::list(vec![Item::ascii("S6F11"), Item::ascii("7")]))
        );
    }
}
