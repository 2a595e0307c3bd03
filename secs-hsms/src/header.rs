//! HSMS message header

use secs_core::{SecsError, SecsResult};
use std::fmt;

/// HSMS header length
pub const HEADER_LENGTH: usize = 10;

/// Length prefix preceding every HSMS frame
pub const LENGTH_PREFIX_LENGTH: usize = 4;

/// Session id carried by control messages
pub const CONTROL_SESSION_ID: u16 = 0xFFFF;

/// Session type (SType) of an HSMS message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SType {
    Data,
    SelectReq,
    SelectRsp,
    DeselectReq,
    DeselectRsp,
    LinktestReq,
    LinktestRsp,
    RejectReq,
    SeparateReq,
}

impl SType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SType::Data),
            1 => Some(SType::SelectReq),
            2 => Some(SType::SelectRsp),
            3 => Some(SType::DeselectReq),
            4 => Some(SType::DeselectRsp),
            5 => Some(SType::LinktestReq),
            6 => Some(SType::LinktestRsp),
            7 => Some(SType::RejectReq),
            9 => Some(SType::SeparateReq),
            _ => None,
        }
    }

    pub const fn to_u8(self) -> u8 {
        match self {
            SType::Data => 0,
            SType::SelectReq => 1,
            SType::SelectRsp => 2,
            SType::DeselectReq => 3,
            SType::DeselectRsp => 4,
            SType::LinktestReq => 5,
            SType::LinktestRsp => 6,
            SType::RejectReq => 7,
            SType::SeparateReq => 9,
        }
    }

    /// Response type for control requests that expect one
    pub const fn response(self) -> Option<SType> {
        match self {
            SType::SelectReq => Some(SType::SelectRsp),
            SType::DeselectReq => Some(SType::DeselectRsp),
            SType::LinktestReq => Some(SType::LinktestRsp),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SType::Data => "data",
            SType::SelectReq => "select.req",
            SType::SelectRsp => "select.rsp",
            SType::DeselectReq => "deselect.req",
            SType::DeselectRsp => "deselect.rsp",
            SType::LinktestReq => "linktest.req",
            SType::LinktestRsp => "linktest.rsp",
            SType::RejectReq => "reject.req",
            SType::SeparateReq => "separate.req",
        }
    }
}

/// Select.rsp status (header byte 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SelectStatus {
    Accepted = 0,
    AlreadyActive = 1,
    NotReady = 2,
    Exhausted = 3,
}

/// Deselect.rsp status (header byte 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeselectStatus {
    Accepted = 0,
    NotEstablished = 1,
    Busy = 2,
}

/// Reject.req reason code (header byte 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectReason {
    STypeNotSupported = 1,
    PTypeNotSupported = 2,
    TransactionNotOpen = 3,
    EntityNotSelected = 4,
}

/// The 10-byte HSMS message header.
///
/// Bytes 2 and 3 mean stream/function for data messages and carry
/// status or reason codes for control messages, so they are stored raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub session_id: u16,
    pub header_byte2: u8,
    pub header_byte3: u8,
    pub p_type: u8,
    pub s_type: u8,
    pub system_bytes: u32,
}

impl MessageHeader {
    /// Header of a data message
    pub fn data(session_id: u16, stream: u8, function: u8, w_bit: bool, system_bytes: u32) -> Self {
        Self {
            session_id,
            header_byte2: (stream & 0x7F) | if w_bit { 0x80 } else { 0x00 },
            header_byte3: function,
            p_type: 0,
            s_type: SType::Data.to_u8(),
            system_bytes,
        }
    }

    /// Header of a control request
    pub fn control(s_type: SType, system_bytes: u32) -> Self {
        Self {
            session_id: CONTROL_SESSION_ID,
            header_byte2: 0,
            header_byte3: 0,
            p_type: 0,
            s_type: s_type.to_u8(),
            system_bytes,
        }
    }

    /// Control response echoing the request's session id and system bytes
    pub fn control_response(request: &MessageHeader, s_type: SType, status: u8) -> Self {
        Self {
            session_id: request.session_id,
            header_byte2: 0,
            header_byte3: status,
            p_type: 0,
            s_type: s_type.to_u8(),
            system_bytes: request.system_bytes,
        }
    }

    /// Reject.req for `rejected`
    pub fn reject(rejected: &MessageHeader, reason: RejectReason) -> Self {
        let byte2 = if reason == RejectReason::PTypeNotSupported {
            rejected.p_type
        } else {
            rejected.s_type
        };
        Self {
            session_id: rejected.session_id,
            header_byte2: byte2,
            header_byte3: reason as u8,
            p_type: 0,
            s_type: SType::RejectReq.to_u8(),
            system_bytes: rejected.system_bytes,
        }
    }

    pub fn stream(&self) -> u8 {
        self.header_byte2 & 0x7F
    }

    pub fn function(&self) -> u8 {
        self.header_byte3
    }

    /// Reply-expected flag
    pub fn w_bit(&self) -> bool {
        self.header_byte2 & 0x80 != 0
    }

    /// Status or reason code of a control message
    pub fn status(&self) -> u8 {
        self.header_byte3
    }

    pub fn s_type(&self) -> Option<SType> {
        SType::from_u8(self.s_type)
    }

    pub fn is_data(&self) -> bool {
        self.s_type == SType::Data.to_u8()
    }

    /// Encode header to bytes (big-endian)
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        let mut bytes = [0u8; HEADER_LENGTH];
        bytes[0..2].copy_from_slice(&self.session_id.to_be_bytes());
        bytes[2] = self.header_byte2;
        bytes[3] = self.header_byte3;
        bytes[4] = self.p_type;
        bytes[5] = self.s_type;
        bytes[6..10].copy_from_slice(&self.system_bytes.to_be_bytes());
        bytes
    }

    /// Decode header from bytes
    pub fn decode(data: &[u8]) -> SecsResult<Self> {
        if data.len() < HEADER_LENGTH {
            return Err(SecsError::FrameTooShort(data.len()));
        }
        Ok(Self {
            session_id: u16::from_be_bytes([data[0], data[1]]),
            header_byte2: data[2],
            header_byte3: data[3],
            p_type: data[4],
            s_type: data[5],
            system_bytes: u32::from_be_bytes([data[6], data[7], data[8], data[9]]),
        })
    }
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.s_type() {
            Some(SType::Data) => write!(
                f,
                "S{}F{}{} session={} system={:#010X}",
                self.stream(),
                self.function(),
                if self.w_bit() { " W" } else { "" },
                self.session_id,
                self.system_bytes
            ),
            Some(s_type) => write!(
                f,
                "{} status={} system={:#010X}",
                s_type.as_str(),
                self.status(),
                self.system_bytes
            ),
            None => write!(f, "stype={} system={:#010X}", self.s_type, self.system_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_header_layout() {
        let header = MessageHeader::data(1, 1, 13, true, 0x0102_0304);
        assert_eq!(
            header.encode(),
            [0x00, 0x01, 0x81, 0x0D, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04]
        );
        let decoded = MessageHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded.stream(), 1);
        assert_eq!(decoded.function(), 13);
        assert!(decoded.w_bit());
        assert!(decoded.is_data());
    }

    #[test]
    fn test_control_response_echoes_request() {
        let request = MessageHeader::control(SType::SelectReq, 77);
        let response = MessageHeader::control_response(
            &request,
            SType::SelectRsp,
            SelectStatus::AlreadyActive as u8,
        );
        assert_eq!(response.session_id, CONTROL_SESSION_ID);
        assert_eq!(response.system_bytes, 77);
        assert_eq!(response.s_type(), Some(SType::SelectRsp));
        assert_eq!(response.status(), 1);
    }

    #[test]
    fn test_reject_carries_rejected_stype() {
        let data = MessageHeader::data(0, 1, 1, true, 5);
        let reject = MessageHeader::reject(&data, RejectReason::EntityNotSelected);
        assert_eq!(reject.header_byte2, 0);
        assert_eq!(reject.status(), 4);
        assert_eq!(reject.system_bytes, 5);

        let odd = MessageHeader { p_type: 3, ..data };
        let reject = MessageHeader::reject(&odd, RejectReason::PTypeNotSupported);
        assert_eq!(reject.header_byte2, 3);
    }

    #[test]
    fn test_decode_short_header() {
        assert!(matches!(
            MessageHeader::decode(&[0u8; 9]),
            Err(SecsError::FrameTooShort(9))
        ));
        assert_eq!(SType::from_u8(8), None);
        assert_eq!(SType::LinktestReq.response(), Some(SType::LinktestRsp));
    }
}
