//! Error types for the SECS/GEM protocol stack

use thiserror::Error;

/// Main error type for SECS/GEM operations
#[derive(Error, Debug)]
pub enum SecsError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// The connection was reset while a transaction was outstanding
    #[error("Connection lost")]
    ConnectionLost,

    #[error("Frame too short: declared length {0}")]
    FrameTooShort(usize),

    #[error("Frame too long: declared length {0}")]
    FrameTooLong(usize),

    #[error("Invalid frame: {0}")]
    FrameInvalid(String),

    #[error("Malformed item: {0}")]
    MalformedItem(String),

    #[error("Timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer answered a control transaction with Reject.req
    #[error("Rejected by peer: reason {0}")]
    Rejected(u8),

    #[error("Select rejected: status {0}")]
    SelectRejected(u8),

    /// The peer answered a data transaction with a stream 9 error message
    #[error("Peer reported S{stream}F{function}")]
    PeerError { stream: u8, function: u8 },

    #[error("System bytes {0:#010X} already pending")]
    DuplicateTransaction(u32),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown equipment constant: {0}")]
    UnknownConstant(String),

    #[error("Unknown report: {0}")]
    UnknownReport(String),

    #[error("Unknown collection event: {0}")]
    UnknownEvent(String),

    #[error("Unknown remote command: {0}")]
    UnknownCommand(String),

    #[error("Unknown alarm: {0}")]
    UnknownAlarm(String),

    #[error("Unknown process program: {0}")]
    UnknownProgram(String),

    #[error("Process program {id} is {size} bytes, limit {limit}")]
    ProgramTooLarge { id: String, size: usize, limit: usize },

    #[error("Event already linked: {0}")]
    AlreadyLinked(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Handler failed: {0}")]
    Handler(String),
}

impl SecsError {
    /// Errors after which the underlying connection cannot be used anymore
    pub fn is_fatal_for_connection(&self) -> bool {
        matches!(
            self,
            SecsError::Connection(_)
                | SecsError::ConnectionClosed
                | SecsError::FrameTooShort(_)
                | SecsError::FrameInvalid(_)
        )
    }
}

/// Result type alias for SECS/GEM operations
pub type SecsResult<T> = Result<T, SecsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: SecsError = io.into();
        assert!(matches!(err, SecsError::Connection(_)));
        assert!(err.is_fatal_for_connection());
    }

    #[test]
    fn test_display() {
        let err = SecsError::PeerError { stream: 9, function: 5 };
        assert_eq!(err.to_string(), "Peer reported S9F5");
        assert_eq!(
            SecsError::DuplicateTransaction(0x2A).to_string(),
            "System bytes 0x0000002A already pending"
        );
        assert!(!SecsError::Timeout.is_fatal_for_connection());
    }
}
