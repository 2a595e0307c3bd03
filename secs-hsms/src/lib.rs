//! HSMS session layer for SECS/GEM
//!
//! This crate provides the HSMS-SS session: frame reading and writing,
//! the select procedure, control messages, T3/T5/T6/T7/T8 timers,
//! transaction correlation and routing of inbound primaries.
//!
//! # Status
//!
//! ## Session
//! - [x] Header and frame encoding/decoding
//! - [x] Select/deselect/linktest/separate/reject
//! - [x] T3, T5, T6, T7, T8 timers
//! - [x] Active reconnect with backoff
//! - [x] Stream 9 error reporting
//! - [ ] HSMS-GS (multiple sessions per connection)

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod framer;
pub mod header;
pub mod message;
pub mod s9;
pub mod state;
pub mod statistics;
pub mod transaction;

pub use config::{ConnectMode, HsmsConfig};
pub use connection::{HsmsConnection, SessionEvent};
pub use dispatcher::{handler_fn, DataHandler, Dispatcher, Gate, HandlerResult, RawHandler};
pub use framer::{FrameReader, FrameWriter, Incoming, DEFAULT_MAX_MESSAGE_SIZE};
pub use header::{
    DeselectStatus, MessageHeader, RejectReason, SType, SelectStatus, CONTROL_SESSION_ID,
    HEADER_LENGTH,
};
pub use message::{Frame, Message};
pub use state::ConnectionState;
pub use statistics::SessionStatistics;
pub use transaction::{PendingReply, TransactionManager};
