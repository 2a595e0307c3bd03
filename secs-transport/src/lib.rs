//! Transport layer module for HSMS
//!
//! This crate provides the byte-stream side of HSMS: an active connector that
//! dials the peer and a passive acceptor that waits for it. Both hand the
//! session layer a split reader/writer pair. An in-memory pair serves
//! tests and in-process links.

pub mod memory;
pub mod stream;
pub mod tcp;

pub use memory::{memory_pair, MemoryConnector};
pub use stream::{BoxedReader, BoxedWriter, Connector, StreamPair};
pub use tcp::{TcpAcceptor, TcpConnector, TcpSettings};
