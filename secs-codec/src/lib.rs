//! SECS-II codec
//!
//! Converts between the in-memory [`secs_core::Item`] tree and the SECS-II
//! binary item format. The codec is pure: it never touches I/O.

pub mod secs2;

pub use secs2::decoder::{decode, decode_at, decode_body};
pub use secs2::encoder::encode;
pub use secs2::types::{ItemHeader, MAX_ITEM_LENGTH, MAX_NESTING_DEPTH};
pub use secs2::{ItemDecoder, ItemEncoder};
