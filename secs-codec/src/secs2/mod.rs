//! SECS-II item encoding/decoding module

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::ItemDecoder;
pub use encoder::ItemEncoder;
pub use types::ItemHeader;
