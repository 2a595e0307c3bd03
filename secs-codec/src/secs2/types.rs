//! SECS-II item header

use secs_core::{ItemFormat, SecsError, SecsResult};

/// Largest length that fits in three length bytes
pub const MAX_ITEM_LENGTH: usize = 0xFF_FFFF;

/// Deepest list nesting accepted by the decoder
pub const MAX_NESTING_DEPTH: usize = 64;

/// Decoded item header: format code plus the length field.
///
/// For lists `length` is the child count, for every other format it is the
/// payload size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader {
    pub format: ItemFormat,
    pub length: usize,
}

impl ItemHeader {
    pub fn new(format: ItemFormat, length: usize) -> Self {
        Self { format, length }
    }

    /// Number of length bytes needed for `length` (1 to 3)
    pub fn length_bytes(length: usize) -> SecsResult<u8> {
        match length {
            0..=0xFF => Ok(1),
            0x100..=0xFFFF => Ok(2),
            0x1_0000..=MAX_ITEM_LENGTH => Ok(3),
            _ => Err(SecsError::MalformedItem(format!(
                "Item length {} exceeds {}",
                length, MAX_ITEM_LENGTH
            ))),
        }
    }

    /// Append the header bytes to `out`
    pub fn encode(&self, out: &mut Vec<u8>) -> SecsResult<()> {
        let count = Self::length_bytes(self.length)?;
        out.push((self.format.code() << 2) | count);
        let be = (self.length as u32).to_be_bytes();
        out.extend_from_slice(&be[4 - count as usize..]);
        Ok(())
    }

    /// Size of the encoded header
    pub fn encoded_len(&self) -> SecsResult<usize> {
        Ok(1 + Self::length_bytes(self.length)? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_bytes() {
        assert_eq!(ItemHeader::length_bytes(0).unwrap(), 1);
        assert_eq!(ItemHeader::length_bytes(255).unwrap(), 1);
        assert_eq!(ItemHeader::length_bytes(256).unwrap(), 2);
        assert_eq!(ItemHeader::length_bytes(MAX_ITEM_LENGTH).unwrap(), 3);
        assert!(ItemHeader::length_bytes(MAX_ITEM_LENGTH + 1).is_err());
    }

    #[test]
    fn test_encode_header() {
        let mut out = Vec::new();
        ItemHeader::new(ItemFormat::Ascii, 0x0102).encode(&mut out).unwrap();
        assert_eq!(out, vec![0x42, 0x01, 0x02]);

        out.clear();
        ItemHeader::new(ItemFormat::List, 3).encode(&mut out).unwrap();
        assert_eq!(out, vec![0x01, 0x03]);
    }
}
