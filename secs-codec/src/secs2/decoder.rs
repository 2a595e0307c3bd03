//! SECS-II item decoder

use crate::secs2::types::{ItemHeader, MAX_NESTING_DEPTH};
use secs_core::{Item, ItemFormat, SecsError, SecsResult};

/// SECS-II decoder reading items from a borrowed buffer
pub struct ItemDecoder<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ItemDecoder<'a> {
    /// Create a new decoder
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Create a decoder starting at `offset`
    pub fn at(buffer: &'a [u8], offset: usize) -> Self {
        Self {
            buffer,
            position: offset.min(buffer.len()),
        }
    }

    /// Decode one item, recursing into lists
    pub fn decode_item(&mut self) -> SecsResult<Item> {
        self.decode_nested(0)
    }

    fn decode_nested(&mut self, depth: usize) -> SecsResult<Item> {
        if depth > MAX_NESTING_DEPTH {
            return Err(SecsError::MalformedItem(format!(
                "List nesting deeper than {}",
                MAX_NESTING_DEPTH
            )));
        }

        let header = self.decode_header()?;
        if header.format == ItemFormat::List {
            // Every child needs at least a format byte and one length byte
            if header.length.saturating_mul(2) > self.remaining() {
                return Err(SecsError::MalformedItem(format!(
                    "List declares {} items but only {} bytes remain",
                    header.length,
                    self.remaining()
                )));
            }
            let mut children = Vec::with_capacity(header.length);
            for _ in 0..header.length {
                children.push(self.decode_nested(depth + 1)?);
            }
            return Ok(Item::List(children));
        }

        let width = header.format.element_width().unwrap_or(1);
        if header.length % width != 0 {
            return Err(SecsError::MalformedItem(format!(
                "{} length {} is not a multiple of {}",
                header.format, header.length, width
            )));
        }
        let payload = self.read_bytes(header.length)?;
        Ok(Self::decode_payload(header.format, payload))
    }

    /// Decode the format byte and length bytes of the next item
    pub fn decode_header(&mut self) -> SecsResult<ItemHeader> {
        let format_byte = self.read_byte()?;
        let format = ItemFormat::from_code(format_byte >> 2)?;
        let length_bytes = (format_byte & 0x03) as usize;
        if length_bytes == 0 {
            return Err(SecsError::MalformedItem(
                "Length-of-length is 0".to_string(),
            ));
        }
        let length = self
            .read_bytes(length_bytes)?
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        Ok(ItemHeader::new(format, length))
    }

    fn decode_payload(format: ItemFormat, payload: &[u8]) -> Item {
        match format {
            ItemFormat::List => Item::List(Vec::new()),
            ItemFormat::Binary => Item::Binary(payload.to_vec()),
            ItemFormat::Boolean => Item::Boolean(payload.iter().map(|b| *b != 0).collect()),
            ItemFormat::Ascii => Item::Ascii(match std::str::from_utf8(payload) {
                Ok(text) => text.to_string(),
                // Latin-1 keeps every byte of non-UTF-8 peers
                Err(_) => payload.iter().map(|b| *b as char).collect(),
            }),
            ItemFormat::I1 => Item::I1(payload.iter().map(|b| *b as i8).collect()),
            ItemFormat::I2 => Item::I2(read_array(payload, i16::from_be_bytes)),
            ItemFormat::I4 => Item::I4(read_array(payload, i32::from_be_bytes)),
            ItemFormat::I8 => Item::I8(read_array(payload, i64::from_be_bytes)),
            ItemFormat::U1 => Item::U1(payload.to_vec()),
            ItemFormat::U2 => Item::U2(read_array(payload, u16::from_be_bytes)),
            ItemFormat::U4 => Item::U4(read_array(payload, u32::from_be_bytes)),
            ItemFormat::U8 => Item::U8(read_array(payload, u64::from_be_bytes)),
            ItemFormat::F4 => Item::F4(read_array(payload, f32::from_be_bytes)),
            ItemFormat::F8 => Item::F8(read_array(payload, f64::from_be_bytes)),
        }
    }

    /// Read a single byte
    fn read_byte(&mut self) -> SecsResult<u8> {
        let byte = *self.buffer.get(self.position).ok_or_else(|| {
            SecsError::MalformedItem("Unexpected end of item data".to_string())
        })?;
        self.position += 1;
        Ok(byte)
    }

    /// Read multiple bytes
    fn read_bytes(&mut self, len: usize) -> SecsResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(SecsError::MalformedItem(format!(
                "Declared length {} exceeds remaining {} bytes",
                len,
                self.remaining()
            )));
        }
        let bytes = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get remaining bytes
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }
}

fn read_array<const N: usize, T>(payload: &[u8], convert: fn([u8; N]) -> T) -> Vec<T> {
    payload
        .chunks_exact(N)
        .map(|chunk| {
            let mut raw = [0u8; N];
            raw.copy_from_slice(chunk);
            convert(raw)
        })
        .collect()
}

/// Decode one item starting at `offset`, returning it with the offset just past it
pub fn decode_at(bytes: &[u8], offset: usize) -> SecsResult<(Item, usize)> {
    let mut decoder = ItemDecoder::at(bytes, offset);
    let item = decoder.decode_item()?;
    Ok((item, decoder.position()))
}

/// Decode a buffer holding exactly one item
pub fn decode(bytes: &[u8]) -> SecsResult<Item> {
    let (item, end) = decode_at(bytes, 0)?;
    if end != bytes.len() {
        return Err(SecsError::MalformedItem(format!(
            "{} trailing bytes after item",
            bytes.len() - end
        )));
    }
    Ok(item)
}

/// Decode a message body; an empty body carries no item
pub fn decode_body(bytes: &[u8]) -> SecsResult<Option<Item>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    decode(bytes).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secs2::encoder::encode;
    use proptest::prelude::*;

    #[test]
    fn test_decode_known_bytes() {
        let bytes = [0x01, 0x02, 0x41, 0x02, b'o', b'k', 0xA9, 0x04, 0x00, 0x01, 0x00, 0x02];
        let item = decode(&bytes).unwrap();
        assert_eq!(
            item,
            Item::list(vec![Item::ascii("ok"), Item::U2(vec![1, 2])])
        );
    }

    #[test]
    fn test_decode_at_returns_next_offset() {
        let mut bytes = encode(&Item::u1(9)).unwrap();
        bytes.extend(encode(&Item::ascii("x")).unwrap());
        let (first, next) = decode_at(&bytes, 0).unwrap();
        assert_eq!(first, Item::u1(9));
        assert_eq!(next, 3);
        let (second, end) = decode_at(&bytes, next).unwrap();
        assert_eq!(second, Item::ascii("x"));
        assert_eq!(end, bytes.len());
    }

    #[test]
    fn test_unknown_format_code() {
        // 0o21 (JIS-8) is not supported
        let err = decode(&[(0o21 << 2) | 1, 0x00]).unwrap_err();
        assert!(matches!(err, SecsError::MalformedItem(_)));
    }

    #[test]
    fn test_zero_length_of_length() {
        assert!(matches!(
            decode(&[0x40]).unwrap_err(),
            SecsError::MalformedItem(_)
        ));
    }

    #[test]
    fn test_length_exceeds_buffer() {
        assert!(matches!(
            decode(&[0x41, 0x05, b'a']).unwrap_err(),
            SecsError::MalformedItem(_)
        ));
        // List claims more children than the buffer can hold
        assert!(decode(&[0x01, 0x03, 0xA5, 0x00]).is_err());
    }

    #[test]
    fn test_width_must_divide_length() {
        // U4 with a 3-byte payload
        assert!(matches!(
            decode(&[0xB1, 0x03, 0, 0, 1]).unwrap_err(),
            SecsError::MalformedItem(_)
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        assert!(decode(&[0xA5, 0x01, 0x01, 0x00]).is_err());
        assert_eq!(decode_body(&[]).unwrap(), None);
    }

    #[test]
    fn test_nesting_limit() {
        let mut bytes = Vec::new();
        for _ in 0..(MAX_NESTING_DEPTH + 2) {
            bytes.extend_from_slice(&[0x01, 0x01]);
        }
        bytes.extend_from_slice(&[0x01, 0x00]);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_non_utf8_ascii_kept() {
        let item = decode(&[0x41, 0x02, 0xB0, 0x41]).unwrap();
        assert_eq!(item, Item::Ascii("\u{B0}A".to_string()));
    }

    fn arb_item() -> impl Strategy<Value = Item> {
        let signed = prop_oneof![
            prop::collection::vec(any::<i8>(), 0..8).prop_map(Item::I1),
            prop::collection::vec(any::<i16>(), 0..8).prop_map(Item::I2),
            prop::collection::vec(any::<i32>(), 0..8).prop_map(Item::I4),
            prop::collection::vec(any::<i64>(), 0..4).prop_map(Item::I8),
        ];
        let unsigned = prop_oneof![
            prop::collection::vec(any::<u8>(), 0..8).prop_map(Item::U1),
            prop::collection::vec(any::<u16>(), 0..8).prop_map(Item::U2),
            prop::collection::vec(any::<u32>(), 0..8).prop_map(Item::U4),
            prop::collection::vec(any::<u64>(), 0..4).prop_map(Item::U8),
        ];
        // Finite ranges; NaN never compares equal
        let float = prop_oneof![
            prop::collection::vec(-1.0e6f32..1.0e6, 0..4).prop_map(Item::F4),
            prop::collection::vec(-1.0e12f64..1.0e12, 0..4).prop_map(Item::F8),
        ];
        let leaf = prop_oneof![
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Item::Binary),
            prop::collection::vec(any::<bool>(), 0..8).prop_map(Item::Boolean),
            "[ -~]{0,16}".prop_map(Item::Ascii),
            signed,
            unsigned,
            float,
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop::collection::vec(inner, 0..8).prop_map(Item::List)
        })
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(item in arb_item()) {
            let bytes = encode(&item).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), item);
        }
    }
}
