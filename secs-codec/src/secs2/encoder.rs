//! SECS-II item encoder

use crate::secs2::types::ItemHeader;
use secs_core::{Item, ItemFormat, SecsResult};

/// SECS-II encoder accumulating items into a byte buffer
pub struct ItemEncoder {
    buffer: Vec<u8>,
}

impl ItemEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode an item (recursively for lists)
    pub fn encode_item(&mut self, item: &Item) -> SecsResult<()> {
        self.encode_header(item.format(), item.wire_length())?;

        match item {
            Item::List(children) => {
                for child in children {
                    self.encode_item(child)?;
                }
            }
            Item::Binary(bytes) | Item::U1(bytes) => self.buffer.extend_from_slice(bytes),
            Item::Boolean(values) => self
                .buffer
                .extend(values.iter().map(|value| u8::from(*value))),
            Item::Ascii(text) => self.buffer.extend_from_slice(text.as_bytes()),
            Item::I1(values) => self.buffer.extend(values.iter().map(|v| *v as u8)),
            Item::I2(values) => values.iter().for_each(|v| self.encode_raw(&v.to_be_bytes())),
            Item::I4(values) => values.iter().for_each(|v| self.encode_raw(&v.to_be_bytes())),
            Item::I8(values) => values.iter().for_each(|v| self.encode_raw(&v.to_be_bytes())),
            Item::U2(values) => values.iter().for_each(|v| self.encode_raw(&v.to_be_bytes())),
            Item::U4(values) => values.iter().for_each(|v| self.encode_raw(&v.to_be_bytes())),
            Item::U8(values) => values.iter().for_each(|v| self.encode_raw(&v.to_be_bytes())),
            Item::F4(values) => values.iter().for_each(|v| self.encode_raw(&v.to_be_bytes())),
            Item::F8(values) => values.iter().for_each(|v| self.encode_raw(&v.to_be_bytes())),
        }
        Ok(())
    }

    /// Encode a format byte and its length bytes
    pub fn encode_header(&mut self, format: ItemFormat, length: usize) -> SecsResult<()> {
        ItemHeader::new(format, length).encode(&mut self.buffer)
    }

    fn encode_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Get the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Clear the encoder buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for ItemEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode one item into a fresh buffer
pub fn encode(item: &Item) -> SecsResult<Vec<u8>> {
    let mut encoder = ItemEncoder::new();
    encoder.encode_item(item)?;
    Ok(encoder.into_bytes())
}
