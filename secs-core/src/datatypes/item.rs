//! SECS-II item tree
//!
//! An [`Item`] is the in-memory form of one self-describing SECS-II data item.
//! Every scalar variant holds a vector because SECS-II items are arrays; a
//! "single value" is simply an array of length one.

use crate::datatypes::format::ItemFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One SECS-II data item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    /// Ordered sequence of child items
    List(Vec<Item>),
    Binary(#[serde(with = "serde_bytes")] Vec<u8>),
    Boolean(Vec<bool>),
    Ascii(String),
    I1(Vec<i8>),
    I2(Vec<i16>),
    I4(Vec<i32>),
    I8(Vec<i64>),
    U1(Vec<u8>),
    U2(Vec<u16>),
    U4(Vec<u32>),
    U8(Vec<u64>),
    F4(Vec<f32>),
    F8(Vec<f64>),
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn to_int(self) -> Option<i128> {
        match self {
            Number::Int(value) => Some(value),
            Number::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                // Saturating cast, out-of-range values are caught by the target TryFrom
                Some(value as i128)
            }
            Number::Float(_) => None,
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Number::Int(value) => value as f64,
            Number::Float(value) => value,
        }
    }
}

fn convert<T: TryFrom<i128>>(numbers: &[Number]) -> Option<Vec<T>> {
    numbers
        .iter()
        .map(|n| n.to_int().and_then(|i| T::try_from(i).ok()))
        .collect()
}

impl Item {
    pub fn list(items: Vec<Item>) -> Self {
        Item::List(items)
    }

    pub fn empty_list() -> Self {
        Item::List(Vec::new())
    }

    pub fn ascii(text: impl Into<String>) -> Self {
        Item::Ascii(text.into())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Item::Binary(bytes.into())
    }

    pub fn boolean(value: bool) -> Self {
        Item::Boolean(vec![value])
    }

    pub fn i1(value: i8) -> Self {
        Item::I1(vec![value])
    }

    pub fn i2(value: i16) -> Self {
        Item::I2(vec![value])
    }

    pub fn i4(value: i32) -> Self {
        Item::I4(vec![value])
    }

    pub fn i8(value: i64) -> Self {
        Item::I8(vec![value])
    }

    pub fn u1(value: u8) -> Self {
        Item::U1(vec![value])
    }

    pub fn u2(value: u16) -> Self {
        Item::U2(vec![value])
    }

    pub fn u4(value: u32) -> Self {
        Item::U4(vec![value])
    }

    pub fn u8(value: u64) -> Self {
        Item::U8(vec![value])
    }

    pub fn f4(value: f32) -> Self {
        Item::F4(vec![value])
    }

    pub fn f8(value: f64) -> Self {
        Item::F8(vec![value])
    }

    /// Get the format code of this item
    pub fn format(&self) -> ItemFormat {
        match self {
            Item::List(_) => ItemFormat::List,
            Item::Binary(_) => ItemFormat::Binary,
            Item::Boolean(_) => ItemFormat::Boolean,
            Item::Ascii(_) => ItemFormat::Ascii,
            Item::I1(_) => ItemFormat::I1,
            Item::I2(_) => ItemFormat::I2,
            Item::I4(_) => ItemFormat::I4,
            Item::I8(_) => ItemFormat::I8,
            Item::U1(_) => ItemFormat::U1,
            Item::U2(_) => ItemFormat::U2,
            Item::U4(_) => ItemFormat::U4,
            Item::U8(_) => ItemFormat::U8,
            Item::F4(_) => ItemFormat::F4,
            Item::F8(_) => ItemFormat::F8,
        }
    }

    /// Number of children (List) or elements (everything else)
    pub fn len(&self) -> usize {
        match self {
            Item::List(v) => v.len(),
            Item::Binary(v) => v.len(),
            Item::Boolean(v) => v.len(),
            Item::Ascii(s) => s.len(),
            Item::I1(v) => v.len(),
            Item::I2(v) => v.len(),
            Item::I4(v) => v.len(),
            Item::I8(v) => v.len(),
            Item::U1(v) => v.len(),
            Item::U2(v) => v.len(),
            Item::U4(v) => v.len(),
            Item::U8(v) => v.len(),
            Item::F4(v) => v.len(),
            Item::F8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of the length field on the wire: child count for lists, byte count otherwise
    pub fn wire_length(&self) -> usize {
        match self.format().element_width() {
            Some(width) => self.len() * width,
            None => self.len(),
        }
    }

    pub fn as_list(&self) -> Option<&[Item]> {
        match self {
            Item::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Item>> {
        match self {
            Item::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_ascii(&self) -> Option<&str> {
        match self {
            Item::Ascii(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Item::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// First element of a Boolean item, or a Binary/U1 byte treated as non-zero = true
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Item::Boolean(values) => values.first().copied(),
            Item::Binary(values) | Item::U1(values) => values.first().map(|b| *b != 0),
            _ => None,
        }
    }

    /// First byte of a single-byte item; acknowledge codes arrive this way
    pub fn first_byte(&self) -> Option<u8> {
        match self {
            Item::Binary(values) | Item::U1(values) => values.first().copied(),
            Item::Boolean(values) => values.first().map(|b| u8::from(*b)),
            Item::I1(values) => values.first().and_then(|v| u8::try_from(*v).ok()),
            _ => None,
        }
    }

    fn numbers(&self) -> Option<Vec<Number>> {
        let numbers = match self {
            Item::I1(v) => v.iter().map(|x| Number::Int(i128::from(*x))).collect(),
            Item::I2(v) => v.iter().map(|x| Number::Int(i128::from(*x))).collect(),
            Item::I4(v) => v.iter().map(|x| Number::Int(i128::from(*x))).collect(),
            Item::I8(v) => v.iter().map(|x| Number::Int(i128::from(*x))).collect(),
            Item::U1(v) => v.iter().map(|x| Number::Int(i128::from(*x))).collect(),
            Item::U2(v) => v.iter().map(|x| Number::Int(i128::from(*x))).collect(),
            Item::U4(v) => v.iter().map(|x| Number::Int(i128::from(*x))).collect(),
            Item::U8(v) => v.iter().map(|x| Number::Int(i128::from(*x))).collect(),
            Item::F4(v) => v.iter().map(|x| Number::Float(f64::from(*x))).collect(),
            Item::F8(v) => v.iter().map(|x| Number::Float(*x)).collect(),
            _ => return None,
        };
        Some(numbers)
    }

    /// First element of an integer item as u64
    pub fn as_u64(&self) -> Option<u64> {
        if !self.format().is_integer() {
            return None;
        }
        let first = self.numbers()?.first()?.to_int()?;
        u64::try_from(first).ok()
    }

    /// First element of an integer item as i64
    pub fn as_i64(&self) -> Option<i64> {
        if !self.format().is_integer() {
            return None;
        }
        let first = self.numbers()?.first()?.to_int()?;
        i64::try_from(first).ok()
    }

    /// First element of any numeric item as f64
    pub fn as_f64(&self) -> Option<f64> {
        self.numbers()?.first().map(|n| n.to_f64())
    }

    /// All elements of a numeric item as f64
    pub fn numeric_values(&self) -> Option<Vec<f64>> {
        Some(self.numbers()?.into_iter().map(Number::to_f64).collect())
    }

    /// Convert a numeric item to another numeric format.
    ///
    /// Returns `None` when the item is not numeric, the target is not numeric,
    /// or any element does not fit the target type.
    pub fn coerce_to(&self, target: ItemFormat) -> Option<Item> {
        if self.format() == target {
            return Some(self.clone());
        }
        let numbers = self.numbers()?;
        match target {
            ItemFormat::I1 => convert(&numbers).map(Item::I1),
            ItemFormat::I2 => convert(&numbers).map(Item::I2),
            ItemFormat::I4 => convert(&numbers).map(Item::I4),
            ItemFormat::I8 => convert(&numbers).map(Item::I8),
            ItemFormat::U1 => convert(&numbers).map(Item::U1),
            ItemFormat::U2 => convert(&numbers).map(Item::U2),
            ItemFormat::U4 => convert(&numbers).map(Item::U4),
            ItemFormat::U8 => convert(&numbers).map(Item::U8),
            ItemFormat::F4 => Some(Item::F4(
                numbers.iter().map(|n| n.to_f64() as f32).collect(),
            )),
            ItemFormat::F8 => Some(Item::F8(numbers.iter().map(|n| n.to_f64()).collect())),
            _ => None,
        }
    }
}

fn write_values<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    format: ItemFormat,
    values: &[T],
) -> fmt::Result {
    write!(f, "<{}", format.sml_name())?;
    for value in values {
        write!(f, " {}", value)?;
    }
    f.write_str(">")
}

/// SML rendering, e.g. `<L [2] <A "MDLN"> <U4 1>>`
impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::List(children) => {
                write!(f, "<L [{}]", children.len())?;
                for child in children {
                    write!(f, " {}", child)?;
                }
                f.write_str(">")
            }
            Item::Ascii(text) => write!(f, "<A \"{}\">", text.escape_debug()),
            Item::Binary(bytes) => {
                f.write_str("<B")?;
                for byte in bytes {
                    write!(f, " 0x{:02X}", byte)?;
                }
                f.write_str(">")
            }
            Item::Boolean(values) => {
                f.write_str("<BOOLEAN")?;
                for value in values {
                    f.write_str(if *value { " T" } else { " F" })?;
                }
                f.write_str(">")
            }
            Item::I1(v) => write_values(f, ItemFormat::I1, v),
            Item::I2(v) => write_values(f, ItemFormat::I2, v),
            Item::I4(v) => write_values(f, ItemFormat::I4, v),
            Item::I8(v) => write_values(f, ItemFormat::I8, v),
            Item::U1(v) => write_values(f, ItemFormat::U1, v),
            Item::U2(v) => write_values(f, ItemFormat::U2, v),
            Item::U4(v) => write_values(f, ItemFormat::U4, v),
            Item::U8(v) => write_values(f, ItemFormat::U8, v),
            Item::F4(v) => write_values(f, ItemFormat::F4, v),
            Item::F8(v) => write_values(f, ItemFormat::F8, v),
        }
    }
}

impl From<&str> for Item {
    fn from(text: &str) -> Self {
        Item::Ascii(text.to_string())
    }
}

impl From<String> for Item {
    fn from(text: String) -> Self {
        Item::Ascii(text)
    }
}

impl From<Vec<Item>> for Item {
    fn from(items: Vec<Item>) -> Self {
        Item::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_length() {
        assert_eq!(Item::U4(vec![1, 2, 3]).wire_length(), 12);
        assert_eq!(Item::list(vec![Item::u1(1), Item::u1(2)]).wire_length(), 2);
        assert_eq!(Item::ascii("ABC").wire_length(), 3);
        assert_eq!(Item::F8(vec![]).wire_length(), 0);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Item::u2(7).as_u64(), Some(7));
        assert_eq!(Item::i4(-3).as_u64(), None);
        assert_eq!(Item::i4(-3).as_i64(), Some(-3));
        assert_eq!(Item::f4(1.5).as_u64(), None);
        assert_eq!(Item::f4(1.5).as_f64(), Some(1.5));
        assert_eq!(Item::binary(vec![4]).first_byte(), Some(4));
        assert_eq!(Item::boolean(true).as_bool(), Some(true));
        assert_eq!(Item::ascii("x").as_u64(), None);
        assert_eq!(Item::U4(vec![]).as_u64(), None);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(Item::u1(200).coerce_to(ItemFormat::U4), Some(Item::u4(200)));
        assert_eq!(Item::u2(300).coerce_to(ItemFormat::U1), None);
        assert_eq!(Item::i2(-1).coerce_to(ItemFormat::U2), None);
        assert_eq!(Item::f8(4.0).coerce_to(ItemFormat::I4), Some(Item::i4(4)));
        assert_eq!(Item::f8(4.5).coerce_to(ItemFormat::I4), None);
        assert_eq!(Item::u4(2).coerce_to(ItemFormat::F8), Some(Item::f8(2.0)));
        assert_eq!(Item::ascii("1").coerce_to(ItemFormat::U4), None);
    }

    #[test]
    fn test_sml_display() {
        let item = Item::list(vec![
            Item::ascii("MDLN"),
            Item::U4(vec![1, 2]),
            Item::binary(vec![0x0A]),
            Item::Boolean(vec![true, false]),
        ]);
        assert_eq!(
            item.to_string(),
            "<L [4] <A \"MDLN\"> <U4 1 2> <B 0x0A> <BOOLEAN T F>>"
        );
    }
}
