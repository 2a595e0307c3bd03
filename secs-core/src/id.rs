//! GEM identifiers (SVID, ECID, CEID, RPTID, ALID, ...)

use crate::datatypes::{Item, ItemFormat};
use crate::error::{SecsError, SecsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier carried in GEM messages.
///
/// Equipment vendors use either unsigned integers of any width or ASCII
/// strings for ids. Integer ids compare equal regardless of the width
/// they were transmitted in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GemId {
    Number(u64),
    Text(String),
}

impl GemId {
    /// Decode an id from a single-element integer item or an ASCII item
    pub fn from_item(item: &Item) -> SecsResult<Self> {
        if let Item::Ascii(text) = item {
            return Ok(GemId::Text(text.clone()));
        }
        if !item.format().is_integer() || item.len() != 1 {
            return Err(SecsError::InvalidData(format!(
                "Expected a single integer or ASCII id, got {}",
                item
            )));
        }
        item.as_u64()
            .map(GemId::Number)
            .ok_or_else(|| SecsError::InvalidData(format!("Negative id: {}", item)))
    }

    /// Decode a list of ids: either a List of id items or one integer vector item
    pub fn list_from_item(item: &Item) -> SecsResult<Vec<Self>> {
        match item {
            Item::List(children) => children.iter().map(GemId::from_item).collect(),
            Item::Ascii(text) if text.is_empty() => Ok(Vec::new()),
            Item::Ascii(_) => Ok(vec![GemId::from_item(item)?]),
            other if other.format().is_integer() => match other.coerce_to(ItemFormat::U8) {
                Some(Item::U8(values)) => Ok(values.into_iter().map(GemId::Number).collect()),
                _ => Err(SecsError::InvalidData(format!("Negative id in {}", other))),
            },
            other => Err(SecsError::InvalidData(format!(
                "Expected an id list, got {}",
                other
            ))),
        }
    }

    /// Encode as U4 when the value fits, U8 otherwise, A for text ids
    pub fn to_item(&self) -> Item {
        match self {
            GemId::Number(value) => match u32::try_from(*value) {
                Ok(small) => Item::u4(small),
                Err(_) => Item::u8(*value),
            },
            GemId::Text(text) => Item::ascii(text.clone()),
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            GemId::Number(value) => Some(*value),
            GemId::Text(_) => None,
        }
    }
}

impl fmt::Display for GemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GemId::Number(value) => write!(f, "{}", value),
            GemId::Text(text) => f.write_str(text),
        }
    }
}

impl From<u32> for GemId {
    fn from(value: u32) -> Self {
        GemId::Number(u64::from(value))
    }
}

impl From<u64> for GemId {
    fn from(value: u64) -> Self {
        GemId::Number(value)
    }
}

impl From<&str> for GemId {
    fn from(value: &str) -> Self {
        GemId::Text(value.to_string())
    }
}

impl From<String> for GemId {
    fn from(value: String) -> Self {
        GemId::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_independent_equality() {
        let a = GemId::from_item(&Item::u1(7)).unwrap();
        let b = GemId::from_item(&Item::u4(7)).unwrap();
        let c = GemId::from_item(&Item::i2(7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a, GemId::from(7u32));
    }

    #[test]
    fn test_rejects_bad_ids() {
        assert!(GemId::from_item(&Item::i4(-1)).is_err());
        assert!(GemId::from_item(&Item::U4(vec![1, 2])).is_err());
        assert!(GemId::from_item(&Item::empty_list()).is_err());
        assert!(GemId::from_item(&Item::f4(1.0)).is_err());
    }

    #[test]
    fn test_list_forms() {
        let from_list =
            GemId::list_from_item(&Item::list(vec![Item::u4(1), Item::ascii("X")])).unwrap();
        assert_eq!(from_list, vec![GemId::Number(1), GemId::from("X")]);

        let from_vector = GemId::list_from_item(&Item::U4(vec![5, 6])).unwrap();
        assert_eq!(from_vector, vec![GemId::Number(5), GemId::Number(6)]);

        assert!(GemId::list_from_item(&Item::U4(vec![])).unwrap().is_empty());
    }

    #[test]
    fn test_to_item() {
        assert_eq!(GemId::Number(1001).to_item(), Item::u4(1001));
        assert_eq!(GemId::Number(u64::MAX).to_item(), Item::u8(u64::MAX));
        assert_eq!(GemId::from("PP1").to_item(), Item::ascii("PP1"));
    }
}
