//! SECS-II item format codes

use crate::error::{SecsError, SecsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format code of a SECS-II item (the upper six bits of the item header byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemFormat {
    List,
    Binary,
    Boolean,
    Ascii,
    I8,
    I1,
    I2,
    I4,
    F8,
    F4,
    U8,
    U1,
    U2,
    U4,
}

impl ItemFormat {
    /// Parse a six-bit format code
    pub fn from_code(code: u8) -> SecsResult<Self> {
        match code {
            0o00 => Ok(ItemFormat::List),
            0o10 => Ok(ItemFormat::Binary),
            0o11 => Ok(ItemFormat::Boolean),
            0o20 => Ok(ItemFormat::Ascii),
            0o30 => Ok(ItemFormat::I8),
            0o31 => Ok(ItemFormat::I1),
            0o32 => Ok(ItemFormat::I2),
            0o34 => Ok(ItemFormat::I4),
            0o40 => Ok(ItemFormat::F8),
            0o44 => Ok(ItemFormat::F4),
            0o50 => Ok(ItemFormat::U8),
            0o51 => Ok(ItemFormat::U1),
            0o52 => Ok(ItemFormat::U2),
            0o54 => Ok(ItemFormat::U4),
            _ => Err(SecsError::MalformedItem(format!(
                "Unknown format code: 0o{:02o}",
                code
            ))),
        }
    }

    /// Six-bit format code
    pub const fn code(self) -> u8 {
        match self {
            ItemFormat::List => 0o00,
            ItemFormat::Binary => 0o10,
            ItemFormat::Boolean => 0o11,
            ItemFormat::Ascii => 0o20,
            ItemFormat::I8 => 0o30,
            ItemFormat::I1 => 0o31,
            ItemFormat::I2 => 0o32,
            ItemFormat::I4 => 0o34,
            ItemFormat::F8 => 0o40,
            ItemFormat::F4 => 0o44,
            ItemFormat::U8 => 0o50,
            ItemFormat::U1 => 0o51,
            ItemFormat::U2 => 0o52,
            ItemFormat::U4 => 0o54,
        }
    }

    /// Byte width of one element, `None` for lists
    pub const fn element_width(self) -> Option<usize> {
        match self {
            ItemFormat::List => None,
            ItemFormat::Binary | ItemFormat::Boolean | ItemFormat::Ascii => Some(1),
            ItemFormat::I1 | ItemFormat::U1 => Some(1),
            ItemFormat::I2 | ItemFormat::U2 => Some(2),
            ItemFormat::I4 | ItemFormat::U4 | ItemFormat::F4 => Some(4),
            ItemFormat::I8 | ItemFormat::U8 | ItemFormat::F8 => Some(8),
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ItemFormat::I1
                | ItemFormat::I2
                | ItemFormat::I4
                | ItemFormat::I8
                | ItemFormat::U1
                | ItemFormat::U2
                | ItemFormat::U4
                | ItemFormat::U8
        )
    }

    /// Integer or floating point format
    pub fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, ItemFormat::F4 | ItemFormat::F8)
    }

    /// Short name used in SML text
    pub const fn sml_name(self) -> &'static str {
        match self {
            ItemFormat::List => "L",
            ItemFormat::Binary => "B",
            ItemFormat::Boolean => "BOOLEAN",
            ItemFormat::Ascii => "A",
            ItemFormat::I8 => "I8",
            ItemFormat::I1 => "I1",
            ItemFormat::I2 => "I2",
            ItemFormat::I4 => "I4",
            ItemFormat::F8 => "F8",
            ItemFormat::F4 => "F4",
            ItemFormat::U8 => "U8",
            ItemFormat::U1 => "U1",
            ItemFormat::U2 => "U2",
            ItemFormat::U4 => "U4",
        }
    }
}

impl fmt::Display for ItemFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sml_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_codes() {
        assert_eq!(ItemFormat::from_code(0o20).unwrap(), ItemFormat::Ascii);
        assert_eq!(ItemFormat::U4.code() << 2, 0xB0);
        assert_eq!(ItemFormat::List.code(), 0);
        assert!(ItemFormat::from_code(0o21).is_err());
        assert!(ItemFormat::from_code(0o77).is_err());
    }

    #[test]
    fn test_element_width() {
        assert_eq!(ItemFormat::List.element_width(), None);
        assert_eq!(ItemFormat::F4.element_width(), Some(4));
        assert_eq!(ItemFormat::I8.element_width(), Some(8));
        assert!(ItemFormat::F8.is_numeric());
        assert!(!ItemFormat::F8.is_integer());
        assert!(!ItemFormat::Boolean.is_numeric());
    }
}
