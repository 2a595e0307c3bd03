//! Alarms (stream 5)

use secs_core::{GemId, Item, SecsError, SecsResult};

/// ALCD bit set while the alarm is active
pub const ALCD_SET: u8 = 0x80;
/// ALED value enabling an alarm
pub const ALED_ENABLE: u8 = 0x80;

/// Alarm categories carried in ALCD bits 0-6
pub mod category {
    pub const PERSONAL_SAFETY: u8 = 1;
    pub const EQUIPMENT_SAFETY: u8 = 2;
    pub const PARAMETER_WARNING: u8 = 3;
    pub const PARAMETER_ERROR: u8 = 4;
    pub const IRRECOVERABLE_ERROR: u8 = 5;
    pub const EQUIPMENT_STATUS_WARNING: u8 = 6;
    pub const ATTENTION_FLAGS: u8 = 7;
    pub const DATA_INTEGRITY: u8 = 8;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub id: GemId,
    pub text: String,
    pub category: u8,
    pub enabled: bool,
    pub set: bool,
}

impl Alarm {
    /// Enabled, cleared alarm
    pub fn new(id: impl Into<GemId>, text: impl Into<String>, category: u8) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            category: category & 0x7F,
            enabled: true,
            set: false,
        }
    }

    pub fn alcd(&self) -> u8 {
        let state = if self.set { ALCD_SET } else { 0 };
        state | (self.category & 0x7F)
    }

    pub fn report(&self) -> AlarmReport {
        AlarmReport {
            alcd: self.alcd(),
            id: self.id.clone(),
            text: self.text.clone(),
        }
    }
}

/// `L[B ALCD, ALID, A ALTX]` as used by S5F1 and S5F6/S5F8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmReport {
    pub alcd: u8,
    pub id: GemId,
    pub text: String,
}

impl AlarmReport {
    pub fn is_set(&self) -> bool {
        self.alcd & ALCD_SET != 0
    }

    pub fn category(&self) -> u8 {
        self.alcd & 0x7F
    }

    pub fn to_item(&self) -> Item {
        Item::list(vec![
            Item::binary(vec![self.alcd]),
            self.id.to_item(),
            Item::ascii(self.text.clone()),
        ])
    }

    pub fn from_item(item: &Item) -> SecsResult<Self> {
        let invalid = || SecsError::InvalidData(format!("Expected alarm report, got {}", item));
        match item.as_list() {
            Some([alcd, id, text]) => Ok(Self {
                alcd: alcd.first_byte().ok_or_else(invalid)?,
                id: GemId::from_item(id)?,
                text: text.as_ascii().ok_or_else(invalid)?.to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alcd_bits() {
        let mut alarm = Alarm::new(2001u32, "Door open", category::EQUIPMENT_SAFETY);
        assert_eq!(alarm.alcd(), 2);
        alarm.set = true;
        assert_eq!(alarm.alcd(), 0x82);

        let report = alarm.report();
        assert!(report.is_set());
        assert_eq!(report.category(), category::EQUIPMENT_SAFETY);
        assert_eq!(AlarmReport::from_item(&report.to_item()).unwrap(), report);
    }

    #[test]
    fn test_bad_report() {
        assert!(AlarmReport::from_item(&Item::list(vec![Item::u4(1)])).is_err());
    }
}
