//! Equipment constants

use crate::ack::Eac;
use secs_core::{GemId, Item, ItemFormat};
use std::fmt;
use std::sync::Arc;

/// Reads a constant whose value lives outside the model
pub type ConstantProvider = Arc<dyn Fn() -> anyhow::Result<Item> + Send + Sync>;

/// Application check on a value that already passed the range check
pub type ConstantValidator = Arc<dyn Fn(&Item) -> anyhow::Result<()> + Send + Sync>;

/// Receives every value the host writes
pub type ConstantUpdater = Arc<dyn Fn(&Item) -> anyhow::Result<()> + Send + Sync>;

/// Optional application callbacks of one constant
#[derive(Clone, Default)]
pub struct ConstantHooks {
    pub provider: Option<ConstantProvider>,
    pub validator: Option<ConstantValidator>,
    pub updater: Option<ConstantUpdater>,
}

impl fmt::Debug for ConstantHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantHooks")
            .field("provider", &self.provider.is_some())
            .field("validator", &self.validator.is_some())
            .field("updater", &self.updater.is_some())
            .finish()
    }
}

impl ConstantHooks {
    /// Run the validator; a refusal is EAC 3
    pub fn validate(&self, id: &GemId, value: &Item) -> Result<(), Eac> {
        match &self.validator {
            Some(validator) => validator(value).map_err(|err| {
                log::warn!("Constant {} refused {}: {}", id, value, err);
                Eac::OutOfRange
            }),
            None => Ok(()),
        }
    }

    /// Run the updater; a failure is EAC 2
    pub fn update(&self, id: &GemId, value: &Item) -> Result<(), Eac> {
        match &self.updater {
            Some(updater) => updater(value).map_err(|err| {
                log::warn!("Constant {} could not take {}: {}", id, value, err);
                Eac::Busy
            }),
            None => Ok(()),
        }
    }
}

/// Equipment constant (EC)
#[derive(Debug, Clone)]
pub struct EquipmentConstant {
    pub id: GemId,
    pub name: String,
    pub unit: String,
    pub min: Option<Item>,
    pub max: Option<Item>,
    pub default: Item,
    /// Stored value; unused while a provider is installed
    pub value: Item,
    pub hooks: ConstantHooks,
}

impl EquipmentConstant {
    /// Constant initialized to its default value
    pub fn new(
        id: impl Into<GemId>,
        name: impl Into<String>,
        unit: impl Into<String>,
        default: Item,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit: unit.into(),
            min: None,
            max: None,
            value: default.clone(),
            default,
            hooks: ConstantHooks::default(),
        }
    }

    /// Read the value from `provider` instead of the stored value
    pub fn with_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> anyhow::Result<Item> + Send + Sync + 'static,
    {
        self.hooks.provider = Some(Arc::new(provider));
        self
    }

    /// Extra check for host writes, run after the range check
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Item) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.validator = Some(Arc::new(validator));
        self
    }

    /// Hand every accepted host write to `updater`
    pub fn with_updater<F>(mut self, updater: F) -> Self
    where
        F: Fn(&Item) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.updater = Some(Arc::new(updater));
        self
    }

    pub fn with_range(mut self, min: Item, max: Item) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn format(&self) -> ItemFormat {
        self.default.format()
    }

    /// Normalize a host-supplied value, returning the value to store.
    ///
    /// Numeric constants coerce to the declared format and honor min/max,
    /// ASCII constants take any value, other formats must match exactly.
    pub fn validate(&self, value: &Item) -> Result<Item, Eac> {
        let format = self.format();
        if format == ItemFormat::Ascii {
            return match value {
                Item::Ascii(_) => Ok(value.clone()),
                other => scalar_text(other).map(Item::ascii).ok_or(Eac::OutOfRange),
            };
        }
        if !format.is_numeric() {
            return if value.format() == format {
                Ok(value.clone())
            } else {
                Err(Eac::OutOfRange)
            };
        }

        let coerced = value.coerce_to(format).ok_or(Eac::OutOfRange)?;
        let values = coerced.numeric_values().ok_or(Eac::OutOfRange)?;
        let below = |limit: &Option<Item>| {
            limit
                .as_ref()
                .and_then(Item::as_f64)
                .is_some_and(|min| values.iter().any(|v| *v < min))
        };
        let above = |limit: &Option<Item>| {
            limit
                .as_ref()
                .and_then(Item::as_f64)
                .is_some_and(|max| values.iter().any(|v| *v > max))
        };
        if below(&self.min) || above(&self.max) {
            return Err(Eac::OutOfRange);
        }
        Ok(coerced)
    }

    pub fn info(&self) -> ConstantInfo {
        ConstantInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            min: self.min.clone().unwrap_or_else(Item::empty_list),
            max: self.max.clone().unwrap_or_else(Item::empty_list),
            default: self.default.clone(),
            unit: self.unit.clone(),
        }
    }
}

fn scalar_text(item: &Item) -> Option<String> {
    if item.len() != 1 {
        return None;
    }
    item.as_i64()
        .map(|v| v.to_string())
        .or_else(|| item.as_u64().map(|v| v.to_string()))
        .or_else(|| item.as_f64().map(|v| v.to_string()))
}

/// One S2F30 entry: `L[ECID, A ECNAME, ECMIN, ECMAX, ECDEF, A UNITS]`
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantInfo {
    pub id: GemId,
    pub name: String,
    pub min: Item,
    pub max: Item,
    pub default: Item,
    pub unit: String,
}

impl ConstantInfo {
    /// Entry for an unknown ECID: empty strings and empty lists
    pub fn unknown(id: GemId) -> Self {
        Self {
            id,
            name: String::new(),
            min: Item::empty_list(),
            max: Item::empty_list(),
            default: Item::empty_list(),
            unit: String::new(),
        }
    }

    pub fn to_item(&self) -> Item {
        Item::list(vec![
            self.id.to_item(),
            Item::ascii(self.name.clone()),
            self.min.clone(),
            self.max.clone(),
            self.default.clone(),
            Item::ascii(self.unit.clone()),
        ])
    }

    pub fn from_item(item: &Item) -> Option<Self> {
        match item.as_list()? {
            [id, name, min, max, default, unit] => Some(Self {
                id: GemId::from_item(id).ok()?,
                name: name.as_ascii()?.to_string(),
                min: min.clone(),
                max: max.clone(),
                default: default.clone(),
                unit: unit.as_ascii()?.to_string(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed() -> EquipmentConstant {
        EquipmentConstant::new(5001u32, "Speed", "rpm", Item::u4(100))
            .with_range(Item::u4(10), Item::u4(500))
    }

    #[test]
    fn test_numeric_value_is_coerced_and_range_checked() {
        let ec = speed();
        assert_eq!(ec.validate(&Item::u2(250)), Ok(Item::u4(250)));
        assert_eq!(ec.validate(&Item::i8(10)), Ok(Item::u4(10)));
        assert_eq!(ec.validate(&Item::u4(501)), Err(Eac::OutOfRange));
        assert_eq!(ec.validate(&Item::u4(9)), Err(Eac::OutOfRange));
        assert_eq!(ec.validate(&Item::i4(-1)), Err(Eac::OutOfRange));
        assert_eq!(ec.validate(&Item::ascii("fast")), Err(Eac::OutOfRange));
    }

    #[test]
    fn test_ascii_constant_accepts_anything() {
        let ec = EquipmentConstant::new("RecipeDir", "RecipeDir", "", Item::ascii("/tmp"));
        assert_eq!(ec.validate(&Item::ascii("/data")), Ok(Item::ascii("/data")));
        assert_eq!(ec.validate(&Item::u4(3)), Ok(Item::ascii("3")));
        assert_eq!(ec.validate(&Item::empty_list()), Err(Eac::OutOfRange));
    }

    #[test]
    fn test_boolean_constant_requires_same_format() {
        let ec = EquipmentConstant::new(5002u32, "Enabled", "", Item::boolean(true));
        assert_eq!(ec.validate(&Item::boolean(false)), Ok(Item::boolean(false)));
        assert_eq!(ec.validate(&Item::u1(0)), Err(Eac::OutOfRange));
    }

    #[test]
    fn test_hooks_map_to_eac() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ec = speed()
            .with_validator(|value| match value.as_u64() {
                Some(v) if v % 10 == 0 => Ok(()),
                _ => anyhow::bail!("not a multiple of 10"),
            })
            .with_updater(move |value| {
                if value.as_u64() == Some(400) {
                    anyhow::bail!("drive busy");
                }
                sink.lock().push(value.clone());
                Ok(())
            });
        let id = ec.id.clone();
        assert_eq!(ec.hooks.validate(&id, &Item::u4(250)), Err(Eac::OutOfRange));
        assert_eq!(ec.hooks.validate(&id, &Item::u4(400)), Ok(()));
        assert_eq!(ec.hooks.update(&id, &Item::u4(400)), Err(Eac::Busy));
        assert_eq!(ec.hooks.update(&id, &Item::u4(300)), Ok(()));
        assert_eq!(*seen.lock(), vec![Item::u4(300)]);
        assert!(format!("{:?}", ec.hooks).contains("validator: true"));
    }

    #[test]
    fn test_info_item_shape() {
        let info = speed().info();
        let item = info.to_item();
        assert_eq!(item.len(), 6);
        assert_eq!(ConstantInfo::from_item(&item), Some(info));
    }
}
