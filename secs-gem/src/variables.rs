//! Status and data variables

use secs_core::{GemId, Item};
use std::fmt;
use std::sync::Arc;

/// Callback producing the current value of a status variable
pub type ValueResolver = Arc<dyn Fn() -> Item + Send + Sync>;

#[derive(Clone)]
pub enum ValueSource {
    Stored(Item),
    Resolver(ValueResolver),
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Stored(item) => write!(f, "Stored({})", item),
            ValueSource::Resolver(_) => f.write_str("Resolver"),
        }
    }
}

/// Status variable (SV)
#[derive(Debug, Clone)]
pub struct StatusVariable {
    pub id: GemId,
    pub name: String,
    pub unit: String,
    pub source: ValueSource,
}

impl StatusVariable {
    /// SV holding `initial` until updated through the model
    pub fn new(
        id: impl Into<GemId>,
        name: impl Into<String>,
        unit: impl Into<String>,
        initial: Item,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit: unit.into(),
            source: ValueSource::Stored(initial),
        }
    }

    /// SV whose value is computed at read time
    pub fn with_resolver<F>(
        id: impl Into<GemId>,
        name: impl Into<String>,
        unit: impl Into<String>,
        resolver: F,
    ) -> Self
    where
        F: Fn() -> Item + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            unit: unit.into(),
            source: ValueSource::Resolver(Arc::new(resolver)),
        }
    }

    pub fn info(&self) -> VariableInfo {
        VariableInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            unit: self.unit.clone(),
        }
    }
}

/// Data variable (DV), valid at the time an event is triggered
#[derive(Debug, Clone)]
pub struct DataVariable {
    pub id: GemId,
    pub name: String,
    pub unit: String,
    pub value: Item,
}

impl DataVariable {
    pub fn new(
        id: impl Into<GemId>,
        name: impl Into<String>,
        unit: impl Into<String>,
        initial: Item,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit: unit.into(),
            value: initial,
        }
    }
}

/// One S1F12 entry: `L[SVID, A SVNAME, A UNITS]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub id: GemId,
    pub name: String,
    pub unit: String,
}

impl VariableInfo {
    /// Entry for an id the equipment does not know
    pub fn unknown(id: GemId) -> Self {
        Self {
            id,
            name: String::new(),
            unit: String::new(),
        }
    }

    pub fn to_item(&self) -> Item {
        Item::list(vec![
            self.id.to_item(),
            Item::ascii(self.name.clone()),
            Item::ascii(self.unit.clone()),
        ])
    }

    pub fn from_item(item: &Item) -> Option<Self> {
        match item.as_list()? {
            [id, name, unit] => Some(Self {
                id: GemId::from_item(id).ok()?,
                name: name.as_ascii()?.to_string(),
                unit: unit.as_ascii()?.to_string(),
            }),
            _ => None,
        }
    }
}
