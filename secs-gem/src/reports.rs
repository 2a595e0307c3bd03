//! Report definitions, collection events and event reports

use secs_core::{GemId, Item, SecsError, SecsResult};

/// Report definition: RPTID and its ordered VIDs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDefinition {
    pub id: GemId,
    pub variables: Vec<GemId>,
}

impl ReportDefinition {
    pub fn new(id: impl Into<GemId>, variables: Vec<GemId>) -> Self {
        Self {
            id: id.into(),
            variables,
        }
    }

    /// `L[RPTID, L[VID...]]`
    pub fn to_item(&self) -> Item {
        Item::list(vec![
            self.id.to_item(),
            Item::list(self.variables.iter().map(GemId::to_item).collect()),
        ])
    }

    pub fn from_item(item: &Item) -> SecsResult<Self> {
        let (id, variables) = pair(item, "report definition")?;
        Ok(Self {
            id: GemId::from_item(id)?,
            variables: GemId::list_from_item(variables)?,
        })
    }
}

/// Collection event (CE) with its CEED flag and linked reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEvent {
    pub id: GemId,
    pub name: String,
    pub enabled: bool,
    pub reports: Vec<GemId>,
}

impl CollectionEvent {
    /// Events are enabled when registered
    pub fn new(id: impl Into<GemId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            reports: Vec::new(),
        }
    }
}

/// One report instance: RPTID and the values at trigger time
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: GemId,
    pub values: Vec<Item>,
}

impl Report {
    /// `L[RPTID, L[V...]]`
    pub fn to_item(&self) -> Item {
        Item::list(vec![self.id.to_item(), Item::list(self.values.clone())])
    }

    pub fn from_item(item: &Item) -> SecsResult<Self> {
        let (id, values) = pair(item, "report")?;
        let values = values
            .as_list()
            .ok_or_else(|| SecsError::InvalidData(format!("Expected value list, got {}", values)))?;
        Ok(Self {
            id: GemId::from_item(id)?,
            values: values.to_vec(),
        })
    }
}

/// Payload of S6F11 and S6F16
#[derive(Debug, Clone, PartialEq)]
pub struct EventReport {
    pub data_id: GemId,
    pub ceid: GemId,
    pub reports: Vec<Report>,
}

impl EventReport {
    /// `L[DATAID, CEID, L[L[RPTID, L[V...]]...]]`
    pub fn to_item(&self) -> Item {
        Item::list(vec![
            self.data_id.to_item(),
            self.ceid.to_item(),
            Item::list(self.reports.iter().map(Report::to_item).collect()),
        ])
    }

    pub fn from_item(item: &Item) -> SecsResult<Self> {
        match item.as_list() {
            Some([data_id, ceid, reports]) => {
                let reports = reports
                    .as_list()
                    .ok_or_else(|| {
                        SecsError::InvalidData(format!("Expected report list, got {}", reports))
                    })?;
                Ok(Self {
                    data_id: GemId::from_item(data_id)?,
                    ceid: GemId::from_item(ceid)?,
                    reports: reports.iter().map(Report::from_item).collect::<SecsResult<_>>()?,
                })
            }
            _ => Err(SecsError::InvalidData(format!("Expected event report, got {}", item))),
        }
    }

    pub fn report(&self, id: &GemId) -> Option<&Report> {
        self.reports.iter().find(|report| &report.id == id)
    }
}

/// Split a two-element list
pub(crate) fn pair<'a>(item: &'a Item, what: &str) -> SecsResult<(&'a Item, &'a Item)> {
    match item.as_list() {
        Some([first, second]) => Ok((first, second)),
        _ => Err(SecsError::InvalidData(format!("Expected {} pair, got {}", what, item))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_report_layout() {
        let report = EventReport {
            data_id: GemId::from(1u32),
            ceid: GemId::from(3001u32),
            reports: vec![Report {
                id: GemId::from(4001u32),
                values: vec![Item::u4(7), Item::ascii("idle")],
            }],
        };
        let item = report.to_item();
        assert_eq!(
            item,
            Item::list(vec![
                Item::u4(1),
                Item::u4(3001),
                Item::list(vec![Item::list(vec![
                    Item::u4(4001),
                    Item::list(vec![Item::u4(7), Item::ascii("idle")]),
                ])]),
            ])
        );
        assert_eq!(EventReport::from_item(&item).unwrap(), report);
    }

    #[test]
    fn test_definition_accepts_vector_vids() {
        let item = Item::list(vec![Item::u2(10), Item::U4(vec![1001, 2001])]);
        let definition = ReportDefinition::from_item(&item).unwrap();
        assert_eq!(definition.id, GemId::from(10u32));
        assert_eq!(definition.variables, vec![GemId::from(1001u32), GemId::from(2001u32)]);
    }

    #[test]
    fn test_malformed_report() {
        assert!(Report::from_item(&Item::u4(1)).is_err());
        assert!(EventReport::from_item(&Item::empty_list()).is_err());
    }
}
