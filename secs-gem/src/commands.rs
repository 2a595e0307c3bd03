//! Remote commands (S2F41/S2F42)

use crate::ack::{CpAck, HcAck};
use secs_core::{GemId, Item, SecsError, SecsResult};
use std::fmt;
use std::sync::Arc;

/// Action run for a remote command
pub type CommandAction = Arc<dyn Fn(&CommandParameters) -> anyhow::Result<()> + Send + Sync>;

/// Ordered CPNAME/CPVAL pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandParameters(pub Vec<(String, Item)>);

impl CommandParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Item) -> Self {
        self.0.push((name.into(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Item> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `L[L[A CPNAME, CPVAL]...]`
    pub fn to_item(&self) -> Item {
        Item::list(
            self.0
                .iter()
                .map(|(name, value)| Item::list(vec![Item::ascii(name.clone()), value.clone()]))
                .collect(),
        )
    }

    pub fn from_item(item: &Item) -> SecsResult<Self> {
        let entries = item
            .as_list()
            .ok_or_else(|| {
                SecsError::InvalidData(format!("Expected parameter list, got {}", item))
            })?;
        entries
            .iter()
            .map(|entry| match entry.as_list() {
                Some([name, value]) => name
                    .as_ascii()
                    .map(|name| (name.to_string(), value.clone()))
                    .ok_or_else(|| SecsError::InvalidData(format!("Bad CPNAME {}", name))),
                _ => Err(SecsError::InvalidData(format!("Expected CPNAME/CPVAL, got {}", entry))),
            })
            .collect::<SecsResult<Vec<_>>>()
            .map(CommandParameters)
    }
}

/// Registered remote command
#[derive(Clone)]
pub struct RemoteCommand {
    pub name: String,
    /// Accepted parameter names; empty accepts any
    pub parameters: Vec<String>,
    /// Event reported after a successful command
    pub ceid: Option<GemId>,
    pub action: CommandAction,
}

impl RemoteCommand {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&CommandParameters) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            ceid: None,
            action: Arc::new(action),
        }
    }

    pub fn with_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_event(mut self, ceid: impl Into<GemId>) -> Self {
        self.ceid = Some(ceid.into());
        self
    }

    /// Parameter names not declared by this command
    pub fn undeclared<'a>(&self, parameters: &'a CommandParameters) -> Vec<&'a str> {
        if self.parameters.is_empty() {
            return Vec::new();
        }
        parameters
            .names()
            .filter(|name| !self.parameters.iter().any(|declared| declared == name))
            .collect()
    }
}

impl fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCommand")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("ceid", &self.ceid)
            .finish_non_exhaustive()
    }
}

/// S2F42 body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub ack: HcAck,
    pub parameter_acks: Vec<(String, CpAck)>,
}

impl CommandReply {
    pub fn new(ack: HcAck) -> Self {
        Self {
            ack,
            parameter_acks: Vec::new(),
        }
    }

    /// `L[B HCACK, L[L[A CPNAME, B CPACK]...]]`
    pub fn to_item(&self) -> Item {
        Item::list(vec![
            self.ack.to_item(),
            Item::list(
                self.parameter_acks
                    .iter()
                    .map(|(name, ack)| Item::list(vec![Item::ascii(name.clone()), ack.to_item()]))
                    .collect(),
            ),
        ])
    }

    pub fn from_item(item: &Item) -> SecsResult<Self> {
        let invalid = || SecsError::InvalidData(format!("Expected S2F42 body, got {}", item));
        let [ack, entries] = item.as_list().ok_or_else(invalid)? else {
            return Err(invalid());
        };
        let ack = HcAck::from_item(ack).ok_or_else(invalid)?;
        let parameter_acks = entries
            .as_list()
            .ok_or_else(invalid)?
            .iter()
            .map(|entry| match entry.as_list() {
                Some([name, code]) => Some((name.as_ascii()?.to_string(), CpAck::from_item(code)?)),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;
        Ok(Self { ack, parameter_acks })
    }
}

/// Result of dispatching a remote command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub reply: CommandReply,
    /// Event to trigger once the reply is sent
    pub trigger: Option<GemId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_from_item() {
        let item = Item::list(vec![
            Item::list(vec![Item::ascii("LOT"), Item::ascii("L1")]),
            Item::list(vec![Item::ascii("QTY"), Item::u4(25)]),
        ]);
        let params = CommandParameters::from_item(&item).unwrap();
        assert_eq!(params.get("QTY"), Some(&Item::u4(25)));
        assert_eq!(params.to_item(), item);
        assert!(CommandParameters::from_item(&Item::list(vec![Item::u4(1)])).is_err());
    }

    #[test]
    fn test_undeclared_parameters() {
        let command = RemoteCommand::new("START", |_| Ok(())).with_parameters(["LOT"]);
        let params = CommandParameters::new()
            .with("LOT", Item::ascii("L1"))
            .with("SPEED", Item::u4(3));
        assert_eq!(command.undeclared(&params), vec!["SPEED"]);

        let open = RemoteCommand::new("STOP", |_| Ok(()));
        assert!(open.undeclared(&params).is_empty());
    }

    #[test]
    fn test_reply_layout() {
        let reply = CommandReply {
            ack: HcAck::InvalidParameter,
            parameter_acks: vec![("SPEED".to_string(), CpAck::UnknownParameter)],
        };
        let item = reply.to_item();
        assert_eq!(
            item,
            Item::list(vec![
                Item::binary(vec![3]),
                Item::list(vec![Item::list(vec![Item::ascii("SPEED"), Item::binary(vec![1])])]),
            ])
        );
        assert_eq!(CommandReply::from_item(&item).unwrap(), reply);
    }
}
