//! Body builders and parsers for the GEM messages
//!
//! Builders are infallible. Parsers take the decoded body and return
//! `SecsError::InvalidData` when it does not have the expected shape.

use crate::ack::CommAck;
use crate::alarms::{AlarmReport, ALED_ENABLE};
use crate::commands::CommandParameters;
use crate::constants::ConstantInfo;
use crate::reports::{pair, ReportDefinition};
use crate::variables::VariableInfo;
use secs_core::{GemId, Item, SecsError, SecsResult};

fn invalid(what: &str, item: &Item) -> SecsError {
    SecsError::InvalidData(format!("Expected {}, got {}", what, item))
}

fn list<'a>(item: &'a Item, what: &str) -> SecsResult<&'a [Item]> {
    item.as_list().ok_or_else(|| invalid(what, item))
}

fn text(item: &Item, what: &str) -> SecsResult<String> {
    item.as_ascii()
        .map(str::to_string)
        .ok_or_else(|| invalid(what, item))
}

/// Decode a one-byte acknowledge code
pub fn parse_ack<T>(item: &Item, decode: fn(&Item) -> Option<T>) -> SecsResult<T> {
    decode(item).ok_or_else(|| invalid("acknowledge code", item))
}

/// Model name and software revision as exchanged in S1F2/S1F13/S1F14
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub mdln: String,
    pub softrev: String,
}

impl Identity {
    pub fn new(mdln: impl Into<String>, softrev: impl Into<String>) -> Self {
        Self {
            mdln: mdln.into(),
            softrev: softrev.into(),
        }
    }

    /// `L[A MDLN, A SOFTREV]`
    pub fn to_item(&self) -> Item {
        Item::list(vec![Item::ascii(self.mdln.clone()), Item::ascii(self.softrev.clone())])
    }

    /// `None` for the host's `L[]`
    pub fn from_item(item: &Item) -> SecsResult<Option<Self>> {
        match list(item, "identity")? {
            [] => Ok(None),
            [mdln, softrev] => Ok(Some(Self {
                mdln: text(mdln, "MDLN")?,
                softrev: text(softrev, "SOFTREV")?,
            })),
            _ => Err(invalid("identity", item)),
        }
    }
}

fn identity_item(identity: Option<&Identity>) -> Item {
    identity.map(Identity::to_item).unwrap_or_else(Item::empty_list)
}

// Stream 1

/// S1F14 `L[B COMMACK, L[MDLN, SOFTREV] or L[]]`
pub fn establish_reply(ack: CommAck, identity: Option<&Identity>) -> Item {
    Item::list(vec![ack.to_item(), identity_item(identity)])
}

pub fn parse_establish_reply(item: &Item) -> SecsResult<(CommAck, Option<Identity>)> {
    let (ack, identity) = pair(item, "S1F14")?;
    Ok((parse_ack(ack, CommAck::from_item)?, Identity::from_item(identity)?))
}

/// `L[ID...]`
pub fn id_list(ids: &[GemId]) -> Item {
    Item::list(ids.iter().map(GemId::to_item).collect())
}

/// Id list from an optional body; an absent body means all
pub fn parse_id_list(body: Option<&Item>) -> SecsResult<Vec<GemId>> {
    match body {
        None => Ok(Vec::new()),
        Some(item) => GemId::list_from_item(item),
    }
}

/// S1F12 `L[L[SVID, A SVNAME, A UNITS]...]`
pub fn variable_namelist(entries: &[VariableInfo]) -> Item {
    Item::list(entries.iter().map(VariableInfo::to_item).collect())
}

pub fn parse_variable_namelist(item: &Item) -> SecsResult<Vec<VariableInfo>> {
    list(item, "SV namelist")?
        .iter()
        .map(|entry| {
            VariableInfo::from_item(entry).ok_or_else(|| invalid("SV namelist entry", entry))
        })
        .collect()
}

// Stream 2

/// S2F15 `L[L[ECID, ECV]...]`
pub fn constant_writes(values: &[(GemId, Item)]) -> Item {
    Item::list(
        values
            .iter()
            .map(|(id, value)| Item::list(vec![id.to_item(), value.clone()]))
            .collect(),
    )
}

pub fn parse_constant_writes(item: &Item) -> SecsResult<Vec<(GemId, Item)>> {
    list(item, "EC list")?
        .iter()
        .map(|entry| {
            let (id, value) = pair(entry, "ECID/ECV")?;
            Ok((GemId::from_item(id)?, value.clone()))
        })
        .collect()
}

/// S2F30 `L[L[ECID, A ECNAME, ECMIN, ECMAX, ECDEF, A UNITS]...]`
pub fn constant_namelist(entries: &[ConstantInfo]) -> Item {
    Item::list(entries.iter().map(ConstantInfo::to_item).collect())
}

pub fn parse_constant_namelist(item: &Item) -> SecsResult<Vec<ConstantInfo>> {
    list(item, "EC namelist")?
        .iter()
        .map(|entry| {
            ConstantInfo::from_item(entry).ok_or_else(|| invalid("EC namelist entry", entry))
        })
        .collect()
}

pub fn parse_time(item: &Item) -> SecsResult<String> {
    text(item, "TIME")
}

/// S2F33 `L[DATAID, L[L[RPTID, L[VID...]]...]]`
pub fn define_reports(data_id: &GemId, definitions: &[ReportDefinition]) -> Item {
    Item::list(vec![
        data_id.to_item(),
        Item::list(definitions.iter().map(ReportDefinition::to_item).collect()),
    ])
}

pub fn parse_define_reports(item: &Item) -> SecsResult<(GemId, Vec<ReportDefinition>)> {
    let (data_id, definitions) = pair(item, "S2F33")?;
    let definitions = list(definitions, "report definitions")?
        .iter()
        .map(ReportDefinition::from_item)
        .collect::<SecsResult<_>>()?;
    Ok((GemId::from_item(data_id)?, definitions))
}

/// S2F35 `L[DATAID, L[L[CEID, L[RPTID...]]...]]`
pub fn link_events(data_id: &GemId, links: &[(GemId, Vec<GemId>)]) -> Item {
    Item::list(vec![
        data_id.to_item(),
        Item::list(
            links
                .iter()
                .map(|(ceid, reports)| Item::list(vec![ceid.to_item(), id_list(reports)]))
                .collect(),
        ),
    ])
}

pub fn parse_link_events(item: &Item) -> SecsResult<(GemId, Vec<(GemId, Vec<GemId>)>)> {
    let (data_id, links) = pair(item, "S2F35")?;
    let links = list(links, "event links")?
        .iter()
        .map(|entry| {
            let (ceid, reports) = pair(entry, "CEID/RPTID list")?;
            Ok((GemId::from_item(ceid)?, GemId::list_from_item(reports)?))
        })
        .collect::<SecsResult<_>>()?;
    Ok((GemId::from_item(data_id)?, links))
}

/// S2F37 `L[BOOLEAN CEED, L[CEID...]]`
pub fn event_enable(enabled: bool, ceids: &[GemId]) -> Item {
    Item::list(vec![Item::boolean(enabled), id_list(ceids)])
}

pub fn parse_event_enable(item: &Item) -> SecsResult<(bool, Vec<GemId>)> {
    let (ceed, ceids) = pair(item, "S2F37")?;
    let enabled = ceed.as_bool().ok_or_else(|| invalid("CEED", ceed))?;
    Ok((enabled, GemId::list_from_item(ceids)?))
}

/// S2F41 `L[A RCMD, L[L[A CPNAME, CPVAL]...]]`
pub fn remote_command(name: &str, parameters: &CommandParameters) -> Item {
    Item::list(vec![Item::ascii(name), parameters.to_item()])
}

pub fn parse_remote_command(item: &Item) -> SecsResult<(String, CommandParameters)> {
    let (name, parameters) = pair(item, "S2F41")?;
    Ok((text(name, "RCMD")?, CommandParameters::from_item(parameters)?))
}

// Stream 5

/// S5F3 `L[B ALED, ALID]`; `None` addresses every alarm
pub fn alarm_enable(enabled: bool, alarm: Option<&GemId>) -> Item {
    let aled = if enabled { ALED_ENABLE } else { 0 };
    Item::list(vec![
        Item::binary(vec![aled]),
        alarm.map(GemId::to_item).unwrap_or_else(|| Item::U4(Vec::new())),
    ])
}

pub fn parse_alarm_enable(item: &Item) -> SecsResult<(bool, Vec<GemId>)> {
    let (aled, alid) = pair(item, "S5F3")?;
    let aled = aled.first_byte().ok_or_else(|| invalid("ALED", aled))?;
    let ids = if alid.is_empty() {
        Vec::new()
    } else {
        GemId::list_from_item(alid)?
    };
    Ok((aled & ALED_ENABLE != 0, ids))
}

/// S5F6/S5F8 `L[L[B ALCD, ALID, A ALTX]...]`
pub fn alarm_list(alarms: &[AlarmReport]) -> Item {
    Item::list(alarms.iter().map(AlarmReport::to_item).collect())
}

pub fn parse_alarm_list(item: &Item) -> SecsResult<Vec<AlarmReport>> {
    list(item, "alarm list")?.iter().map(AlarmReport::from_item).collect()
}

// Stream 7

/// S7F1 `L[PPID, U4 LENGTH]`
pub fn load_inquire(ppid: &GemId, length: u32) -> Item {
    Item::list(vec![ppid.to_item(), Item::u4(length)])
}

pub fn parse_load_inquire(item: &Item) -> SecsResult<(GemId, u64)> {
    let (ppid, length) = pair(item, "S7F1")?;
    let length = length.as_u64().ok_or_else(|| invalid("LENGTH", length))?;
    Ok((GemId::from_item(ppid)?, length))
}

/// S7F3/S7F6 `L[PPID, B PPBODY]`
pub fn process_program(ppid: &GemId, body: &[u8]) -> Item {
    Item::list(vec![ppid.to_item(), Item::binary(body.to_vec())])
}

/// `None` for the empty S7F6 sent when the program is unknown.
///
/// PPBODY is accepted as binary or ASCII.
pub fn parse_process_program(item: &Item) -> SecsResult<Option<(GemId, Vec<u8>)>> {
    if item.as_list().is_some_and(<[Item]>::is_empty) {
        return Ok(None);
    }
    let (ppid, body) = pair(item, "process program")?;
    let body = match body {
        Item::Binary(bytes) => bytes.clone(),
        Item::Ascii(text) => text.as_bytes().to_vec(),
        other => return Err(invalid("PPBODY", other)),
    };
    Ok(Some((GemId::from_item(ppid)?, body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::DrAck;

    #[test]
    fn test_identity_and_establish() {
        let identity = Identity::new("secs4rs", "0.1.0");
        let body = establish_reply(CommAck::Accepted, Some(&identity));
        let (ack, parsed) = parse_establish_reply(&body).unwrap();
        assert_eq!(ack, CommAck::Accepted);
        assert_eq!(parsed, Some(identity));

        let host = establish_reply(CommAck::Denied, None);
        assert_eq!(parse_establish_reply(&host).unwrap(), (CommAck::Denied, None));
        assert!(Identity::from_item(&Item::list(vec![Item::u1(1)])).is_err());
    }

    #[test]
    fn test_define_reports_body() {
        let body = Item::list(vec![
            Item::u4(1),
            Item::list(vec![Item::list(vec![
                Item::u4(4001),
                Item::list(vec![Item::u4(1001), Item::u4(2001)]),
            ])]),
        ]);
        let (data_id, definitions) = parse_define_reports(&body).unwrap();
        assert_eq!(data_id, GemId::from(1u32));
        assert_eq!(
            definitions,
            vec![ReportDefinition::new(4001u32, vec![GemId::from(1001u32), GemId::from(2001u32)])]
        );
        assert_eq!(define_reports(&data_id, &definitions), body);
        assert!(parse_define_reports(&Item::u4(1)).is_err());
    }

    #[test]
    fn test_link_and_enable_bodies() {
        let links = vec![(GemId::from(3001u32), vec![GemId::from(4001u32)])];
        let body = link_events(&GemId::from(2u32), &links);
        assert_eq!(parse_link_events(&body).unwrap(), (GemId::from(2u32), links));

        let body = event_enable(false, &[]);
        assert_eq!(body, Item::list(vec![Item::boolean(false), Item::empty_list()]));
        assert_eq!(parse_event_enable(&body).unwrap(), (false, vec![]));
    }

    #[test]
    fn test_alarm_enable_body() {
        let body = alarm_enable(true, Some(&GemId::from(7001u32)));
        assert_eq!(parse_alarm_enable(&body).unwrap(), (true, vec![GemId::from(7001u32)]));
        let all = alarm_enable(false, None);
        assert_eq!(parse_alarm_enable(&all).unwrap(), (false, vec![]));
    }

    #[test]
    fn test_process_program_bodies() {
        let ppid = GemId::from("SAMPLE");
        let body = process_program(&ppid, b"GDSCRIPT-001");
        assert_eq!(
            parse_process_program(&body).unwrap(),
            Some((ppid.clone(), b"GDSCRIPT-001".to_vec()))
        );
        assert_eq!(parse_process_program(&Item::empty_list()).unwrap(), None);

        let ascii = Item::list(vec![ppid.to_item(), Item::ascii("G1")]);
        assert_eq!(parse_process_program(&ascii).unwrap(), Some((ppid, b"G1".to_vec())));

        let inquire = load_inquire(&GemId::from("SAMPLE"), 12);
        assert_eq!(parse_load_inquire(&inquire).unwrap().1, 12);
    }

    #[test]
    fn test_parse_ack_and_ids() {
        assert_eq!(
            parse_ack(&Item::binary(vec![4]), DrAck::from_item).unwrap(),
            DrAck::UnknownVariable
        );
        assert!(parse_ack(&Item::ascii("x"), DrAck::from_item).is_err());
        assert!(parse_id_list(None).unwrap().is_empty());
        assert_eq!(
            parse_id_list(Some(&id_list(&[GemId::from(5u32)]))).unwrap(),
            vec![GemId::from(5u32)]
        );
    }

    #[test]
    fn test_constant_writes_body() {
        let writes = vec![(GemId::from(5001u32), Item::u4(250))];
        assert_eq!(parse_constant_writes(&constant_writes(&writes)).unwrap(), writes);
        assert!(parse_constant_writes(&Item::list(vec![Item::u4(1)])).is_err());
    }
}
