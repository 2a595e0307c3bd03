//! GEM entity model
//!
//! [`GemModel`] owns every equipment-side registry: status and data
//! variables, equipment constants, reports, collection events, remote
//! commands, alarms, process programs and the clock. All state sits behind
//! one mutex; value resolvers and command actions run after it is released.

use crate::ack::{AckC5, AckC7, CpAck, DrAck, Eac, ErAck, HcAck, LrAck, PpGnt, TiAck};
use crate::alarms::{Alarm, AlarmReport};
use crate::clock::GemClock;
use crate::commands::{CommandOutcome, CommandParameters, CommandReply, RemoteCommand};
use crate::constants::{ConstantInfo, ConstantProvider, EquipmentConstant};
use crate::programs::{ProgramRequestHandler, ProgramStore, ProgramUploadHandler};
use crate::reports::{CollectionEvent, EventReport, Report, ReportDefinition};
use crate::variables::{DataVariable, StatusVariable, ValueResolver, ValueSource, VariableInfo};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use secs_core::{GemId, Item, SecsError, SecsResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Insertion-ordered map keyed by [`GemId`]
#[derive(Debug)]
struct Registry<T> {
    entries: Vec<(GemId, T)>,
    index: HashMap<GemId, usize>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Registry<T> {
    fn contains(&self, id: &GemId) -> bool {
        self.index.contains_key(id)
    }

    fn get(&self, id: &GemId) -> Option<&T> {
        self.index.get(id).map(|&i| &self.entries[i].1)
    }

    fn get_mut(&mut self, id: &GemId) -> Option<&mut T> {
        let i = *self.index.get(id)?;
        Some(&mut self.entries[i].1)
    }

    /// Insert or replace in place
    fn insert(&mut self, id: GemId, value: T) {
        match self.index.get(&id) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(id.clone(), self.entries.len());
                self.entries.push((id, value));
            }
        }
    }

    fn remove(&mut self, id: &GemId) -> Option<T> {
        let i = self.index.remove(id)?;
        let (_, value) = self.entries.remove(i);
        for (position, (key, _)) in self.entries.iter().enumerate().skip(i) {
            self.index.insert(key.clone(), position);
        }
        Some(value)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    fn ids(&self) -> impl Iterator<Item = &GemId> {
        self.entries.iter().map(|(id, _)| id)
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, value)| value)
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, value)| value)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A variable value captured under the lock, resolved after release
enum Snapshot {
    Value(Item),
    Resolver(ValueResolver),
    Provider(GemId, ConstantProvider),
    Missing,
}

impl Snapshot {
    fn resolve(self) -> Item {
        match self {
            Snapshot::Value(item) => item,
            Snapshot::Resolver(resolver) => resolver(),
            Snapshot::Provider(id, provider) => provider().unwrap_or_else(|err| {
                log::warn!("Constant {} has no value: {}", id, err);
                Item::empty_list()
            }),
            Snapshot::Missing => Item::empty_list(),
        }
    }
}

fn resolve_all(snapshots: Vec<Snapshot>) -> Vec<Item> {
    snapshots.into_iter().map(Snapshot::resolve).collect()
}

#[derive(Default)]
struct ModelState {
    status: Registry<StatusVariable>,
    data: Registry<DataVariable>,
    constants: Registry<EquipmentConstant>,
    reports: Registry<ReportDefinition>,
    events: Registry<CollectionEvent>,
    commands: HashMap<String, RemoteCommand>,
    alarms: Registry<Alarm>,
    programs: ProgramStore,
    program_upload: Option<ProgramUploadHandler>,
    program_request: Option<ProgramRequestHandler>,
    clock: GemClock,
    data_id: u32,
}

impl ModelState {
    fn is_variable(&self, id: &GemId) -> bool {
        self.status.contains(id) || self.data.contains(id) || self.constants.contains(id)
    }

    fn ensure_new_variable(&self, id: &GemId) -> SecsResult<()> {
        if self.is_variable(id) {
            return Err(SecsError::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    /// VIDs resolve to SVs first, then DVs, then ECs
    fn snapshot(&self, id: &GemId) -> Snapshot {
        if let Some(sv) = self.status.get(id) {
            return match &sv.source {
                ValueSource::Stored(item) => Snapshot::Value(item.clone()),
                ValueSource::Resolver(resolver) => Snapshot::Resolver(resolver.clone()),
            };
        }
        if let Some(dv) = self.data.get(id) {
            return Snapshot::Value(dv.value.clone());
        }
        self.constant_snapshot(id)
    }

    fn constant_snapshot(&self, id: &GemId) -> Snapshot {
        match self.constants.get(id) {
            Some(ec) => match &ec.hooks.provider {
                Some(provider) => Snapshot::Provider(ec.id.clone(), provider.clone()),
                None => Snapshot::Value(ec.value.clone()),
            },
            None => Snapshot::Missing,
        }
    }

    fn status_snapshot(&self, id: &GemId) -> Snapshot {
        match self.status.get(id).map(|sv| &sv.source) {
            Some(ValueSource::Stored(item)) => Snapshot::Value(item.clone()),
            Some(ValueSource::Resolver(resolver)) => Snapshot::Resolver(resolver.clone()),
            None => Snapshot::Missing,
        }
    }

    fn report_snapshot(&self, id: &GemId) -> Option<(GemId, Vec<Snapshot>)> {
        let definition = self.reports.get(id)?;
        let values = definition.variables.iter().map(|vid| self.snapshot(vid)).collect();
        Some((id.clone(), values))
    }

    fn event_snapshot(&self, event: &CollectionEvent) -> Vec<(GemId, Vec<Snapshot>)> {
        event
            .reports
            .iter()
            .filter_map(|rptid| self.report_snapshot(rptid))
            .collect()
    }

    fn next_data_id(&mut self) -> GemId {
        self.data_id = self.data_id.wrapping_add(1);
        GemId::from(self.data_id)
    }

    fn check_definition(&self, id: &GemId, variables: &[GemId]) -> SecsResult<()> {
        if variables.is_empty() {
            return Ok(());
        }
        if let Some(existing) = self.reports.get(id) {
            if existing.variables != variables {
                return Err(SecsError::DuplicateId(id.to_string()));
            }
        }
        if let Some(unknown) = variables.iter().find(|vid| !self.is_variable(vid)) {
            return Err(SecsError::UnknownVariable(unknown.to_string()));
        }
        Ok(())
    }

    fn apply_definition(&mut self, id: GemId, variables: Vec<GemId>) {
        if variables.is_empty() {
            if self.reports.remove(&id).is_some() {
                for event in self.events.values_mut() {
                    event.reports.retain(|rptid| rptid != &id);
                }
                log::debug!("Deleted report {}", id);
            }
            return;
        }
        log::debug!("Defined report {} with {} variables", id, variables.len());
        self.reports.insert(id.clone(), ReportDefinition { id, variables });
    }

    fn check_link(&self, ceid: &GemId, reports: &[GemId]) -> SecsResult<()> {
        let event = self
            .events
            .get(ceid)
            .ok_or_else(|| SecsError::UnknownEvent(ceid.to_string()))?;
        if reports.is_empty() {
            return Ok(());
        }
        if !event.reports.is_empty() {
            return Err(SecsError::AlreadyLinked(ceid.to_string()));
        }
        if let Some(unknown) = reports.iter().find(|rptid| !self.reports.contains(rptid)) {
            return Err(SecsError::UnknownReport(unknown.to_string()));
        }
        Ok(())
    }
}

/// Thread-safe GEM entity model
#[derive(Default)]
pub struct GemModel {
    state: Mutex<ModelState>,
}

impl GemModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model whose process programs are limited to `max_program_size` bytes
    pub fn with_program_limit(max_program_size: usize) -> Self {
        let model = Self::default();
        model.state.lock().programs = ProgramStore::with_max_size(max_program_size);
        model
    }

    // Registration

    pub fn register_status_variable(&self, sv: StatusVariable) -> SecsResult<()> {
        let mut state = self.state.lock();
        state.ensure_new_variable(&sv.id)?;
        state.status.insert(sv.id.clone(), sv);
        Ok(())
    }

    pub fn register_data_variable(&self, dv: DataVariable) -> SecsResult<()> {
        let mut state = self.state.lock();
        state.ensure_new_variable(&dv.id)?;
        state.data.insert(dv.id.clone(), dv);
        Ok(())
    }

    pub fn register_constant(&self, ec: EquipmentConstant) -> SecsResult<()> {
        let mut state = self.state.lock();
        state.ensure_new_variable(&ec.id)?;
        state.constants.insert(ec.id.clone(), ec);
        Ok(())
    }

    pub fn register_event(&self, event: CollectionEvent) -> SecsResult<()> {
        let mut state = self.state.lock();
        if state.events.contains(&event.id) {
            return Err(SecsError::DuplicateId(event.id.to_string()));
        }
        state.events.insert(event.id.clone(), event);
        Ok(())
    }

    pub fn register_command(&self, command: RemoteCommand) -> SecsResult<()> {
        let mut state = self.state.lock();
        if state.commands.contains_key(&command.name) {
            return Err(SecsError::DuplicateId(command.name));
        }
        state.commands.insert(command.name.clone(), command);
        Ok(())
    }

    pub fn register_alarm(&self, alarm: Alarm) -> SecsResult<()> {
        let mut state = self.state.lock();
        if state.alarms.contains(&alarm.id) {
            return Err(SecsError::DuplicateId(alarm.id.to_string()));
        }
        state.alarms.insert(alarm.id.clone(), alarm);
        Ok(())
    }

    // Status and data variables

    /// Store a new SV value; a resolver-backed SV switches to the stored value
    pub fn set_status_value(&self, id: &GemId, value: Item) -> SecsResult<()> {
        let mut state = self.state.lock();
        let sv = state
            .status
            .get_mut(id)
            .ok_or_else(|| SecsError::UnknownVariable(id.to_string()))?;
        sv.source = ValueSource::Stored(value);
        Ok(())
    }

    pub fn set_data_value(&self, id: &GemId, value: Item) -> SecsResult<()> {
        let mut state = self.state.lock();
        let dv = state
            .data
            .get_mut(id)
            .ok_or_else(|| SecsError::UnknownVariable(id.to_string()))?;
        dv.value = value;
        Ok(())
    }

    /// Current SV value; an empty list for unknown ids
    pub fn read_status_value(&self, id: &GemId) -> Item {
        let snapshot = self.state.lock().status_snapshot(id);
        snapshot.resolve()
    }

    /// Values for S1F4; every SV in registration order when `ids` is empty
    pub fn status_values(&self, ids: &[GemId]) -> Vec<Item> {
        let snapshots = {
            let state = self.state.lock();
            if ids.is_empty() {
                state.status.ids().map(|id| state.status_snapshot(id)).collect()
            } else {
                ids.iter().map(|id| state.status_snapshot(id)).collect()
            }
        };
        resolve_all(snapshots)
    }

    /// Entries for S1F12; unknown ids get empty name and unit
    pub fn status_namelist(&self, ids: &[GemId]) -> Vec<VariableInfo> {
        let state = self.state.lock();
        if ids.is_empty() {
            return state.status.values().map(StatusVariable::info).collect();
        }
        ids.iter()
            .map(|id| {
                state
                    .status
                    .get(id)
                    .map(StatusVariable::info)
                    .unwrap_or_else(|| VariableInfo::unknown(id.clone()))
            })
            .collect()
    }

    /// Value of any SV, DV or EC
    pub fn variable_value(&self, id: &GemId) -> Option<Item> {
        let snapshot = self.state.lock().snapshot(id);
        match snapshot {
            Snapshot::Missing => None,
            snapshot => Some(snapshot.resolve()),
        }
    }

    // Equipment constants

    /// Current EC value; an empty list for unknown ids
    pub fn read_constant(&self, id: &GemId) -> Item {
        let snapshot = self.state.lock().constant_snapshot(id);
        snapshot.resolve()
    }

    /// Values for S2F14; every EC when `ids` is empty
    pub fn read_constants(&self, ids: &[GemId]) -> Vec<Item> {
        let snapshots = {
            let state = self.state.lock();
            if ids.is_empty() {
                state
                    .constants
                    .ids()
                    .map(|id| state.constant_snapshot(id))
                    .collect()
            } else {
                ids.iter().map(|id| state.constant_snapshot(id)).collect()
            }
        };
        resolve_all(snapshots)
    }

    pub fn write_constant(&self, id: &GemId, value: &Item) -> Eac {
        self.write_constants(&[(id.clone(), value.clone())])
    }

    /// Apply an S2F15 request.
    ///
    /// Every entry passes the range check and its validator before any
    /// updater runs. An updater failure stops the write at that entry.
    pub fn write_constants(&self, values: &[(GemId, Item)]) -> Eac {
        let mut accepted = Vec::with_capacity(values.len());
        {
            let state = self.state.lock();
            for (id, value) in values {
                let Some(ec) = state.constants.get(id) else {
                    log::warn!("Write to unknown constant {}", id);
                    return Eac::DoesNotExist;
                };
                match ec.validate(value) {
                    Ok(normalized) => accepted.push((id, normalized, ec.hooks.clone())),
                    Err(eac) => {
                        log::warn!("Rejected value {} for constant {}", value, id);
                        return eac;
                    }
                }
            }
        }

        for (id, value, hooks) in &accepted {
            if let Err(eac) = hooks.validate(id, value) {
                return eac;
            }
        }
        for (id, value, hooks) in accepted {
            if let Err(eac) = hooks.update(id, &value) {
                return eac;
            }
            if hooks.provider.is_none() {
                if let Some(ec) = self.state.lock().constants.get_mut(id) {
                    ec.value = value;
                }
            }
        }
        Eac::Accepted
    }

    /// Entries for S2F30; every EC when `ids` is empty
    pub fn constant_namelist(&self, ids: &[GemId]) -> Vec<ConstantInfo> {
        let state = self.state.lock();
        if ids.is_empty() {
            return state.constants.values().map(EquipmentConstant::info).collect();
        }
        ids.iter()
            .map(|id| {
                state
                    .constants
                    .get(id)
                    .map(EquipmentConstant::info)
                    .unwrap_or_else(|| ConstantInfo::unknown(id.clone()))
            })
            .collect()
    }

    // Reports and events

    /// Define one report; an empty variable list deletes it
    pub fn define_report(&self, id: GemId, variables: Vec<GemId>) -> SecsResult<()> {
        let mut state = self.state.lock();
        state.check_definition(&id, &variables)?;
        state.apply_definition(id, variables);
        Ok(())
    }

    /// Apply an S2F33 request as a whole
    pub fn define_reports(&self, definitions: Vec<ReportDefinition>) -> DrAck {
        let mut state = self.state.lock();
        if definitions.is_empty() {
            state.reports.clear();
            for event in state.events.values_mut() {
                event.reports.clear();
            }
            log::info!("Deleted all report definitions");
            return DrAck::Accepted;
        }

        let mut seen = HashSet::new();
        for definition in &definitions {
            if !seen.insert(&definition.id) {
                return DrAck::AlreadyDefined;
            }
            match state.check_definition(&definition.id, &definition.variables) {
                Ok(()) => {}
                Err(SecsError::DuplicateId(_)) => return DrAck::AlreadyDefined,
                Err(SecsError::UnknownVariable(vid)) => {
                    log::warn!("Report {} references unknown variable {}", definition.id, vid);
                    return DrAck::UnknownVariable;
                }
                Err(_) => return DrAck::InvalidFormat,
            }
        }
        for definition in definitions {
            state.apply_definition(definition.id, definition.variables);
        }
        DrAck::Accepted
    }

    /// Link reports to one event; an empty list unlinks it
    pub fn link_event(&self, ceid: &GemId, reports: Vec<GemId>) -> SecsResult<()> {
        let mut state = self.state.lock();
        state.check_link(ceid, &reports)?;
        if let Some(event) = state.events.get_mut(ceid) {
            event.reports = reports;
        }
        Ok(())
    }

    /// Apply an S2F35 request as a whole
    pub fn link_events(&self, links: Vec<(GemId, Vec<GemId>)>) -> LrAck {
        let mut state = self.state.lock();
        let mut seen = HashSet::new();
        for (ceid, reports) in &links {
            if !seen.insert(ceid) {
                return LrAck::AlreadyLinked;
            }
            match state.check_link(ceid, reports) {
                Ok(()) => {}
                Err(SecsError::UnknownEvent(_)) => return LrAck::UnknownEvent,
                Err(SecsError::UnknownReport(_)) => return LrAck::UnknownReport,
                Err(SecsError::AlreadyLinked(_)) => return LrAck::AlreadyLinked,
                Err(_) => return LrAck::InvalidFormat,
            }
        }
        for (ceid, reports) in links {
            if let Some(event) = state.events.get_mut(&ceid) {
                event.reports = reports;
            }
        }
        LrAck::Accepted
    }

    /// Apply an S2F37 request; an empty list applies to every event
    pub fn set_event_enable(&self, enabled: bool, ceids: &[GemId]) -> ErAck {
        let mut state = self.state.lock();
        if ceids.is_empty() {
            for event in state.events.values_mut() {
                event.enabled = enabled;
            }
            return ErAck::Accepted;
        }
        if ceids.iter().any(|ceid| !state.events.contains(ceid)) {
            return ErAck::UnknownEvent;
        }
        for ceid in ceids {
            if let Some(event) = state.events.get_mut(ceid) {
                event.enabled = enabled;
            }
        }
        ErAck::Accepted
    }

    pub fn is_event_enabled(&self, ceid: &GemId) -> Option<bool> {
        self.state.lock().events.get(ceid).map(|event| event.enabled)
    }

    pub fn linked_reports(&self, ceid: &GemId) -> Option<Vec<GemId>> {
        self.state.lock().events.get(ceid).map(|event| event.reports.clone())
    }

    pub fn report_definition(&self, rptid: &GemId) -> Option<ReportDefinition> {
        self.state.lock().reports.get(rptid).cloned()
    }

    pub fn report_count(&self) -> usize {
        self.state.lock().reports.len()
    }

    /// Build the S6F11 payload for `ceid`.
    ///
    /// Returns `None` when the event is disabled or has no linked reports.
    pub fn trigger_event(&self, ceid: &GemId) -> SecsResult<Option<EventReport>> {
        let (data_id, snapshots) = {
            let mut state = self.state.lock();
            let event = state
                .events
                .get(ceid)
                .ok_or_else(|| SecsError::UnknownEvent(ceid.to_string()))?;
            if !event.enabled || event.reports.is_empty() {
                log::debug!("Event {} not reported", ceid);
                return Ok(None);
            }
            let snapshots = state.event_snapshot(event);
            (state.next_data_id(), snapshots)
        };
        Ok(Some(build_report(data_id, ceid.clone(), snapshots)))
    }

    /// Event report for S6F15 regardless of the enable flag
    pub fn event_report(&self, ceid: &GemId) -> SecsResult<EventReport> {
        let (data_id, snapshots) = {
            let mut state = self.state.lock();
            let event = state
                .events
                .get(ceid)
                .ok_or_else(|| SecsError::UnknownEvent(ceid.to_string()))?;
            let snapshots = state.event_snapshot(event);
            (state.next_data_id(), snapshots)
        };
        Ok(build_report(data_id, ceid.clone(), snapshots))
    }

    /// Current values of one report (S6F19)
    pub fn report_values(&self, rptid: &GemId) -> SecsResult<Vec<Item>> {
        let snapshot = self
            .state
            .lock()
            .report_snapshot(rptid)
            .ok_or_else(|| SecsError::UnknownReport(rptid.to_string()))?;
        Ok(resolve_all(snapshot.1))
    }

    pub fn next_data_id(&self) -> GemId {
        self.state.lock().next_data_id()
    }

    // Remote commands

    /// Run a remote command and build the S2F42 reply
    pub fn dispatch_command(&self, name: &str, parameters: &CommandParameters) -> CommandOutcome {
        let Some(command) = self.state.lock().commands.get(name).cloned() else {
            log::warn!("Unknown remote command {:?}", name);
            return CommandOutcome {
                reply: CommandReply::new(HcAck::InvalidCommand),
                trigger: None,
            };
        };

        let undeclared = command.undeclared(parameters);
        if !undeclared.is_empty() {
            log::warn!("Remote command {} got undeclared parameters {:?}", name, undeclared);
            return CommandOutcome {
                reply: CommandReply {
                    ack: HcAck::InvalidParameter,
                    parameter_acks: undeclared
                        .into_iter()
                        .map(|p| (p.to_string(), CpAck::UnknownParameter))
                        .collect(),
                },
                trigger: None,
            };
        }

        match (command.action)(parameters) {
            Ok(()) => {
                log::info!("Remote command {} accepted", name);
                CommandOutcome {
                    reply: CommandReply::new(HcAck::Acknowledged),
                    trigger: command.ceid,
                }
            }
            Err(err) => {
                log::warn!("Remote command {} failed: {:#}", name, err);
                CommandOutcome {
                    reply: CommandReply::new(HcAck::CannotPerformNow),
                    trigger: None,
                }
            }
        }
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.state.lock().commands.contains_key(name)
    }

    // Alarms

    /// Mark an alarm set; returns the S5F1 payload if it should be sent
    pub fn set_alarm(&self, id: &GemId) -> SecsResult<Option<AlarmReport>> {
        self.change_alarm(id, true)
    }

    pub fn clear_alarm(&self, id: &GemId) -> SecsResult<Option<AlarmReport>> {
        self.change_alarm(id, false)
    }

    fn change_alarm(&self, id: &GemId, set: bool) -> SecsResult<Option<AlarmReport>> {
        let mut state = self.state.lock();
        let alarm = state
            .alarms
            .get_mut(id)
            .ok_or_else(|| SecsError::UnknownAlarm(id.to_string()))?;
        if alarm.set == set {
            return Ok(None);
        }
        alarm.set = set;
        log::info!("Alarm {} {}", id, if set { "set" } else { "cleared" });
        Ok(alarm.enabled.then(|| alarm.report()))
    }

    /// Apply an S5F3 request; an empty list applies to every alarm
    pub fn set_alarm_enable(&self, enabled: bool, ids: &[GemId]) -> AckC5 {
        let mut state = self.state.lock();
        if ids.iter().any(|id| !state.alarms.contains(id)) {
            return AckC5::Error;
        }
        for alarm in state.alarms.values_mut() {
            if ids.is_empty() || ids.contains(&alarm.id) {
                alarm.enabled = enabled;
            }
        }
        AckC5::Accepted
    }

    /// Alarms for S5F6; every alarm when `ids` is empty, unknown ids skipped
    pub fn list_alarms(&self, ids: &[GemId]) -> Vec<AlarmReport> {
        let state = self.state.lock();
        if ids.is_empty() {
            return state.alarms.values().map(Alarm::report).collect();
        }
        ids.iter()
            .filter_map(|id| state.alarms.get(id).map(Alarm::report))
            .collect()
    }

    /// Enabled alarms for S5F8
    pub fn enabled_alarms(&self) -> Vec<AlarmReport> {
        self.state
            .lock()
            .alarms
            .values()
            .filter(|alarm| alarm.enabled)
            .map(Alarm::report)
            .collect()
    }

    pub fn alarm(&self, id: &GemId) -> Option<Alarm> {
        self.state.lock().alarms.get(id).cloned()
    }

    // Process programs

    pub fn store_program(&self, id: GemId, body: Vec<u8>) -> SecsResult<()> {
        log::info!("Storing process program {} ({} bytes)", id, body.len());
        self.state.lock().programs.store(id, body)
    }

    pub fn load_program(&self, id: &GemId) -> SecsResult<Vec<u8>> {
        self.state.lock().programs.load(id).map(<[u8]>::to_vec)
    }

    pub fn delete_programs(&self, ids: &[GemId]) -> SecsResult<()> {
        self.state.lock().programs.delete(ids)
    }

    pub fn list_programs(&self) -> Vec<GemId> {
        self.state.lock().programs.list()
    }

    pub fn program_grant(&self, length: usize) -> PpGnt {
        self.state.lock().programs.grant(length)
    }

    /// Let `handler` decide every program the host sends
    pub fn set_program_upload_handler<F>(&self, handler: F)
    where
        F: Fn(&GemId, &[u8]) -> AckC7 + Send + Sync + 'static,
    {
        self.state.lock().program_upload = Some(Arc::new(handler));
    }

    /// Serve program requests from `handler` instead of the store
    pub fn set_program_request_handler<F>(&self, handler: F)
    where
        F: Fn(&GemId) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.state.lock().program_request = Some(Arc::new(handler));
    }

    /// Take a program sent by the host (S7F3) and answer with its ACKC7
    pub fn receive_program(&self, id: GemId, body: Vec<u8>) -> AckC7 {
        let handler = self.state.lock().program_upload.clone();
        if let Some(handler) = handler {
            let ack = handler(&id, &body);
            if ack != AckC7::Accepted {
                log::warn!("Process program {} refused: {:?}", id, ack);
                return ack;
            }
        }
        match self.store_program(id, body) {
            Ok(()) => AckC7::Accepted,
            Err(err) => {
                log::warn!("Process program refused: {}", err);
                AckC7::from_error(&err)
            }
        }
    }

    /// Body to answer a program request (S7F5) with, if any
    pub fn serve_program(&self, id: &GemId) -> Option<Vec<u8>> {
        let handler = self.state.lock().program_request.clone();
        match handler {
            Some(handler) => handler(id),
            None => match self.load_program(id) {
                Ok(body) => Some(body),
                Err(err) => {
                    log::warn!("{}", err);
                    None
                }
            },
        }
    }

    // Clock

    pub fn clock_string(&self) -> String {
        let clock = self.state.lock().clock.clone();
        clock.now_string()
    }

    pub fn set_clock(&self, text: &str) -> TiAck {
        let mut clock = self.state.lock().clock.clone();
        let ack = clock.set(text);
        if ack == TiAck::Accepted {
            self.state.lock().clock.adopt_offset(&clock);
        }
        ack
    }

    /// Report equipment time from `provider` instead of the local clock
    pub fn set_time_provider<F>(&self, provider: F)
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        self.state.lock().clock.set_time_provider(Arc::new(provider));
    }

    /// Let `handler` decide host time-set requests
    pub fn set_clock_sync_handler<F>(&self, handler: F)
    where
        F: Fn(NaiveDateTime) -> anyhow::Result<TiAck> + Send + Sync + 'static,
    {
        self.state.lock().clock.set_sync_handler(Arc::new(handler));
    }
}

fn build_report(
    data_id: GemId,
    ceid: GemId,
    snapshots: Vec<(GemId, Vec<Snapshot>)>,
) -> EventReport {
    EventReport {
        data_id,
        ceid,
        reports: snapshots
            .into_iter()
            .map(|(id, values)| Report {
                id,
                values: resolve_all(values),
            })
            .collect(),
    }
}
