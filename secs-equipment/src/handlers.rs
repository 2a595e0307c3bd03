//! Equipment-side message handlers

use crate::config::EquipmentConfig;
use crate::emitter::Emission;
use async_trait::async_trait;
use parking_lot::Mutex;
use secs_core::{GemId, Item, SecsError};
use secs_gem::messages::{self, Identity};
use secs_gem::{
    AckC5, AckC7, CommandReply, CommunicationLink, ControlState, DrAck, Eac, ErAck, EventReport,
    GemModel, HcAck, LrAck, PpGnt, TiAck,
};
use secs_hsms::{DataHandler, Dispatcher, HandlerResult, Message, MessageHeader};
use std::sync::Arc;
use tokio::sync::mpsc;

type HandlerFn = fn(&EquipmentCore, &Message) -> HandlerResult;

/// Messages still served while the control state is offline
const OFFLINE_ALLOWED: [(u8, u8); 2] = [(1, 13), (1, 17)];

/// State shared by the handlers, the emitter and the public API
pub(crate) struct EquipmentCore {
    pub(crate) config: EquipmentConfig,
    pub(crate) model: Arc<GemModel>,
    pub(crate) control: Mutex<ControlState>,
    pub(crate) link: CommunicationLink,
    pub(crate) emissions: mpsc::UnboundedSender<Emission>,
}

impl EquipmentCore {
    pub(crate) fn identity(&self) -> Identity {
        Identity::new(self.config.mdln.clone(), self.config.softrev.clone())
    }

    pub(crate) fn control_state(&self) -> ControlState {
        *self.control.lock()
    }

    pub(crate) fn emit(&self, emission: Emission) {
        if self.emissions.send(emission).is_err() {
            log::warn!("Emitter stopped, dropping message");
        }
    }

    fn accepts(&self, header: &MessageHeader) -> bool {
        self.control_state().is_online()
            || OFFLINE_ALLOWED.contains(&(header.stream(), header.function()))
    }

    // Stream 1

    fn s1f1(&self, _: &Message) -> HandlerResult {
        Ok(Some(self.identity().to_item()))
    }

    fn s1f3(&self, message: &Message) -> HandlerResult {
        let ids = messages::parse_id_list(message.body())?;
        Ok(Some(Item::list(self.model.status_values(&ids))))
    }

    fn s1f11(&self, message: &Message) -> HandlerResult {
        let ids = messages::parse_id_list(message.body())?;
        Ok(Some(messages::variable_namelist(&self.model.status_namelist(&ids))))
    }

    fn s1f13(&self, _: &Message) -> HandlerResult {
        let ack = self.link.on_peer_establish();
        Ok(Some(messages::establish_reply(ack, Some(&self.identity()))))
    }

    fn s1f15(&self, _: &Message) -> HandlerResult {
        let mut control = self.control.lock();
        let (ack, next) = control.host_offline();
        log::info!("Host requested offline: {} -> {}", control.as_str(), next.as_str());
        *control = next;
        Ok(Some(ack.to_item()))
    }

    fn s1f17(&self, _: &Message) -> HandlerResult {
        let mut control = self.control.lock();
        let (ack, next) = control.host_online();
        log::info!("Host requested online: {:?}, now {}", ack, next.as_str());
        *control = next;
        Ok(Some(ack.to_item()))
    }

    // Stream 2

    fn s2f13(&self, message: &Message) -> HandlerResult {
        let ids = messages::parse_id_list(message.body())?;
        Ok(Some(Item::list(self.model.read_constants(&ids))))
    }

    fn s2f15(&self, message: &Message) -> HandlerResult {
        let values = messages::parse_constant_writes(message.require_body()?)?;
        Ok(Some(self.model.write_constants(&values).to_item()))
    }

    fn s2f17(&self, _: &Message) -> HandlerResult {
        Ok(Some(Item::ascii(self.model.clock_string())))
    }

    fn s2f29(&self, message: &Message) -> HandlerResult {
        let ids = messages::parse_id_list(message.body())?;
        Ok(Some(messages::constant_namelist(&self.model.constant_namelist(&ids))))
    }

    fn s2f31(&self, message: &Message) -> HandlerResult {
        let time = messages::parse_time(message.require_body()?)?;
        Ok(Some(self.model.set_clock(&time).to_item()))
    }

    fn s2f33(&self, message: &Message) -> HandlerResult {
        let (_, definitions) = messages::parse_define_reports(message.require_body()?)?;
        Ok(Some(self.model.define_reports(definitions).to_item()))
    }

    fn s2f35(&self, message: &Message) -> HandlerResult {
        let (_, links) = messages::parse_link_events(message.require_body()?)?;
        Ok(Some(self.model.link_events(links).to_item()))
    }

    fn s2f37(&self, message: &Message) -> HandlerResult {
        let (enabled, ceids) = messages::parse_event_enable(message.require_body()?)?;
        Ok(Some(self.model.set_event_enable(enabled, &ceids).to_item()))
    }

    fn s2f41(&self, message: &Message) -> HandlerResult {
        let (name, parameters) = messages::parse_remote_command(message.require_body()?)?;
        if !self.control_state().is_remote() {
            log::warn!("Remote command {} refused in {}", name, self.control_state().as_str());
            return Ok(Some(CommandReply::new(HcAck::CannotPerformNow).to_item()));
        }
        let outcome = self.model.dispatch_command(&name, &parameters);
        if let Some(ceid) = outcome.trigger {
            self.emit(Emission::CommandEvent(ceid));
        }
        Ok(Some(outcome.reply.to_item()))
    }

    // Stream 5

    fn s5f3(&self, message: &Message) -> HandlerResult {
        let (enabled, ids) = messages::parse_alarm_enable(message.require_body()?)?;
        Ok(Some(self.model.set_alarm_enable(enabled, &ids).to_item()))
    }

    fn s5f5(&self, message: &Message) -> HandlerResult {
        let ids = messages::parse_id_list(message.body())?;
        Ok(Some(messages::alarm_list(&self.model.list_alarms(&ids))))
    }

    fn s5f7(&self, _: &Message) -> HandlerResult {
        Ok(Some(messages::alarm_list(&self.model.enabled_alarms())))
    }

    // Stream 6

    fn s6f15(&self, message: &Message) -> HandlerResult {
        let ceid = GemId::from_item(message.require_body()?)?;
        let report = match self.model.event_report(&ceid) {
            Ok(report) => report,
            Err(SecsError::UnknownEvent(_)) => EventReport {
                data_id: self.model.next_data_id(),
                ceid,
                reports: Vec::new(),
            },
            Err(err) => return Err(err),
        };
        Ok(Some(report.to_item()))
    }

    fn s6f19(&self, message: &Message) -> HandlerResult {
        let rptid = GemId::from_item(message.require_body()?)?;
        let values = self.model.report_values(&rptid).unwrap_or_default();
        Ok(Some(Item::list(values)))
    }

    // Stream 7

    fn s7f1(&self, message: &Message) -> HandlerResult {
        let (ppid, length) = messages::parse_load_inquire(message.require_body()?)?;
        let grant = self
            .model
            .program_grant(usize::try_from(length).unwrap_or(usize::MAX));
        log::debug!("Load inquire for {} ({} bytes): {:?}", ppid, length, grant);
        Ok(Some(grant.to_item()))
    }

    fn s7f3(&self, message: &Message) -> HandlerResult {
        let Some((ppid, body)) = messages::parse_process_program(message.require_body()?)? else {
            return Err(SecsError::InvalidData("Empty process program".to_string()));
        };
        Ok(Some(self.model.receive_program(ppid, body).to_item()))
    }

    /// An unknown or refused PPID is answered with an empty list
    fn s7f5(&self, message: &Message) -> HandlerResult {
        let ppid = GemId::from_item(message.require_body()?)?;
        let reply = match self.model.serve_program(&ppid) {
            Some(body) => messages::process_program(&ppid, &body),
            None => Item::empty_list(),
        };
        Ok(Some(reply))
    }

    fn s7f17(&self, message: &Message) -> HandlerResult {
        let ids = messages::parse_id_list(message.body())?;
        let ack = match self.model.delete_programs(&ids) {
            Ok(()) => AckC7::Accepted,
            Err(err) => {
                log::warn!("Delete refused: {}", err);
                AckC7::from_error(&err)
            }
        };
        Ok(Some(ack.to_item()))
    }

    fn s7f19(&self, _: &Message) -> HandlerResult {
        Ok(Some(messages::id_list(&self.model.list_programs())))
    }
}

struct Route {
    core: Arc<EquipmentCore>,
    handler: HandlerFn,
}

#[async_trait]
impl DataHandler for Route {
    async fn handle(&self, message: &Message) -> HandlerResult {
        (self.handler)(&self.core, message)
    }
}

struct RouteTable<'a> {
    core: &'a Arc<EquipmentCore>,
    dispatcher: Dispatcher,
}

impl RouteTable<'_> {
    fn add(&mut self, stream: u8, function: u8, handler: HandlerFn) -> &mut Self {
        let route = Arc::new(Route {
            core: self.core.clone(),
            handler,
        });
        self.dispatcher.register(stream, function, route);
        self
    }

    fn add_with_nak(
        &mut self,
        stream: u8,
        function: u8,
        handler: HandlerFn,
        nak: Item,
    ) -> &mut Self {
        let route = Arc::new(Route {
            core: self.core.clone(),
            handler,
        });
        self.dispatcher.register_with_nak(stream, function, route, nak);
        self
    }
}

/// Dispatcher serving every equipment-side primary
pub(crate) fn build_dispatcher(core: &Arc<EquipmentCore>) -> Dispatcher {
    let mut table = RouteTable {
        core,
        dispatcher: Dispatcher::new(core.config.hsms.session_id),
    };
    table
        .add(1, 1, EquipmentCore::s1f1)
        .add(1, 3, EquipmentCore::s1f3)
        .add(1, 11, EquipmentCore::s1f11)
        .add(1, 13, EquipmentCore::s1f13)
        .add(1, 15, EquipmentCore::s1f15)
        .add(1, 17, EquipmentCore::s1f17)
        .add(2, 13, EquipmentCore::s2f13)
        .add_with_nak(2, 15, EquipmentCore::s2f15, Eac::OutOfRange.to_item())
        .add(2, 17, EquipmentCore::s2f17)
        .add(2, 29, EquipmentCore::s2f29)
        .add_with_nak(2, 31, EquipmentCore::s2f31, TiAck::NotDone.to_item())
        .add_with_nak(2, 33, EquipmentCore::s2f33, DrAck::InvalidFormat.to_item())
        .add_with_nak(2, 35, EquipmentCore::s2f35, LrAck::InvalidFormat.to_item())
        .add_with_nak(2, 37, EquipmentCore::s2f37, ErAck::UnknownEvent.to_item())
        .add_with_nak(
            2,
            41,
            EquipmentCore::s2f41,
            CommandReply::new(HcAck::CannotPerformNow).to_item(),
        )
        .add_with_nak(5, 3, EquipmentCore::s5f3, AckC5::Error.to_item())
        .add(5, 5, EquipmentCore::s5f5)
        .add(5, 7, EquipmentCore::s5f7)
        .add(6, 15, EquipmentCore::s6f15)
        .add(6, 19, EquipmentCore::s6f19)
        .add_with_nak(7, 1, EquipmentCore::s7f1, PpGnt::OtherError.to_item())
        .add_with_nak(7, 3, EquipmentCore::s7f3, AckC7::OtherError.to_item())
        .add(7, 5, EquipmentCore::s7f5)
        .add_with_nak(7, 17, EquipmentCore::s7f17, AckC7::OtherError.to_item())
        .add(7, 19, EquipmentCore::s7f19);

    let gate_core = core.clone();
    let mut dispatcher = table.dispatcher;
    dispatcher.set_gate(Arc::new(move |header: &MessageHeader| gate_core.accepts(header)));
    dispatcher
}
