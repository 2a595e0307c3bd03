//! GEM host role

use crate::config::HostConfig;
use secs_core::{GemId, Item, SecsError, SecsResult};
use secs_gem::messages::{self, parse_ack, Identity};
use secs_gem::{
    AckC5, AckC6, AckC7, AlarmReport, CommandParameters, CommandReply, CommunicationLink,
    CommunicationState, ConstantInfo, DrAck, Eac, ErAck, EventReport, GemClock, LrAck, OflAck,
    OnlAck, PpGnt, ReportDefinition, TiAck, VariableInfo,
};
use secs_hsms::{handler_fn, ConnectionState, Dispatcher, HsmsConnection};
use secs_transport::Connector;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};

/// Unsolicited report received from the equipment
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// S6F11
    Event(EventReport),
    /// S5F1
    Alarm(AlarmReport),
}

/// Host side of a SECS/GEM link.
///
/// Every GEM exchange is a typed async method. Event and alarm reports
/// arrive through [`next_event`](Self::next_event) or
/// [`subscribe`](Self::subscribe).
pub struct GemHost {
    config: HostConfig,
    connection: HsmsConnection,
    link: CommunicationLink,
    events: broadcast::Sender<HostEvent>,
    /// Buffers reports from construction on, for `next_event`
    backlog: Mutex<broadcast::Receiver<HostEvent>>,
}

impl GemHost {
    /// Host using the TCP connector described by `config.hsms`
    pub fn new(config: HostConfig) -> Self {
        let connector = config.hsms.connector();
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: HostConfig, connector: Box<dyn Connector>) -> Self {
        let (events, backlog) = broadcast::channel(config.event_capacity.max(1));
        let link =
            CommunicationLink::new(Item::empty_list(), config.establish_communications_delay);
        let dispatcher = host_dispatcher(config.hsms.session_id, &link, &events);
        let connection = HsmsConnection::new(config.hsms.clone(), connector, dispatcher);
        Self {
            config,
            connection,
            link,
            events,
            backlog: Mutex::new(backlog),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn connection(&self) -> &HsmsConnection {
        &self.connection
    }

    pub fn start(&self) -> SecsResult<()> {
        self.connection.start()?;
        self.link.attach(self.connection.clone());
        log::info!("Host started on {}", self.config.hsms.address);
        Ok(())
    }

    pub async fn stop(&self) {
        self.connection.stop().await;
        self.link.detach();
        log::info!("Host stopped");
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn communication_state(&self) -> CommunicationState {
        self.link.state()
    }

    pub async fn wait_for_communicating(&self, timeout: Duration) -> SecsResult<()> {
        self.link.wait_for_communicating(timeout).await
    }

    pub fn enable_communication(&self) {
        self.link.enable();
    }

    pub fn disable_communication(&self) {
        self.link.disable();
    }

    /// Independent stream of event and alarm reports
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Next report received since construction or the previous call
    ///
    /// # Errors
    /// `Timeout` when nothing arrives within `timeout`.
    pub async fn next_event(&self, timeout: Duration) -> SecsResult<HostEvent> {
        let mut backlog = self.backlog.lock().await;
        tokio::time::timeout(timeout, async {
            loop {
                match backlog.recv().await {
                    Ok(event) => return Ok(event),
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Host dropped {} reports", skipped)
                    }
                    Err(RecvError::Closed) => return Err(SecsError::ConnectionClosed),
                }
            }
        })
        .await
        .map_err(|_| SecsError::Timeout)?
    }

    async fn call(&self, stream: u8, function: u8, body: Option<Item>) -> SecsResult<Item> {
        let reply = self.connection.request(stream, function, body).await?;
        reply.require_body().cloned()
    }

    // Stream 1

    /// S1F1; `None` if the peer answers with an empty identity
    pub async fn are_you_there(&self) -> SecsResult<Option<Identity>> {
        Identity::from_item(&self.call(1, 1, None).await?)
    }

    /// S1F3; an empty `ids` reads every status variable
    pub async fn status_values(&self, ids: &[GemId]) -> SecsResult<Vec<Item>> {
        items(self.call(1, 3, Some(messages::id_list(ids))).await?, "S1F4")
    }

    /// S1F11
    pub async fn status_namelist(&self, ids: &[GemId]) -> SecsResult<Vec<VariableInfo>> {
        messages::parse_variable_namelist(&self.call(1, 11, Some(messages::id_list(ids))).await?)
    }

    /// S1F15
    pub async fn request_offline(&self) -> SecsResult<OflAck> {
        parse_ack(&self.call(1, 15, None).await?, OflAck::from_item)
    }

    /// S1F17
    pub async fn request_online(&self) -> SecsResult<OnlAck> {
        parse_ack(&self.call(1, 17, None).await?, OnlAck::from_item)
    }

    // Stream 2

    /// S2F13
    pub async fn constants(&self, ids: &[GemId]) -> SecsResult<Vec<Item>> {
        items(self.call(2, 13, Some(messages::id_list(ids))).await?, "S2F14")
    }

    /// S2F15; applied all or nothing
    pub async fn set_constants(&self, values: &[(GemId, Item)]) -> SecsResult<Eac> {
        parse_ack(&self.call(2, 15, Some(messages::constant_writes(values))).await?, Eac::from_item)
    }

    /// S2F29
    pub async fn constant_namelist(&self, ids: &[GemId]) -> SecsResult<Vec<ConstantInfo>> {
        messages::parse_constant_namelist(&self.call(2, 29, Some(messages::id_list(ids))).await?)
    }

    /// S2F17
    pub async fn equipment_time(&self) -> SecsResult<String> {
        messages::parse_time(&self.call(2, 17, None).await?)
    }

    /// S2F31 with `time` as `YYYYMMDDhhmmsscc` or `YYMMDDhhmmss`
    pub async fn set_equipment_time(&self, time: &str) -> SecsResult<TiAck> {
        parse_ack(&self.call(2, 31, Some(Item::ascii(time))).await?, TiAck::from_item)
    }

    /// S2F31 with this host's clock
    pub async fn synchronize_clock(&self) -> SecsResult<TiAck> {
        self.set_equipment_time(&GemClock::new().now_string()).await
    }

    /// S2F33; an empty `definitions` deletes every report
    pub async fn define_reports(
        &self,
        data_id: &GemId,
        definitions: &[ReportDefinition],
    ) -> SecsResult<DrAck> {
        let body = messages::define_reports(data_id, definitions);
        parse_ack(&self.call(2, 33, Some(body)).await?, DrAck::from_item)
    }

    /// S2F35
    pub async fn link_events(
        &self,
        data_id: &GemId,
        links: &[(GemId, Vec<GemId>)],
    ) -> SecsResult<LrAck> {
        let body = messages::link_events(data_id, links);
        parse_ack(&self.call(2, 35, Some(body)).await?, LrAck::from_item)
    }

    /// S2F37; an empty `ceids` applies to every event
    pub async fn enable_events(&self, enabled: bool, ceids: &[GemId]) -> SecsResult<ErAck> {
        let body = messages::event_enable(enabled, ceids);
        parse_ack(&self.call(2, 37, Some(body)).await?, ErAck::from_item)
    }

    /// S2F41
    pub async fn remote_command(
        &self,
        name: &str,
        parameters: &CommandParameters,
    ) -> SecsResult<CommandReply> {
        let body = messages::remote_command(name, parameters);
        CommandReply::from_item(&self.call(2, 41, Some(body)).await?)
    }

    // Stream 5

    /// S5F3; `None` applies to every alarm
    pub async fn enable_alarm(&self, enabled: bool, alarm: Option<&GemId>) -> SecsResult<AckC5> {
        let body = messages::alarm_enable(enabled, alarm);
        parse_ack(&self.call(5, 3, Some(body)).await?, AckC5::from_item)
    }

    /// S5F5; an empty `ids` lists every alarm
    pub async fn list_alarms(&self, ids: &[GemId]) -> SecsResult<Vec<AlarmReport>> {
        messages::parse_alarm_list(&self.call(5, 5, Some(messages::id_list(ids))).await?)
    }

    /// S5F7
    pub async fn enabled_alarms(&self) -> SecsResult<Vec<AlarmReport>> {
        messages::parse_alarm_list(&self.call(5, 7, None).await?)
    }

    // Stream 6

    /// S6F15
    pub async fn request_event_report(&self, ceid: &GemId) -> SecsResult<EventReport> {
        EventReport::from_item(&self.call(6, 15, Some(ceid.to_item())).await?)
    }

    /// S6F19
    pub async fn request_report(&self, rptid: &GemId) -> SecsResult<Vec<Item>> {
        items(self.call(6, 19, Some(rptid.to_item())).await?, "S6F20")
    }

    // Stream 7

    /// S7F1
    pub async fn load_inquire(&self, ppid: &GemId, length: u32) -> SecsResult<PpGnt> {
        let body = messages::load_inquire(ppid, length);
        parse_ack(&self.call(7, 1, Some(body)).await?, PpGnt::from_item)
    }

    /// S7F3
    pub async fn send_program(&self, ppid: &GemId, body: &[u8]) -> SecsResult<AckC7> {
        let body = messages::process_program(ppid, body);
        parse_ack(&self.call(7, 3, Some(body)).await?, AckC7::from_item)
    }

    /// S7F5
    ///
    /// # Errors
    /// `UnknownProgram` when the equipment answers with an empty list.
    pub async fn request_program(&self, ppid: &GemId) -> SecsResult<Vec<u8>> {
        match messages::parse_process_program(&self.call(7, 5, Some(ppid.to_item())).await?)? {
            Some((_, body)) => Ok(body),
            None => Err(SecsError::UnknownProgram(ppid.to_string())),
        }
    }

    /// S7F17; an empty `ids` deletes every program
    pub async fn delete_programs(&self, ids: &[GemId]) -> SecsResult<AckC7> {
        parse_ack(&self.call(7, 17, Some(messages::id_list(ids))).await?, AckC7::from_item)
    }

    /// S7F19
    pub async fn list_programs(&self) -> SecsResult<Vec<GemId>> {
        GemId::list_from_item(&self.call(7, 19, None).await?)
    }
}

fn items(item: Item, what: &str) -> SecsResult<Vec<Item>> {
    item.into_list()
        .ok_or_else(|| SecsError::InvalidData(format!("{} body is not a list", what)))
}

/// Routes served by the host: S1F1, S1F13, S5F1 and S6F11
fn host_dispatcher(
    session_id: u16,
    link: &CommunicationLink,
    events: &broadcast::Sender<HostEvent>,
) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(session_id);
    dispatcher.register(1, 1, handler_fn(|_| Ok(Some(Item::empty_list()))));

    let peer = link.clone();
    dispatcher.register(
        1,
        13,
        handler_fn(move |_| Ok(Some(messages::establish_reply(peer.on_peer_establish(), None)))),
    );

    let sender = events.clone();
    dispatcher.register_with_nak(
        6,
        11,
        handler_fn(move |message| {
            let report = EventReport::from_item(message.require_body()?)?;
            log::debug!("Event report {} (DATAID {})", report.ceid, report.data_id);
            let _ = sender.send(HostEvent::Event(report));
            Ok(Some(AckC6::Accepted.to_item()))
        }),
        AckC6::Error.to_item(),
    );

    let sender = events.clone();
    dispatcher.register_with_nak(
        5,
        1,
        handler_fn(move |message| {
            let report = AlarmReport::from_item(message.require_body()?)?;
            log::info!(
                "Alarm {} {}: {}",
                report.id,
                if report.is_set() { "set" } else { "cleared" },
                report.text
            );
            let _ = sender.send(HostEvent::Alarm(report));
            Ok(Some(AckC5::Accepted.to_item()))
        }),
        AckC5::Error.to_item(),
    );
    dispatcher
}
